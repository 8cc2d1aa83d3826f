#[cfg(test)]
mod test;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::{Error, PartialWriteResult, Result},
    operation::{
        append_options,
        batch::FrameResults,
        check_collation_support,
        check_hint_acknowledged,
        Batches,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
        WriteResponseBody,
        SERVER_4_2_0_WIRE_VERSION,
    },
    options::{UpdateModifications, UpdateOptions},
    results::{UpdateResult, Upserted},
};

/// A single update statement: which documents to match and how to change them.
#[derive(Clone, Debug)]
pub(crate) struct UpdateStatement {
    filter: Document,
    modifications: UpdateModifications,
    multi: bool,
}

impl UpdateStatement {
    /// An update with `$` operators or a pipeline.
    pub(crate) fn update(
        filter: Document,
        modifications: UpdateModifications,
        multi: bool,
    ) -> Result<Self> {
        if let UpdateModifications::Document(ref d) = modifications {
            bson_util::update_document_check(d)?;
        }
        Ok(Self {
            filter,
            modifications,
            multi,
        })
    }

    /// A whole-document replacement of at most one document.
    pub(crate) fn replace(filter: Document, replacement: Document) -> Result<Self> {
        bson_util::replacement_document_check(&replacement)?;
        Ok(Self {
            filter,
            modifications: UpdateModifications::Document(replacement),
            multi: false,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    batches: Batches,
    options: Option<UpdateOptions>,
    multi: bool,
    uses_pipeline: bool,
    results: FrameResults<(i64, i64, Vec<Upserted>)>,
}

impl Update {
    pub(crate) fn new(
        ns: Namespace,
        statements: Vec<UpdateStatement>,
        options: Option<UpdateOptions>,
    ) -> Result<Self> {
        if statements.is_empty() {
            return Err(Error::invalid_argument("no update statements provided"));
        }

        let multi = statements.iter().any(|s| s.multi);
        let uses_pipeline = statements
            .iter()
            .any(|s| matches!(s.modifications, UpdateModifications::Pipeline(_)));
        let documents = statements
            .iter()
            .map(|statement| {
                let document = statement_document(statement, options.as_ref())?;
                Ok(crate::bson::to_raw_document_buf(&document)?)
            })
            .collect::<Result<Vec<_>>>()?;

        let ordered = options.as_ref().and_then(|o| o.ordered).unwrap_or(true);
        Ok(Self {
            ns,
            batches: Batches::new("updates", documents, ordered),
            options,
            multi,
            uses_pipeline,
            results: FrameResults::default(),
        })
    }
}

fn statement_document(
    statement: &UpdateStatement,
    options: Option<&UpdateOptions>,
) -> Result<Document> {
    let mut document = doc! {
        "q": statement.filter.clone(),
        "u": statement.modifications.to_bson(),
    };
    if statement.multi {
        document.insert("multi", true);
    }

    if let Some(options) = options {
        if let Some(upsert) = options.upsert {
            document.insert("upsert", upsert);
        }
        if let Some(ref array_filters) = options.array_filters {
            document.insert(
                "arrayFilters",
                array_filters
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>(),
            );
        }
        if let Some(ref collation) = options.collation {
            document.insert("collation", crate::bson::to_bson(collation)?);
        }
        if let Some(ref hint) = options.hint {
            document.insert("hint", hint.to_bson());
        }
    }

    Ok(document)
}

impl Operation for Update {
    type O = UpdateResult;

    const NAME: &'static str = "update";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        if let Some(ref options) = self.options {
            check_collation_support(description, options.collation.is_some())?;
            check_hint_acknowledged(options.write_concern.as_ref(), options.hint.is_some())?;
        }
        if self.uses_pipeline
            && description.max_wire_version.unwrap_or(0) < SERVER_4_2_0_WIRE_VERSION
        {
            return Err(Error::invalid_argument(
                "pipeline updates are not supported by the selected server",
            ));
        }

        self.batches.advance_for(description)?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "ordered": self.batches.ordered(),
        };
        append_options(&mut body, self.options.as_ref())?;

        let mut command = Command::new(Self::NAME, &self.ns.db, body);
        command.add_document_sequence(self.batches.identifier(), self.batches.current().to_vec());
        Ok(command)
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<UpdateBody> = response.body()?;
        let offset = self.batches.current_index();

        let upserted = response
            .upserted
            .iter()
            .cloned()
            .map(|mut upserted| {
                upserted.index += offset;
                upserted
            })
            .collect();
        self.results.record(
            offset,
            (response.n, response.n_modified, upserted),
            response.offset_write_errors(offset),
            response.write_concern_error.clone(),
            response.labels.clone(),
        );

        let mut result = UpdateResult::default();
        for (n, n_modified, upserted) in self.results.summaries() {
            result.n += n;
            result.n_modified += n_modified;
            result.upserted.extend(upserted.iter().cloned());
        }
        self.results.into_result(result, PartialWriteResult::Update)
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
        // Multi-document updates are not idempotent.
        if self.multi {
            Retryability::None
        } else {
            Retryability::Write
        }
    }

    fn batches(&mut self) -> Option<&mut Batches> {
        Some(&mut self.batches)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    #[serde(default)]
    n: i64,

    #[serde(default)]
    n_modified: i64,

    #[serde(default)]
    upserted: Vec<Upserted>,
}
