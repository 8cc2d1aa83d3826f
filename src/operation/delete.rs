use crate::{
    bson::{doc, Document},
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
    },
    options::DeleteOptions,
    results::DeleteResult,
};

/// A single delete statement, removing either every match or at most one.
#[derive(Clone, Debug)]
pub(crate) struct DeleteStatement {
    pub(crate) filter: Document,
    pub(crate) single: bool,
}

#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    batches: Batches,
    options: Option<DeleteOptions>,
    multi: bool,
    results: FrameResults<i64>,
}

impl Delete {
    pub(crate) fn new(
        ns: Namespace,
        statements: Vec<DeleteStatement>,
        options: Option<DeleteOptions>,
    ) -> Result<Self> {
        if statements.is_empty() {
            return Err(Error::invalid_argument("no delete statements provided"));
        }

        let multi = statements.iter().any(|s| !s.single);
        let documents = statements
            .into_iter()
            .map(|statement| {
                let mut document = doc! {
                    "q": statement.filter,
                    "limit": i32::from(statement.single),
                };
                if let Some(ref options) = options {
                    if let Some(ref collation) = options.collation {
                        document.insert("collation", crate::bson::to_bson(collation)?);
                    }
                    if let Some(ref hint) = options.hint {
                        document.insert("hint", hint.to_bson());
                    }
                }
                Ok(crate::bson::to_raw_document_buf(&document)?)
            })
            .collect::<Result<Vec<_>>>()?;

        let ordered = options.as_ref().and_then(|o| o.ordered).unwrap_or(true);
        Ok(Self {
            ns,
            batches: Batches::new("deletes", documents, ordered),
            options,
            multi,
            results: FrameResults::default(),
        })
    }
}

impl Operation for Delete {
    type O = DeleteResult;

    const NAME: &'static str = "delete";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        if let Some(ref options) = self.options {
            check_collation_support(description, options.collation.is_some())?;
            check_hint_acknowledged(options.write_concern.as_ref(), options.hint.is_some())?;
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
        let response: WriteResponseBody = response.body()?;
        let offset = self.batches.current_index();
        self.results.record(
            offset,
            response.n,
            response.offset_write_errors(offset),
            response.write_concern_error.clone(),
            response.labels.clone(),
        );

        let n = self.results.summaries().sum();
        self.results
            .into_result(DeleteResult { n }, PartialWriteResult::Delete)
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
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
