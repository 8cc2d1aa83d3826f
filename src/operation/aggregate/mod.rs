#[cfg(test)]
mod test;

use std::time::Duration;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::{ReadConcern, WriteConcern},
    cursor::CursorSpecification,
    error::Result,
    operation::{
        append_options,
        check_collation_support,
        CursorBody,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
        WriteConcernOnlyBody,
        SERVER_4_2_0_WIRE_VERSION,
    },
    options::AggregateOptions,
    selection_criteria::SelectionCriteria,
};

#[derive(Debug)]
pub(crate) struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: Option<AggregateOptions>,
    read_concern_supported: bool,
}

impl Aggregate {
    pub(crate) fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: Option<AggregateOptions>,
    ) -> Self {
        Self {
            target: target.into(),
            pipeline: pipeline.into_iter().collect(),
            options,
            read_concern_supported: true,
        }
    }

    /// Whether the last stage writes its output to a collection.
    pub(crate) fn is_out_or_merge(&self) -> bool {
        self.pipeline
            .last()
            .and_then(bson_util::first_key)
            .is_some_and(|stage| stage == "$out" || stage == "$merge")
    }
}

impl Operation for Aggregate {
    type O = CursorSpecification;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        check_collation_support(
            description,
            self.options
                .as_ref()
                .is_some_and(|opts| opts.collation.is_some()),
        )?;

        // The pipeline is always sent, even when empty.
        let mut body = doc! {
            Self::NAME: self.target.to_bson(),
            "pipeline": self.pipeline.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        };
        append_options(&mut body, self.options.as_ref())?;
        if !body.contains_key("cursor") {
            body.insert("cursor", Document::new());
        }

        if self.is_out_or_merge() {
            if let Ok(cursor) = body.get_document_mut("cursor") {
                cursor.remove("batchSize");
            }
            // Writing aggregates only take a read concern on 4.2+.
            self.read_concern_supported =
                description.max_wire_version.unwrap_or(0) >= SERVER_4_2_0_WIRE_VERSION;
        }

        Ok(Command::new(Self::NAME, self.target.db_name(), body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        if self.is_out_or_merge() {
            let write_concern_info: WriteConcernOnlyBody = response.body()?;
            write_concern_info.validate()?;
        }

        let body = CursorBody::extract(&response)?;
        CursorSpecification::new(
            body,
            response.source.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
            self.options.as_ref().and_then(|opts| opts.comment.clone()),
            false,
        )
    }

    fn selection_criteria(&self) -> Feature<&SelectionCriteria> {
        if self.is_out_or_merge() {
            return Feature::NotSupported;
        }
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
            .into()
    }

    fn read_concern(&self) -> Feature<&ReadConcern> {
        if !self.read_concern_supported {
            return Feature::NotSupported;
        }
        self.options
            .as_ref()
            .and_then(|opts| opts.read_concern.as_ref())
            .into()
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        if !self.is_out_or_merge() {
            return Feature::NotSupported;
        }
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
        if self.is_out_or_merge() {
            Retryability::None
        } else {
            Retryability::Read
        }
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum AggregateTarget {
    Database(String),
    Collection(Namespace),
}

impl AggregateTarget {
    fn to_bson(&self) -> Bson {
        match self {
            AggregateTarget::Database(_) => Bson::Int32(1),
            AggregateTarget::Collection(ref ns) => Bson::String(ns.coll.to_string()),
        }
    }

    fn db_name(&self) -> &str {
        match self {
            AggregateTarget::Database(ref s) => s.as_str(),
            AggregateTarget::Collection(ref ns) => ns.db.as_str(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

impl From<String> for AggregateTarget {
    fn from(db_name: String) -> Self {
        AggregateTarget::Database(db_name)
    }
}
