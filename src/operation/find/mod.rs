#[cfg(test)]
mod test;

use std::time::Duration;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::ReadConcern,
    cursor::CursorSpecification,
    error::{Error, Result},
    operation::{
        append_options,
        check_collation_support,
        CursorBody,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
        SERVER_4_4_0_WIRE_VERSION,
    },
    options::{CursorType, FindOptions},
    selection_criteria::SelectionCriteria,
};

#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<Box<FindOptions>>,
}

impl Find {
    pub(crate) fn new(ns: Namespace, filter: Document, options: Option<FindOptions>) -> Self {
        Self {
            ns,
            filter,
            options: options.map(Box::new),
        }
    }

    fn cursor_type(&self) -> CursorType {
        self.options
            .as_ref()
            .and_then(|opts| opts.cursor_type)
            .unwrap_or_default()
    }
}

impl Operation for Find {
    type O = CursorSpecification;

    const NAME: &'static str = "find";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(ref options) = self.options {
            check_collation_support(description, options.collation.is_some())?;

            if options
                .batch_size
                .is_some_and(|batch_size| i32::try_from(batch_size).is_err())
            {
                return Err(Error::invalid_argument(
                    "the batch size must fit into a signed 32-bit integer",
                ));
            }

            // A negative limit asks for a single batch of at most |limit| documents.
            if let Some(limit) = options.limit {
                if limit < 0 {
                    body.insert("singleBatch", true);
                }
            }
        }

        append_options(&mut body, self.options.as_ref())?;

        if let Some(limit) = self.options.as_ref().and_then(|opts| opts.limit) {
            body.insert("limit", limit.saturating_abs());
        }

        match self.cursor_type() {
            CursorType::Tailable => {
                body.insert("tailable", true);
            }
            CursorType::TailableAwait => {
                body.insert("tailable", true);
                body.insert("awaitData", true);
            }
            CursorType::NonTailable => {}
        }

        body.insert("filter", self.filter.clone());

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let body = CursorBody::extract(&response)?;
        let description = context.connection.stream_description()?;

        let await_data = self.cursor_type() == CursorType::TailableAwait;
        let max_await_time: Option<Duration> = if await_data {
            self.options.as_ref().and_then(|opts| opts.max_await_time)
        } else {
            None
        };

        // Servers older than 4.4 do not accept a comment on getMore.
        let comment = if description.max_wire_version.unwrap_or(0) >= SERVER_4_4_0_WIRE_VERSION {
            self.options.as_ref().and_then(|opts| opts.comment.clone())
        } else {
            None
        };

        CursorSpecification::new(
            body,
            response.source.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            max_await_time,
            comment,
            await_data,
        )
    }

    fn selection_criteria(&self) -> Feature<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
            .into()
    }

    fn read_concern(&self) -> Feature<&ReadConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.read_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}
