use std::time::Duration;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, CursorBody, ExecutionContext, Operation, Retryability},
    options::ListIndexesOptions,
};

#[derive(Debug)]
pub(crate) struct ListIndexes {
    ns: Namespace,
    options: Option<ListIndexesOptions>,
}

impl ListIndexes {
    pub(crate) fn new(ns: Namespace, options: Option<ListIndexesOptions>) -> Self {
        ListIndexes { ns, options }
    }
}

impl Operation for ListIndexes {
    type O = CursorSpecification;

    const NAME: &'static str = "listIndexes";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };
        append_options(&mut body, self.options.as_ref())?;
        if !body.contains_key("cursor") {
            body.insert("cursor", doc! {});
        }

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let body = CursorBody::extract(&response)?;
        CursorSpecification::new(
            body,
            response.source.clone(),
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
            self.options.as_ref().and_then(|opts| opts.comment.clone()),
            false,
        )
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}
