use std::time::Duration;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::ReadConcern,
    error::{Error, Result},
    operation::{
        append_options,
        check_collation_support,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
    },
    options::CountOptions,
    selection_criteria::SelectionCriteria,
};

#[derive(Debug)]
pub(crate) struct Count {
    ns: Namespace,
    query: Document,
    options: Option<CountOptions>,
}

impl Count {
    pub(crate) fn new(ns: Namespace, query: Document, options: Option<CountOptions>) -> Self {
        Self { ns, query, options }
    }
}

impl Operation for Count {
    type O = u64;

    const NAME: &'static str = "count";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        check_collation_support(
            description,
            self.options
                .as_ref()
                .is_some_and(|opts| opts.collation.is_some()),
        )?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "query": self.query.clone(),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: ResponseBody = response.body()?;
        bson_util::get_u64(&response.n).ok_or_else(|| {
            Error::invalid_response(format!(
                "count reply should have contained a non-negative integer 'n', but had {}",
                response.n
            ))
        })
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

#[derive(Debug, Deserialize)]
struct ResponseBody {
    n: Bson,
}
