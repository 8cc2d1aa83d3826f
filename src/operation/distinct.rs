use std::time::Duration;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::ReadConcern,
    error::Result,
    operation::{
        append_options,
        check_collation_support,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
    },
    options::DistinctOptions,
    selection_criteria::SelectionCriteria,
};

#[derive(Debug)]
pub(crate) struct Distinct {
    ns: Namespace,
    field_name: String,
    query: Document,
    options: Option<DistinctOptions>,
}

impl Distinct {
    pub(crate) fn new(
        ns: Namespace,
        field_name: String,
        query: Document,
        options: Option<DistinctOptions>,
    ) -> Self {
        Self {
            ns,
            field_name,
            query,
            options,
        }
    }
}

impl Operation for Distinct {
    type O = Vec<Bson>;

    const NAME: &'static str = "distinct";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        check_collation_support(
            description,
            self.options
                .as_ref()
                .is_some_and(|opts| opts.collation.is_some()),
        )?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "key": self.field_name.clone(),
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
        let response: Response = response.body()?;
        Ok(response.values)
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
struct Response {
    values: Vec<Bson>,
}
