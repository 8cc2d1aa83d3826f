use std::time::Duration;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::Result,
    operation::{append_options, ExecutionContext, Feature, Operation, WriteConcernOnlyBody},
    options::DropIndexOptions,
};

/// Drops one index by name, or every index but `_id_` when no name is given.
#[derive(Debug)]
pub(crate) struct DropIndexes {
    ns: Namespace,
    name: Option<String>,
    options: Option<DropIndexOptions>,
}

impl DropIndexes {
    pub(crate) fn new(
        ns: Namespace,
        name: Option<String>,
        options: Option<DropIndexOptions>,
    ) -> Self {
        Self { ns, name, options }
    }
}

impl Operation for DropIndexes {
    type O = ();

    const NAME: &'static str = "dropIndexes";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "index": self.name.as_deref().unwrap_or("*"),
        };
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, &self.ns.db, body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_time)
    }
}
