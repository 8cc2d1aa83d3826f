use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    coll::Namespace,
    concern::WriteConcern,
    error::{Error, Result},
    operation::{ExecutionContext, Feature, Operation, WriteConcernOnlyBody},
    options::DropCollectionOptions,
};

#[derive(Debug)]
pub(crate) struct DropCollection {
    ns: Namespace,
    options: Option<DropCollectionOptions>,
}

impl DropCollection {
    pub(crate) fn new(ns: Namespace, options: Option<DropCollectionOptions>) -> Self {
        Self { ns, options }
    }
}

impl Operation for DropCollection {
    type O = ();

    const NAME: &'static str = "drop";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

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

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        // Dropping a collection that does not exist is not an error.
        if error.is_ns_not_found() {
            Ok(())
        } else {
            Err(error)
        }
    }

    fn write_concern(&self) -> Feature<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }
}
