use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    concern::WriteConcern,
    error::Result,
    operation::{ExecutionContext, Feature, Operation, Retryability, WriteConcernOnlyBody},
};

pub(crate) struct AbortTransaction {
    write_concern: Option<WriteConcern>,
}

impl AbortTransaction {
    pub(crate) fn new(write_concern: Option<WriteConcern>) -> Self {
        Self { write_concern }
    }
}

impl Operation for AbortTransaction {
    type O = ();

    const NAME: &'static str = "abortTransaction";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: 1,
        };

        Ok(Command::new(Self::NAME, "admin", body))
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
        self.write_concern.as_ref().into()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}
