use std::time::Duration;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    concern::{Acknowledgment, WriteConcern},
    error::Result,
    operation::{ExecutionContext, Feature, Operation, Retryability, WriteConcernOnlyBody},
    options::TransactionOptions,
};

/// The wtimeout used when a commit is retried with an upgraded write concern.
const RETRY_W_TIMEOUT: Duration = Duration::from_millis(10_000);

pub(crate) struct CommitTransaction {
    options: Option<TransactionOptions>,
}

impl CommitTransaction {
    pub(crate) fn new(options: Option<TransactionOptions>) -> Self {
        Self { options }
    }

    /// Switches to `w: "majority"`, defaulting `wtimeout` to 10 seconds, as required when a commit
    /// is sent more than once.
    pub(crate) fn upgrade_write_concern(&mut self) {
        let options = self.options.get_or_insert_with(Default::default);
        let mut write_concern = options.write_concern.clone().unwrap_or_default();
        write_concern.w = Some(Acknowledgment::Majority);
        write_concern.w_timeout.get_or_insert(RETRY_W_TIMEOUT);
        options.write_concern = Some(write_concern);
    }
}

impl Operation for CommitTransaction {
    type O = ();

    const NAME: &'static str = "commitTransaction";

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
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
            .into()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }

    fn update_for_retry(&mut self) {
        self.upgrade_write_concern();
    }

    fn max_time(&self) -> Option<Duration> {
        self.options.as_ref().and_then(|opts| opts.max_commit_time)
    }
}
