use crate::{
    bson::Document,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, Result},
    operation::{ExecutionContext, Feature, Operation},
    selection_criteria::SelectionCriteria,
};

/// Commands the server rejects when they carry an `lsid`, in lower case.
const SESSIONS_UNSUPPORTED_COMMANDS: [&str; 2] = ["killcursors", "parallelcollectionscan"];

/// An arbitrary command document, sent as is with the usual session, cluster time and
/// concern fields added around it.
#[derive(Debug, Clone)]
pub(crate) struct RunCommand {
    db: String,
    command: Document,
    selection_criteria: Option<SelectionCriteria>,
}

impl RunCommand {
    pub(crate) fn new(
        db: String,
        command: Document,
        selection_criteria: Option<SelectionCriteria>,
    ) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::invalid_argument(
                "an empty document cannot be passed to a run_command operation",
            ));
        }
        Ok(Self {
            db,
            command,
            selection_criteria,
        })
    }

    fn command_name(&self) -> &str {
        self.command
            .keys()
            .next()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl Operation for RunCommand {
    type O = Document;

    // Never sent; the command document names itself.
    const NAME: &'static str = "$genericRunCommand";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(
            self.command_name(),
            &self.db,
            self.command.clone(),
        ))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        response.body()
    }

    fn selection_criteria(&self) -> Feature<&SelectionCriteria> {
        self.selection_criteria.as_ref().into()
    }

    fn supports_sessions(&self) -> bool {
        !SESSIONS_UNSUPPORTED_COMMANDS.contains(&self.command_name().to_lowercase().as_str())
    }
}
