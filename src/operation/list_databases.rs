use serde::Deserialize;

use crate::{
    bson::{doc, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{append_options, ExecutionContext, Operation, Retryability},
    options::ListDatabasesOptions,
};

/// Lists the databases on the selected server. The reply holds one document per database, or
/// just the names when `name_only` is set.
#[derive(Debug)]
pub(crate) struct ListDatabases {
    name_only: bool,
    options: Option<ListDatabasesOptions>,
}

impl ListDatabases {
    pub(crate) fn new(name_only: bool, options: Option<ListDatabasesOptions>) -> Self {
        ListDatabases { name_only, options }
    }
}

impl Operation for ListDatabases {
    type O = Vec<Document>;

    const NAME: &'static str = "listDatabases";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
            "nameOnly": self.name_only,
        };
        if let Some(filter) = self.options.as_ref().and_then(|opts| opts.filter.as_ref()) {
            body.insert("filter", filter.clone());
        }
        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        _context: ExecutionContext<'_>,
    ) -> Result<Self::O> {
        let response: Response = response.body()?;
        Ok(response.databases)
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    databases: Vec<Document>,
}
