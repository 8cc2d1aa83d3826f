use crate::{
    bson::{Bson, Document},
    client::options::ServerApi,
    cmap::Command,
    error::Result,
    hello::hello_command,
};

/// The `hello` (or legacy `isMaster`) command sent when handshaking.
#[derive(Debug, Clone)]
pub(crate) struct Hello {
    server_api: Option<ServerApi>,
    load_balanced: bool,
    pub(crate) client_metadata: Option<Document>,
    pub(crate) compressors: Vec<String>,
    pub(crate) sasl_supported_mechs: Option<String>,
    pub(crate) speculative_authenticate: Option<Document>,
}

impl Hello {
    pub(crate) fn new(server_api: Option<ServerApi>, load_balanced: bool) -> Self {
        Self {
            server_api,
            load_balanced,
            client_metadata: None,
            compressors: Vec::new(),
            sasl_supported_mechs: None,
            speculative_authenticate: None,
        }
    }

    /// The command to send, framed as OP_MSG or OP_QUERY depending on what is known about the
    /// server.
    pub(crate) fn command(&self) -> Result<Command> {
        let mut command = hello_command(
            self.server_api.as_ref(),
            Some(self.load_balanced),
            None,
            None,
        )?;

        if let Some(ref metadata) = self.client_metadata {
            command.body.insert("client", metadata.clone());
        }
        if !self.compressors.is_empty() {
            command.body.insert(
                "compression",
                self.compressors
                    .iter()
                    .cloned()
                    .map(Bson::String)
                    .collect::<Vec<_>>(),
            );
        }
        if let Some(ref mechs) = self.sasl_supported_mechs {
            command.body.insert("saslSupportedMechs", mechs.clone());
        }
        if let Some(ref speculative) = self.speculative_authenticate {
            command
                .body
                .insert("speculativeAuthenticate", speculative.clone());
        }
        Ok(command)
    }
}
