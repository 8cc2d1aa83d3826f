use serde::{de::DeserializeOwned, Serialize};

use super::wire::DocumentSequence;
use crate::{
    bson::{Document, RawDocument, RawDocumentBuf, Timestamp},
    bson_util,
    client::{options::ServerApi, ClusterTime},
    concern::{ReadConcernInternal, WriteConcern},
    error::{Error, ErrorKind, Result},
    hello::{HelloCommandResponse, HelloReply, HELLO_COMMAND_NAMES},
    operation::{CommandErrorBody, CommandResponse},
    options::ServerAddress,
    selection_criteria::ReadPreference,
    serde_util,
};

/// Commands whose bodies and replies never appear in events or logs, and which are never
/// compressed.
pub(crate) const REDACTED_COMMANDS: [&str; 9] = [
    "authenticate",
    "saslstart",
    "saslcontinue",
    "getnonce",
    "createuser",
    "updateuser",
    "copydbgetnonce",
    "copydbsaslstart",
    "copydb",
];

/// Driver-side model of a database command.
///
/// `body` holds what the operation builder wrote. Every other field is injected by the runtime and
/// is only added to the wire document when the builder did not already write a field of the same
/// name.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Command {
    #[serde(skip)]
    pub(crate) name: String,

    #[serde(skip)]
    pub(crate) body: Document,

    #[serde(skip)]
    pub(crate) document_sequences: Vec<DocumentSequence>,

    #[serde(skip)]
    pub(crate) exhaust_allowed: bool,

    /// Frame this command as an OP_QUERY.
    #[serde(skip)]
    pub(crate) legacy: bool,

    #[serde(rename = "$db")]
    pub(crate) target_db: String,

    pub(crate) lsid: Option<Document>,

    #[serde(rename = "$clusterTime")]
    pub(crate) cluster_time: Option<ClusterTime>,

    #[serde(flatten)]
    server_api: Option<ServerApi>,

    #[serde(rename = "$readPreference")]
    pub(crate) read_preference: Option<ReadPreference>,

    pub(crate) txn_number: Option<i64>,

    start_transaction: Option<bool>,

    autocommit: Option<bool>,

    #[serde(skip_serializing_if = "read_concern_is_empty")]
    pub(crate) read_concern: Option<ReadConcernInternal>,

    #[serde(skip_serializing_if = "serde_util::write_concern_is_empty")]
    pub(crate) write_concern: Option<WriteConcern>,

    recovery_token: Option<Document>,

    #[serde(rename = "maxTimeMS")]
    pub(crate) max_time_ms: Option<i64>,
}

fn read_concern_is_empty(read_concern: &Option<ReadConcernInternal>) -> bool {
    read_concern.as_ref().is_none_or(ReadConcernInternal::is_empty)
}

impl Command {
    pub(crate) fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
            ..Default::default()
        }
    }

    pub(crate) fn add_document_sequence(
        &mut self,
        identifier: impl ToString,
        documents: Vec<RawDocumentBuf>,
    ) {
        self.document_sequences.push(DocumentSequence {
            identifier: identifier.to_string(),
            documents,
        });
    }

    pub(crate) fn set_session(&mut self, lsid: &Document) {
        self.lsid = Some(lsid.clone());
    }

    pub(crate) fn set_cluster_time(&mut self, cluster_time: &ClusterTime) {
        self.cluster_time = Some(cluster_time.clone());
    }

    pub(crate) fn set_recovery_token(&mut self, recovery_token: &Document) {
        self.recovery_token = Some(recovery_token.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.txn_number = Some(txn_number);
    }

    pub(crate) fn set_server_api(&mut self, server_api: &ServerApi) {
        self.server_api = Some(server_api.clone());
    }

    pub(crate) fn set_read_preference(&mut self, read_preference: ReadPreference) {
        self.read_preference = Some(read_preference);
    }

    pub(crate) fn set_start_transaction(&mut self) {
        self.start_transaction = Some(true);
    }

    pub(crate) fn set_autocommit(&mut self) {
        self.autocommit = Some(false);
    }

    pub(crate) fn set_read_concern(&mut self, read_concern: ReadConcernInternal) {
        self.read_concern = Some(read_concern);
    }

    pub(crate) fn set_write_concern(&mut self, write_concern: WriteConcern) {
        self.write_concern = Some(write_concern);
    }

    /// Adds `afterClusterTime` to the read concern without touching its level.
    pub(crate) fn set_after_cluster_time(&mut self, operation_time: Timestamp) {
        self.read_concern
            .get_or_insert_with(Default::default)
            .after_cluster_time = Some(operation_time);
    }

    /// The document sent in section 0 of an OP_MSG: the builder's body followed by every injected
    /// field the body does not already carry.
    pub(crate) fn to_wire_document(&self) -> Result<Document> {
        let injected = crate::bson::to_document(self)?;
        let mut document = self.body.clone();
        bson_util::merge_missing(&mut document, injected);
        Ok(document)
    }

    /// The query document of an OP_QUERY, which addresses the database through the collection
    /// name instead of `$db`.
    pub(crate) fn to_legacy_document(&self) -> Result<Document> {
        let mut injected = crate::bson::to_document(self)?;
        injected.remove("$db");
        let mut document = self.body.clone();
        bson_util::merge_missing(&mut document, injected);
        Ok(document)
    }

    pub(crate) fn should_redact(&self) -> bool {
        let name = self.name.to_lowercase();
        REDACTED_COMMANDS.contains(&name.as_str())
            || (HELLO_COMMAND_NAMES.contains(&name.as_str())
                && self.body.contains_key("speculativeAuthenticate"))
    }

    pub(crate) fn should_compress(&self) -> bool {
        let name = self.name.to_lowercase();
        !REDACTED_COMMANDS.contains(&name.as_str()) && !HELLO_COMMAND_NAMES.contains(&name.as_str())
    }
}

/// A reply to a command, as read off the wire.
#[derive(Debug, Clone)]
pub(crate) struct RawCommandResponse {
    pub(crate) source: ServerAddress,
    pub(crate) raw: RawDocumentBuf,
}

impl RawCommandResponse {
    #[cfg(test)]
    pub(crate) fn with_document_and_address(source: ServerAddress, doc: Document) -> Result<Self> {
        Ok(Self {
            source,
            raw: RawDocumentBuf::from_document(&doc)?,
        })
    }

    pub(crate) fn new(source: ServerAddress, raw: RawDocumentBuf) -> Self {
        Self { source, raw }
    }

    pub(crate) fn body<T: DeserializeOwned>(&self) -> Result<T> {
        crate::bson::from_slice(self.raw.as_bytes()).map_err(|e| {
            Error::from(ErrorKind::InvalidResponse {
                message: format!("{e}"),
            })
        })
    }

    pub(crate) fn raw_body(&self) -> &RawDocument {
        &self.raw
    }

    /// Whether the reply reports `ok: 1`.
    pub(crate) fn is_success(&self) -> bool {
        self.raw
            .get("ok")
            .ok()
            .flatten()
            .and_then(bson_util::get_int_raw)
            == Some(1)
    }

    /// Converts an `ok: 0` reply into a command error carrying the reply's labels.
    pub(crate) fn command_error(&self) -> Error {
        match self.body::<CommandErrorBody>() {
            Ok(error_body) => Error::from(error_body).with_server_response(&self.raw),
            Err(_) => Error::invalid_response("command failed without an error code"),
        }
    }

    pub(crate) fn into_hello_reply(self) -> Result<HelloReply> {
        match self.body::<CommandResponse<HelloCommandResponse>>() {
            Ok(response) if response.is_success() => Ok(HelloReply {
                server_address: self.source,
                command_response: response.body,
            }),
            _ => Err(self.command_error()),
        }
    }
}
