mod abort_transaction;
mod aggregate;
pub(crate) mod batch;
mod commit_transaction;
mod count;
mod create_indexes;
mod delete;
mod distinct;
mod drop_collection;
mod drop_database;
mod drop_indexes;
mod end_sessions;
mod find;
mod find_and_modify;
mod get_more;
mod hello;
mod insert;
mod list_collections;
mod list_databases;
mod list_indexes;
mod run_command;
mod search_index;
mod update;

#[cfg(test)]
mod test;

use std::{fmt::Debug, ops::Deref, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    bson::{self, Bson, Document, RawDocumentBuf},
    bson_util,
    client::options::ClientOptions,
    cmap::{Command, Connection, RawCommandResponse, StreamDescription},
    concern::{ReadConcern, WriteConcern},
    error::{
        CommandError,
        Error,
        ErrorKind,
        IndexedWriteError,
        Result,
        WriteConcernError,
        WriteFailure,
    },
    selection_criteria::SelectionCriteria,
};

pub(crate) use abort_transaction::AbortTransaction;
pub(crate) use aggregate::{Aggregate, AggregateTarget};
pub(crate) use batch::Batches;
pub(crate) use commit_transaction::CommitTransaction;
pub(crate) use count::Count;
pub(crate) use create_indexes::CreateIndexes;
pub(crate) use delete::{Delete, DeleteStatement};
pub(crate) use distinct::Distinct;
pub(crate) use drop_collection::DropCollection;
pub(crate) use drop_database::DropDatabase;
pub(crate) use drop_indexes::DropIndexes;
pub(crate) use end_sessions::EndSessions;
pub(crate) use find::Find;
pub(crate) use find_and_modify::{FindAndModify, Modification};
pub(crate) use get_more::GetMore;
pub(crate) use hello::Hello;
pub(crate) use insert::Insert;
pub(crate) use list_collections::ListCollections;
pub(crate) use list_databases::ListDatabases;
pub(crate) use list_indexes::ListIndexes;
pub(crate) use run_command::RunCommand;
pub(crate) use search_index::{CreateSearchIndexes, DropSearchIndex, UpdateSearchIndex};
pub(crate) use update::{Update, UpdateStatement};

pub(crate) const SERVER_4_2_0_WIRE_VERSION: i32 = 8;
pub(crate) const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// The oldest wire version that understands `collation`.
pub(crate) const COLLATION_WIRE_VERSION: i32 = 5;

/// The amount of message overhead (OP_MSG bytes and command-agnostic fields) to account for when
/// splitting a write into document sequences.
pub(crate) const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// Context about the execution of the operation.
pub(crate) struct ExecutionContext<'a> {
    pub(crate) connection: &'a Connection,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    Read,
    None,
}

impl Retryability {
    /// Returns this level of retryability in tandem with the client options.
    pub(crate) fn with_options(&self, options: &ClientOptions) -> Self {
        match self {
            Self::Write if options.retry_writes != Some(false) => Self::Write,
            Self::Read if options.retry_reads != Some(false) => Self::Read,
            _ => Self::None,
        }
    }
}

/// A trait modeling the behavior of a server side operation.
pub(crate) trait Operation: Send + Sync {
    /// The output type of this operation.
    type O: Send;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    /// The operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &StreamDescription) -> Result<Command>;

    /// Interprets the server response to the command. Batched writes are called once per frame.
    fn handle_response(
        &mut self,
        response: RawCommandResponse,
        context: ExecutionContext<'_>,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// Criteria to use for selecting the server that this operation will be executed on.
    fn selection_criteria(&self) -> Feature<&SelectionCriteria> {
        Feature::Inherit
    }

    /// The read concern to use for this operation, if any.
    fn read_concern(&self) -> Feature<&ReadConcern> {
        Feature::NotSupported
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Feature<&WriteConcern> {
        Feature::NotSupported
    }

    /// Whether this operation supports sessions or not.
    fn supports_sessions(&self) -> bool {
        true
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    /// An explicit server-side time limit, sent as `maxTimeMS` when no client timeout applies.
    fn max_time(&self) -> Option<Duration> {
        None
    }

    /// Whether `maxTimeMS` must not be derived from the client timeout for this command.
    fn omit_csot_max_time_ms(&self) -> bool {
        false
    }

    /// The document sequence this operation splits across frames, if it is a batched write.
    fn batches(&mut self) -> Option<&mut Batches> {
        None
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) enum Feature<T> {
    Set(T),
    Inherit,
    NotSupported,
}

impl<T> From<Option<T>> for Feature<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(c) => Self::Set(c),
            None => Self::Inherit,
        }
    }
}

impl<T> Feature<T> {
    pub(crate) fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub(crate) fn supported(&self) -> bool {
        !matches!(self, Self::NotSupported)
    }
}

/// A response to a command with a body shaped deserialized to a `T`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandResponse<T> {
    pub(crate) ok: Bson,

    #[serde(flatten)]
    pub(crate) body: T,
}

impl<T: DeserializeOwned> CommandResponse<T> {
    /// Whether the command succeeeded or not (i.e. if this response is ok: 1).
    pub(crate) fn is_success(&self) -> bool {
        bson_util::get_int(&self.ok) == Some(1)
    }
}

/// A response body useful for deserializing command errors.
#[derive(Deserialize, Debug)]
pub(crate) struct CommandErrorBody {
    #[serde(rename = "errorLabels")]
    pub(crate) error_labels: Option<Vec<String>>,

    #[serde(flatten)]
    pub(crate) command_error: CommandError,
}

impl From<CommandErrorBody> for Error {
    fn from(command_error_response: CommandErrorBody) -> Error {
        Error::new(
            ErrorKind::Command(command_error_response.command_error),
            command_error_response.error_labels,
        )
    }
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to a
/// Document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize + Debug>(
    doc: &mut Document,
    options: Option<&T>,
) -> Result<()> {
    if let Some(options) = options {
        match bson::to_bson(options)? {
            Bson::Document(options_doc) => doc.extend(options_doc),
            other => {
                return Err(Error::internal(format!(
                    "options did not serialize to a document: {other:?}"
                )))
            }
        }
    }
    Ok(())
}

/// Rejects a collation the selected server cannot honor.
pub(crate) fn check_collation_support(
    description: &StreamDescription,
    has_collation: bool,
) -> Result<()> {
    if has_collation && description.max_wire_version.unwrap_or(0) < COLLATION_WIRE_VERSION {
        return Err(Error::invalid_argument(
            "collation is not supported by the selected server",
        ));
    }
    Ok(())
}

/// Rejects a hint on a write the server will not acknowledge.
pub(crate) fn check_hint_acknowledged(
    write_concern: Option<&WriteConcern>,
    has_hint: bool,
) -> Result<()> {
    if has_hint && write_concern.is_some_and(|wc| !wc.is_acknowledged()) {
        return Err(Error::invalid_argument(
            "hint is not supported on unacknowledged writes",
        ));
    }
    Ok(())
}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error.clone())),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct SingleWriteBody {
    #[serde(default)]
    pub(crate) n: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponseBody<T = SingleWriteBody> {
    #[serde(flatten)]
    pub(crate) body: T,

    #[serde(rename = "writeErrors")]
    pub(crate) write_errors: Option<Vec<IndexedWriteError>>,

    #[serde(rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    pub(crate) labels: Option<Vec<String>>,
}

impl<T> WriteResponseBody<T> {
    /// Write errors reported by this frame, with indexes moved from frame positions to positions
    /// in the whole operation.
    pub(crate) fn offset_write_errors(&self, offset: usize) -> Option<Vec<IndexedWriteError>> {
        self.write_errors.as_ref().map(|errors| {
            errors
                .iter()
                .cloned()
                .map(|mut error| {
                    error.index += offset;
                    error
                })
                .collect()
        })
    }
}

impl<T> Deref for WriteResponseBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// The `cursor` document of a reply to a cursor-producing command.
#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: String,

    #[serde(default)]
    pub(crate) first_batch: Vec<RawDocumentBuf>,

    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}

impl CursorBody {
    pub(crate) fn extract(response: &RawCommandResponse) -> Result<Self> {
        response.body()
    }
}
