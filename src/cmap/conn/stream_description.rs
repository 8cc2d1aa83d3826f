use std::time::Duration;

use crate::{
    bson::oid::ObjectId,
    hello::HelloReply,
    sdam::ServerType,
};

pub(crate) const DEFAULT_MAX_BSON_OBJECT_SIZE: i64 = 16 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_WRITE_BATCH_SIZE: i64 = 100_000;
pub(crate) const DEFAULT_MAX_MESSAGE_SIZE_BYTES: i32 = 48_000_000;

/// Contains information about a given server in a format digestible by a connection.
#[derive(Debug, Default, Clone)]
pub(crate) struct StreamDescription {
    /// The type of the server when the handshake occurred.
    pub(crate) initial_server_type: ServerType,

    /// The maximum wire version that the server understands.
    pub(crate) max_wire_version: Option<i32>,

    /// The supported authentication mechanisms that the server understands.
    pub(crate) sasl_supported_mechs: Option<Vec<String>>,

    /// How long sessions started on this server will stay alive without executing an operation
    /// before the server kills them.
    pub(crate) logical_session_timeout: Option<Duration>,

    /// The maximum size of a single document.
    pub(crate) max_bson_object_size: i64,

    /// The maximum number of inserts, updates, or deletes that can be included in a write batch.
    pub(crate) max_write_batch_size: i64,

    /// Whether the server associated with this connection supports the `hello` command.
    pub(crate) hello_ok: bool,

    /// The maximum permitted size of a wire protocol message.
    pub(crate) max_message_size_bytes: i32,

    /// If the connection is to a load balancer, the id of the selected backend.
    pub(crate) service_id: Option<ObjectId>,
}

impl StreamDescription {
    /// Constructs a new StreamDescription from a `HelloReply`.
    pub(crate) fn from_hello_reply(reply: &HelloReply) -> Self {
        let response = &reply.command_response;
        Self {
            initial_server_type: response.server_type(),
            max_wire_version: response.max_wire_version,
            sasl_supported_mechs: response.sasl_supported_mechs.clone(),
            logical_session_timeout: response
                .logical_session_timeout_minutes
                .map(|mins| Duration::from_secs(mins.max(0) as u64 * 60)),
            max_bson_object_size: response
                .max_bson_object_size
                .unwrap_or(DEFAULT_MAX_BSON_OBJECT_SIZE),
            max_write_batch_size: response
                .max_write_batch_size
                .unwrap_or(DEFAULT_MAX_WRITE_BATCH_SIZE),
            hello_ok: response.hello_ok.unwrap_or(false),
            max_message_size_bytes: response
                .max_message_size_bytes
                .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE_BYTES),
            service_id: response.service_id,
        }
    }

    /// Whether commands sent over this stream may carry an `lsid`.
    pub(crate) fn supports_sessions(&self) -> bool {
        self.logical_session_timeout.is_some()
            || self.initial_server_type == ServerType::LoadBalancer
    }

    /// Whether this StreamDescription supports retryable writes.
    pub(crate) fn supports_retryable_writes(&self) -> bool {
        self.initial_server_type != ServerType::Standalone
            && self.logical_session_timeout.is_some()
            && self.max_wire_version.is_some_and(|version| version >= 6)
    }

    /// Gets a description of a stream for a connection to a server with the provided
    /// maxWireVersion.
    #[cfg(test)]
    pub(crate) fn with_wire_version(max_wire_version: i32) -> Self {
        Self {
            initial_server_type: ServerType::RsPrimary,
            max_wire_version: Some(max_wire_version),
            sasl_supported_mechs: None,
            logical_session_timeout: Some(Duration::from_secs(30 * 60)),
            max_bson_object_size: DEFAULT_MAX_BSON_OBJECT_SIZE,
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
            hello_ok: true,
            max_message_size_bytes: DEFAULT_MAX_MESSAGE_SIZE_BYTES,
            service_id: None,
        }
    }
}
