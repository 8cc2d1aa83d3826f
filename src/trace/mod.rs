use crate::{
    bson::{oid::ObjectId, Bson, Document},
    error::Error,
    options::{ServerAddress, DEFAULT_PORT},
    sdam::TopologyDescription,
    selection_criteria::SelectionCriteria,
};

pub(crate) mod command;
pub(crate) mod connection;
pub(crate) mod server_selection;


pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongodb_core::command";
pub(crate) const CONNECTION_TRACING_EVENT_TARGET: &str = "mongodb_core::connection";
pub(crate) const SERVER_SELECTION_TRACING_EVENT_TARGET: &str = "mongodb_core::server_selection";

/// Longest command or reply rendered into a tracing event, unless configured otherwise.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for ObjectId {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_hex()
    }
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        Bson::Document(self.clone())
            .into_relaxed_extjson()
            .to_string()
    }
}

impl TracingRepresentation for Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for SelectionCriteria {
    type Representation = String;

    fn tracing_representation(&self) -> Self::Representation {
        self.to_string()
    }
}

impl TracingRepresentation for TopologyDescription {
    type Representation = String;

    fn tracing_representation(&self) -> Self::Representation {
        self.to_string()
    }
}

impl ServerAddress {
    /// The port reported in events, filled in with the default when the address omits it.
    pub(crate) fn port_tracing_representation(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => Some(port.unwrap_or(DEFAULT_PORT)),
        }
    }
}

/// Renders a command or reply as relaxed extended JSON, cut to at most `max_length_bytes` bytes
/// (plus a trailing `...` when cut).
pub(crate) fn serialize_command_or_reply(doc: &Document, max_length_bytes: usize) -> String {
    let mut serialized = doc.tracing_representation();
    if serialized.len() > max_length_bytes {
        truncate_on_char_boundary(&mut serialized, max_length_bytes);
        serialized.push_str("...");
    }
    serialized
}

/// Truncates `s` to at most `new_len` bytes without splitting a multi-byte character.
pub(crate) fn truncate_on_char_boundary(s: &mut String, new_len: usize) {
    if s.len() <= new_len {
        return;
    }
    let mut boundary = new_len;
    while !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    s.truncate(boundary);
}
