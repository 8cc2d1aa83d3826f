//! Connections to a single server: wire framing, the handshake and the per-connection state
//! operations run against.

pub(crate) mod conn;
pub(crate) mod establish;

pub use self::{
    conn::{AsyncStream, Connection, ConnectionInfo},
    establish::Handshaker,
};
pub(crate) use self::conn::{Command, RawCommandResponse, StreamDescription};
