//! The authentication seam of a [`Client`](crate::Client).
//!
//! Mechanisms (SCRAM, X.509, OIDC...) live outside this crate. The handshake drives an
//! [`Authenticator`] once per connection, and the runtime calls it again when the server reports
//! that a connection must reauthenticate.

use futures_core::future::BoxFuture;

use crate::{bson::Document, cmap::Connection, error::Result};

/// Authenticates connections on behalf of a client.
///
/// Use [`Connection::run_command`] to exchange the conversation's commands.
pub trait Authenticator: Send + Sync {
    /// A value for the handshake's `saslSupportedMechs` field, as `<db>.<username>`. The server's
    /// answer is available from [`Connection::sasl_supported_mechs`] during
    /// [`Authenticator::authenticate`].
    fn sasl_supported_mechs(&self) -> Option<String> {
        None
    }

    /// The first message of the conversation, sent inside the handshake as
    /// `speculativeAuthenticate`.
    fn speculative_authenticate(&self) -> Option<Document> {
        None
    }

    /// Authenticates a freshly handshaked connection. `speculative_reply` holds the server's answer
    /// to [`Authenticator::speculative_authenticate`], if it sent one.
    fn authenticate<'a>(
        &'a self,
        conn: &'a mut Connection,
        speculative_reply: Option<Document>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Authenticates `conn` again after the server answered a command with
    /// `ReauthenticationRequired`. The command is resent afterwards.
    fn reauthenticate<'a>(&'a self, conn: &'a mut Connection) -> BoxFuture<'a, Result<()>> {
        self.authenticate(conn, None)
    }
}
