use futures_core::future::BoxFuture;

use crate::{
    cmap::Connection,
    error::{Error, Result},
    options::ServerAddress,
    sdam::TopologyDescription,
};

/// Everything the command pipeline needs from a live deployment: the current topology snapshot,
/// a way to wait for it to change, and handshaked connections to its servers.
///
/// Implementations own discovery, monitoring and pooling. Connections returned by
/// [`Deployment::check_out`] must already have gone through
/// [`Handshaker::handshake`](crate::Handshaker::handshake).
pub trait Deployment: Send + Sync + 'static {
    /// The most recent topology snapshot.
    fn description(&self) -> TopologyDescription;

    /// Resolves once the topology has changed after this call was made. Callers bound the wait
    /// themselves.
    fn wait_for_change(&self) -> BoxFuture<'_, ()>;

    /// Asks the monitors to check every server as soon as possible.
    fn request_check(&self);

    /// Checks out a connection to the server at `address`.
    fn check_out<'a>(&'a self, address: &'a ServerAddress) -> BoxFuture<'a, Result<Connection>>;

    /// Returns a connection after use. Broken connections are passed back as well so that the
    /// deployment can account for them; it must close them rather than reuse them.
    fn check_in(&self, connection: Connection);

    /// Reports an error an operation hit against `address`, so the deployment can mark the server
    /// unknown or clear its pool. Called for network errors and state change errors.
    fn handle_application_error(&self, address: &ServerAddress, error: &Error);
}
