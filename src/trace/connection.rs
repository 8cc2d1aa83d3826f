use crate::{
    cmap::ConnectionInfo,
    error::Error,
    trace::{TracingRepresentation, CONNECTION_TRACING_EVENT_TARGET},
};

/// Logs a connection that is closed instead of being returned to its deployment.
pub(crate) fn emit_connection_discarded(connection: &ConnectionInfo, reason: Option<&Error>) {
    tracing::debug!(
        target: CONNECTION_TRACING_EVENT_TARGET,
        driverConnectionId = connection.id,
        serverHost = connection.address.host(),
        serverPort = connection.address.port_tracing_representation(),
        reason = reason.map(|error| error.tracing_representation()),
        "Connection discarded",
    );
}
