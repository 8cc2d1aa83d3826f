use crate::{
    event::command::CommandEvent,
    trace::{serialize_command_or_reply, TracingRepresentation, COMMAND_TRACING_EVENT_TARGET},
};

use super::DEFAULT_MAX_DOCUMENT_LENGTH_BYTES;

/// Logs a command event at `DEBUG` under the command target, with the connection and request
/// fields every command event shares followed by the ones given.
macro_rules! log_command_event {
    ($event:expr, $message:literal, $($field:ident = $value:expr),* $(,)?) => {
        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            commandName = $event.command_name,
            requestId = $event.request_id,
            driverConnectionId = $event.connection.id,
            serverHost = $event.connection.address.host(),
            serverPort = $event.connection.address.port_tracing_representation(),
            serviceId = $event.service_id.map(|id| id.tracing_representation()),
            $($field = $value,)*
            $message
        )
    };
}

/// Turns command monitoring events into `tracing` events, cutting documents to a configured
/// length.
pub(crate) struct CommandTracingEventEmitter {
    max_document_length_bytes: usize,
}

impl CommandTracingEventEmitter {
    pub(crate) fn new(max_document_length_bytes: Option<usize>) -> Self {
        Self {
            max_document_length_bytes: max_document_length_bytes
                .unwrap_or(DEFAULT_MAX_DOCUMENT_LENGTH_BYTES),
        }
    }

    pub(crate) fn handle(&self, event: &CommandEvent) {
        let max_length = self.max_document_length_bytes;
        match event {
            CommandEvent::Started(started) => log_command_event!(
                started,
                "Command started",
                databaseName = started.db,
                command = serialize_command_or_reply(&started.command, max_length),
            ),
            CommandEvent::Succeeded(succeeded) => log_command_event!(
                succeeded,
                "Command succeeded",
                durationMS = succeeded.duration.as_millis(),
                reply = serialize_command_or_reply(&succeeded.reply, max_length),
            ),
            CommandEvent::Failed(failed) => log_command_event!(
                failed,
                "Command failed",
                durationMS = failed.duration.as_millis(),
                failure = failed.failure.tracing_representation(),
            ),
        }
    }
}
