//! Contains the events and functionality for monitoring the commands and responses that a
//! `Client` sends and receives from the server.

use std::time::Duration;

use crate::{
    bson::{oid::ObjectId, Document},
    cmap::ConnectionInfo,
    error::Error,
};

/// An event that triggers when a database command is initiated.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CommandStartedEvent {
    /// The command being run. Empty for sensitive commands.
    pub command: Document,

    /// The name of the database the command is being run against.
    pub db: String,

    /// The type of command being run, e.g. "find" or "hello".
    pub command_name: String,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding event triggered by the completion of this command (i.e. either
    /// `CommandSucceededEvent` or `CommandFailedEvent`).
    pub request_id: i32,

    /// Information about the connection the command will be run on.
    pub connection: ConnectionInfo,

    /// If the client connection is to a load balancer, the id of the selected backend.
    pub service_id: Option<ObjectId>,
}

/// An event that triggers when a database command completes without an error.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CommandSucceededEvent {
    /// The total execution time of the command (including the network round-trip).
    pub duration: Duration,

    /// The server's reply to the command. Empty for sensitive commands.
    pub reply: Document,

    /// The type of command that was run, e.g. "find" or "hello".
    pub command_name: String,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding `CommandStartedEvent` that triggered earlier.
    pub request_id: i32,

    /// Information about the connection the command was run on.
    pub connection: ConnectionInfo,

    /// If the client connection is to a load balancer, the id of the selected backend.
    pub service_id: Option<ObjectId>,
}

/// An event that triggers when a command failed to complete successfully.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CommandFailedEvent {
    /// The total execution time of the command (including the network round-trip).
    pub duration: Duration,

    /// The type of command that was run, e.g. "find" or "hello".
    pub command_name: String,

    /// The error that the driver returned due to the event failing.
    pub failure: Error,

    /// The driver-generated identifier for the request. Applications can use this to identify the
    /// corresponding `CommandStartedEvent` that triggered earlier.
    pub request_id: i32,

    /// Information about the connection the command was run on.
    pub connection: ConnectionInfo,

    /// If the client connection is to a load balancer, the id of the selected backend.
    pub service_id: Option<ObjectId>,
}

/// Any of the command monitoring events.
#[derive(Clone, Debug, derive_more::From)]
#[non_exhaustive]
pub enum CommandEvent {
    Started(CommandStartedEvent),
    Succeeded(CommandSucceededEvent),
    Failed(CommandFailedEvent),
}

/// Applications can implement this trait to specify custom logic to run on each command event sent
/// by the driver.
///
/// ```rust
/// # use mongodb_core::event::command::{CommandEventHandler, CommandFailedEvent};
///
/// struct FailedCommandLogger;
///
/// impl CommandEventHandler for FailedCommandLogger {
///     fn handle_command_failed_event(&self, event: CommandFailedEvent) {
///         eprintln!("Failed command: {:?}", event);
///     }
/// }
/// ```
pub trait CommandEventHandler: Send + Sync {
    /// A `Client` will call this method on each registered handler whenever a database command is
    /// initiated.
    fn handle_command_started_event(&self, _event: CommandStartedEvent) {}

    /// A `Client` will call this method on each registered handler whenever a database command
    /// successfully completes.
    fn handle_command_succeeded_event(&self, _event: CommandSucceededEvent) {}

    /// A `Client` will call this method on each registered handler whenever a database command
    /// fails to complete successfully.
    fn handle_command_failed_event(&self, _event: CommandFailedEvent) {}
}

impl CommandEvent {
    pub(crate) fn dispatch(self, handler: &dyn CommandEventHandler) {
        match self {
            CommandEvent::Started(event) => handler.handle_command_started_event(event),
            CommandEvent::Succeeded(event) => handler.handle_command_succeeded_event(event),
            CommandEvent::Failed(event) => handler.handle_command_failed_event(event),
        }
    }
}
