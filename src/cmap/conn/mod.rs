mod command;
mod stream_description;
pub(crate) mod wire;

use std::fmt;

use derive_where::derive_where;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};

use self::wire::{next_request_id, Message, MessageFlags, Query};
use crate::{
    bson::Document,
    compression::Compressor,
    error::{Error, Result},
    options::ServerAddress,
};
pub(crate) use command::{Command, RawCommandResponse};
pub(crate) use stream_description::StreamDescription;

/// A byte stream a `Connection` can run commands over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> AsyncStream for T {}

/// User-facing information about a connection to the database.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct ConnectionInfo {
    /// A driver-generated identifier that uniquely identifies the connection.
    pub id: u32,

    /// The address that the connection is connected to.
    pub address: ServerAddress,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.id)
    }
}

/// An established stream to one server, as handed out by a [`Deployment`](crate::Deployment).
///
/// A connection whose last exchange failed at the transport or framing level reports
/// [`Connection::is_broken`] and must be discarded instead of reused.
#[derive_where(Debug)]
pub struct Connection {
    pub(crate) id: u32,
    pub(crate) address: ServerAddress,

    /// The cached StreamDescription from the connection's handshake.
    pub(crate) stream_description: Option<StreamDescription>,

    /// The compressor negotiated during the handshake.
    pub(crate) compressor: Option<Compressor>,

    /// Whether outgoing messages carry a CRC-32C checksum.
    checksum: bool,

    /// The `speculativeAuthenticate` document the server answered during the handshake.
    pub(crate) speculative_authenticate: Option<Document>,

    /// The error that broke this connection, if any.
    pub(crate) error: Option<Error>,

    /// Set while a request is written but its reply has not been read. A connection dropped from
    /// a cancelled future in this state may still receive the reply and cannot be reused.
    in_flight: bool,

    /// The request id of the last reply when it was flagged `moreToCome`. The next reply on the
    /// stream answers it.
    streaming: Option<i32>,

    #[derive_where(skip)]
    stream: BufStream<Box<dyn AsyncStream>>,
}

impl Connection {
    /// Wraps an established stream. The connection still needs a handshake before it can run
    /// operations.
    pub fn new(address: ServerAddress, id: u32, stream: impl AsyncStream + 'static) -> Self {
        Self {
            id,
            address,
            stream_description: None,
            compressor: None,
            checksum: false,
            speculative_authenticate: None,
            error: None,
            in_flight: false,
            streaming: None,
            stream: BufStream::new(Box::new(stream)),
        }
    }

    /// Requests a CRC-32C checksum on every outgoing OP_MSG.
    pub fn with_checksums(mut self) -> Self {
        self.checksum = true;
        self
    }

    /// The id and address of this connection, as reported in events.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            address: self.address.clone(),
        }
    }

    /// The address of the server this connection is connected to.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Whether this connection must be discarded rather than reused.
    pub fn is_broken(&self) -> bool {
        self.error.is_some() || self.in_flight || self.streaming.is_some()
    }

    /// Whether the server will send more replies to the last command without a new request.
    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// The SASL mechanisms the server listed in the handshake reply for the user named by
    /// [`Authenticator::sasl_supported_mechs`](crate::Authenticator::sasl_supported_mechs).
    pub fn sasl_supported_mechs(&self) -> Option<&[String]> {
        self.stream_description
            .as_ref()
            .and_then(|description| description.sasl_supported_mechs.as_deref())
    }

    /// Gets the connection's StreamDescription.
    pub(crate) fn stream_description(&self) -> Result<&StreamDescription> {
        self.stream_description
            .as_ref()
            .ok_or_else(|| Error::internal("stream checked out but not handshaked"))
    }

    /// Executes a `Command` and returns a `RawCommandResponse` containing the result from the
    /// server.
    ///
    /// An `Ok(...)` result simply means the server received the command and that the driver
    /// received the response; it does not imply anything about the success of the command
    /// itself.
    pub(crate) async fn send_command(
        &mut self,
        command: &Command,
        request_id: impl Into<Option<i32>>,
    ) -> Result<RawCommandResponse> {
        self.check_usable()?;
        if self.streaming.is_some() {
            return Err(Error::internal(
                "attempted to send a command while streamed replies are pending",
            ));
        }

        let request_id = request_id.into().unwrap_or_else(next_request_id);
        self.in_flight = true;
        let result = self.exchange(command, request_id).await;
        self.in_flight = false;
        self.record_failure(&result);
        result
    }

    /// Reads the next reply of a stream opened by a command sent with `exhaust_allowed`.
    pub(crate) async fn receive_streamed(&mut self) -> Result<RawCommandResponse> {
        self.check_usable()?;
        let Some(previous) = self.streaming else {
            return Err(Error::internal("no streamed reply is pending on this connection"));
        };

        self.in_flight = true;
        let result = self.read_reply(previous).await;
        self.in_flight = false;
        self.record_failure(&result);
        result
    }

    fn check_usable(&self) -> Result<()> {
        match self.error {
            Some(ref error) => Err(Error::internal(format!(
                "attempted to send a command on a broken connection: {error}"
            ))),
            None => Ok(()),
        }
    }

    fn record_failure(&mut self, result: &Result<RawCommandResponse>) {
        if let Err(ref error) = result {
            if error.is_connection_fatal() {
                self.error = Some(error.clone());
            }
        }
    }

    /// Runs a single command against `db` and returns the reply body. Replies with `ok: 0` are
    /// returned as errors. Intended for authentication conversations driven by an
    /// [`Authenticator`](crate::Authenticator).
    pub async fn run_command(&mut self, db: &str, body: Document) -> Result<Document> {
        let name = body
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| Error::invalid_argument("command document must not be empty"))?;
        let response = self.send_command(&Command::new(name, db, body), None).await?;
        if !response.is_success() {
            return Err(response.command_error());
        }
        response.body()
    }

    async fn exchange(&mut self, command: &Command, request_id: i32) -> Result<RawCommandResponse> {
        if command.legacy {
            Query::from_command(command, Some(request_id))?
                .write_to(&mut self.stream)
                .await?;
        } else {
            let mut message = Message::from_command(command, Some(request_id))?;
            match self.compressor {
                Some(ref compressor) if command.should_compress() => {
                    message.write_compressed_to(&mut self.stream, compressor).await?
                }
                _ => {
                    if self.checksum {
                        message.flags |= MessageFlags::CHECKSUM_PRESENT;
                    }
                    message.write_to(&mut self.stream).await?
                }
            }
        }

        self.read_reply(request_id).await
    }

    async fn read_reply(&mut self, request_id: i32) -> Result<RawCommandResponse> {
        let max_message_size = self
            .stream_description
            .as_ref()
            .map(|description| description.max_message_size_bytes);
        let reply = Message::read_from(&mut self.stream, max_message_size).await?;
        if reply.response_to != request_id {
            return Err(Error::invalid_response(format!(
                "expected a reply to request {request_id}, got a reply to {}",
                reply.response_to
            )));
        }

        self.streaming = reply
            .request_id
            .filter(|_| reply.flags.contains(MessageFlags::MORE_TO_COME));
        Ok(RawCommandResponse::new(
            self.address.clone(),
            reply.document_payload,
        ))
    }
}
