#[cfg(test)]
mod test;

use std::{
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use derive_where::derive_where;
use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    client::{auth::Authenticator, csfle::Crypt},
    compression::Compressor,
    concern::{ReadConcern, WriteConcern},
    error::{Error, Result},
    event::command::CommandEventHandler,
    selection_criteria::SelectionCriteria,
};

/// The port a server listens on when an address does not name one.
pub const DEFAULT_PORT: u16 = 27017;

pub(crate) const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// An enum representing the address of a MongoDB server.
#[derive(Clone, Debug, Eq)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address where the MongoDB server can be found.
        host: String,

        /// The TCP port that the MongoDB server is listening on.
        ///
        /// The default is 27017.
        port: Option<u16>,
    },
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".into(),
            port: None,
        }
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Tcp { host, port },
                Self::Tcp {
                    host: other_host,
                    port: other_port,
                },
            ) => {
                host == other_host
                    && port.unwrap_or(DEFAULT_PORT) == other_port.unwrap_or(DEFAULT_PORT)
            }
        }
    }
}

impl Hash for ServerAddress {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        match self {
            Self::Tcp { host, port } => {
                host.hash(state);
                port.unwrap_or(DEFAULT_PORT).hash(state);
            }
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(address: &str) -> Result<Self> {
        Self::parse(address)
    }
}

impl ServerAddress {
    /// Parses an address string into a `ServerAddress`.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let invalid = || Error::invalid_argument(format!("invalid server address: \"{address}\""));

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = u16::from_str(port).map_err(|_| invalid())?;
                if port == 0 || host.contains(':') {
                    return Err(invalid());
                }
                (host, Some(port))
            }
            None => (address, None),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self::Tcp {
            host: host.to_lowercase(),
            port,
        })
    }

    /// The hostname or IP address.
    pub fn host(&self) -> &str {
        match self {
            Self::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port, if one was given explicitly.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => *port,
        }
    }
}

impl Display for ServerAddress {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(fmt, "{}:{}", host, port.unwrap_or(DEFAULT_PORT)),
        }
    }
}

/// Specifies the server API version to declare.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum ServerApiVersion {
    /// Use API version 1.
    V1,
}

impl FromStr for ServerApiVersion {
    type Err = Error;

    fn from_str(str: &str) -> Result<Self> {
        match str {
            "1" => Ok(Self::V1),
            _ => Err(Error::invalid_argument(format!(
                "invalid server api version string: {str}"
            ))),
        }
    }
}

impl Display for ServerApiVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
        }
    }
}

impl Serialize for ServerApiVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Options used to declare a stable server API. Every command sent by a client with a declared API
/// carries `apiVersion`, and `apiStrict` / `apiDeprecationErrors` when set.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Serialize, PartialEq, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ServerApi {
    /// The declared API version.
    #[serde(rename = "apiVersion")]
    pub version: ServerApiVersion,

    /// Whether the server should return errors for features that are not part of the declared API
    /// version.
    #[builder(default, setter(strip_option))]
    #[serde(rename = "apiStrict")]
    pub strict: Option<bool>,

    /// Whether the server should return errors for features that are deprecated in the declared
    /// API version.
    #[builder(default, setter(strip_option))]
    #[serde(rename = "apiDeprecationErrors")]
    pub deprecation_errors: Option<bool>,
}

/// Extra information to append to the driver version in the metadata of the handshake with the
/// server. This should be used by libraries wrapping this crate.
#[derive(Clone, Debug, TypedBuilder, PartialEq)]
#[non_exhaustive]
pub struct DriverInfo {
    /// The name of the library wrapping the driver.
    #[builder(setter(into))]
    pub name: String,

    /// The version of the library wrapping the driver.
    #[builder(default, setter(strip_option, into))]
    pub version: Option<String>,

    /// Optional platform information for the wrapping driver.
    #[builder(default, setter(strip_option, into))]
    pub platform: Option<String>,
}

/// Contains the options that can be used to create a new [`Client`](crate::Client).
#[derive(Clone, TypedBuilder)]
#[derive_where(Debug)]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct ClientOptions {
    /// The application name that the client will send to the server as part of the handshake.
    /// This can be used in combination with the server logs to determine which client is
    /// connected to a server.
    pub app_name: Option<String>,

    /// Extra information to append to the driver metadata of the handshake.
    pub driver_info: Option<DriverInfo>,

    /// The compressors the client is willing to use, in order of preference. The first one the
    /// server also supports is negotiated during the handshake.
    pub compressors: Option<Vec<Compressor>>,

    /// Whether or not the client should retry a read operation if the operation fails.
    ///
    /// The default value is true.
    pub retry_reads: Option<bool>,

    /// Whether or not the client should retry a write operation if the operation fails.
    ///
    /// The default value is true.
    pub retry_writes: Option<bool>,

    /// The declared API version for this client.
    pub server_api: Option<ServerApi>,

    /// The client-side operation timeout. When set, it bounds server selection, connection
    /// checkout, every retry and the server-side `maxTimeMS` of each operation.
    pub timeout: Option<Duration>,

    /// The amount of time the client should attempt to select a server for an operation before
    /// timing out.
    ///
    /// The default value is 30 seconds.
    pub server_selection_timeout: Option<Duration>,

    /// How much slower than the fastest suitable server another suitable server may be and still
    /// be selected.
    ///
    /// The default value is 15 ms.
    pub local_threshold: Option<Duration>,

    /// Whether the client is connected through a load balancer.
    pub load_balanced: Option<bool>,

    /// Specifies the default read concern for operations performed on the client.
    pub read_concern: Option<ReadConcern>,

    /// Specifies the default write concern for operations performed on the client.
    pub write_concern: Option<WriteConcern>,

    /// The default selection criteria for operations performed on the client.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The handler that should process all command-related events.
    #[derive_where(skip)]
    pub command_event_handler: Option<Arc<dyn CommandEventHandler>>,

    /// Limit on the length of command and reply documents in tracing events, in bytes.
    ///
    /// The default value is 1000.
    pub tracing_max_document_length_bytes: Option<usize>,

    /// Authenticates new connections and reauthenticates them when the server asks for it.
    #[derive_where(skip)]
    pub authenticator: Option<Arc<dyn Authenticator>>,

    /// Client-side encryption applied to outgoing commands and incoming replies.
    #[derive_where(skip)]
    pub crypt: Option<Arc<dyn Crypt>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientOptions {
    pub(crate) fn server_selection_timeout(&self) -> Duration {
        self.server_selection_timeout
            .unwrap_or(DEFAULT_SERVER_SELECTION_TIMEOUT)
    }

    /// Rejects combinations of options that cannot work together.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }
        if let Some(ref compressors) = self.compressors {
            for compressor in compressors {
                compressor.validate()?;
            }
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_argument("timeout must be positive"));
        }
        Ok(())
    }
}

/// Contains the options that can be used to create a new [`ClientSession`](crate::ClientSession).
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct SessionOptions {
    /// The default options to use for transactions started on this session.
    ///
    /// If these options are not specified, they will be inherited from the client.
    pub default_transaction_options: Option<TransactionOptions>,

    /// If true, all read operations performed using this client session will share the same
    /// causal ordering. Explicit sessions are causally consistent unless this is set to false.
    pub causal_consistency: Option<bool>,
}

/// Contains the options that can be used for a transaction.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct TransactionOptions {
    /// The read concern to use for the transaction.
    pub read_concern: Option<ReadConcern>,

    /// The write concern to use when committing or aborting a transaction.
    pub write_concern: Option<WriteConcern>,

    /// The selection criteria to use for all read operations in a transaction.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The maximum amount of time to allow a single commitTransaction to run.
    pub max_commit_time: Option<Duration>,
}

/// Per-call controls for a single operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct CallOptions {
    /// A deadline for the whole call. It is combined with the client's `timeout`, and the earlier
    /// of the two wins.
    pub deadline: Option<Instant>,

    /// Cancels the operation when triggered.
    pub cancellation: Option<CancellationToken>,
}
