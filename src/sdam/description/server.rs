use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    bson::{oid::ObjectId, DateTime},
    hello::HelloReply,
    options::ServerAddress,
    selection_criteria::TagSet,
};

const DRIVER_MIN_DB_VERSION: &str = "3.6";
pub(crate) const DRIVER_MIN_WIRE_VERSION: i32 = 6;
pub(crate) const DRIVER_MAX_WIRE_VERSION: i32 = 25;

/// The possible types for a server.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default, derive_more::Display)]
#[non_exhaustive]
pub enum ServerType {
    /// A single, non-replica set mongod.
    Standalone,

    /// A router used in sharded deployments.
    Mongos,

    /// The primary node in a replica set.
    #[serde(rename = "RSPrimary")]
    RsPrimary,

    /// A secondary node in a replica set.
    #[serde(rename = "RSSecondary")]
    RsSecondary,

    /// A non-data bearing node in a replica set which can participate in elections.
    #[serde(rename = "RSArbiter")]
    RsArbiter,

    /// A replica set member that is a data-bearing node of another kind (e.g. hidden).
    #[serde(rename = "RSMember")]
    RsMember,

    /// Hidden, starting up, or recovering nodes in a replica set.
    #[serde(rename = "RSOther")]
    RsOther,

    /// A member of an uninitialized replica set or a member that has been removed from the
    /// replica set config.
    #[serde(rename = "RSGhost")]
    RsGhost,

    /// A load-balancing proxy between the driver and the deployment.
    LoadBalancer,

    /// A server that the driver hasn't yet communicated with or can't connect to.
    #[serde(alias = "PossiblePrimary")]
    #[default]
    Unknown,
}

impl ServerType {
    pub(crate) fn is_data_bearing(self) -> bool {
        matches!(
            self,
            ServerType::Standalone
                | ServerType::RsPrimary
                | ServerType::RsSecondary
                | ServerType::Mongos
                | ServerType::LoadBalancer
        )
    }

    pub(crate) fn is_available(self) -> bool {
        !matches!(self, ServerType::Unknown)
    }
}

/// Identifies the server process and how many state changes it has gone through, so that stale
/// error reports can be told apart from fresh ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TopologyVersion {
    /// Unique id of the server process.
    pub process_id: ObjectId,

    /// Incremented on every state change of the process.
    pub counter: i64,
}

/// A snapshot of what is known about one server in the deployment.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ServerDescription {
    /// The address of the server.
    #[builder(!default)]
    pub address: ServerAddress,

    /// The type of the server.
    pub server_type: ServerType,

    /// The minimum wire version the server supports.
    pub min_wire_version: Option<i32>,

    /// The maximum wire version the server supports.
    pub max_wire_version: Option<i32>,

    /// The replica set name the server belongs to, if any.
    pub set_name: Option<String>,

    /// User-defined tags of the replica set member.
    pub tags: Option<TagSet>,

    /// Moving average of the round trip time of the server's health checks.
    pub average_round_trip_time: Option<Duration>,

    /// 90th percentile of the round trip times of the server's health checks.
    pub p90_round_trip_time: Option<Duration>,

    /// When this description was produced.
    pub last_update_time: Option<DateTime>,

    /// When the server last applied a write, as reported in its hello reply.
    pub last_write_date: Option<DateTime>,

    /// Whether the server supports the `hello` command.
    pub hello_ok: bool,

    /// The topology version reported by the server.
    pub topology_version: Option<TopologyVersion>,

    /// How long the server keeps an idle session alive.
    pub logical_session_timeout: Option<Duration>,
}

impl ServerDescription {
    /// A description of a server that has not been checked yet.
    pub fn new(address: ServerAddress) -> Self {
        Self::builder().address(address).build()
    }

    /// Describes the server that sent `reply`. `round_trip_time` is the duration of the check,
    /// when it measures one.
    pub(crate) fn from_hello_reply(reply: HelloReply, round_trip_time: Option<Duration>) -> Self {
        let response = reply.command_response;
        let server_type = response.server_type();
        Self {
            address: reply.server_address,
            server_type,
            min_wire_version: response.min_wire_version,
            max_wire_version: response.max_wire_version,
            set_name: response.set_name,
            tags: response.tags,
            average_round_trip_time: round_trip_time,
            p90_round_trip_time: None,
            last_update_time: Some(DateTime::now()),
            last_write_date: response.last_write.map(|last_write| last_write.last_write_date),
            hello_ok: response.hello_ok.unwrap_or(false),
            topology_version: response.topology_version,
            logical_session_timeout: response
                .logical_session_timeout_minutes
                .map(|mins| Duration::from_secs(mins.max(0) as u64 * 60)),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.server_type.is_available()
    }

    pub(crate) fn compatibility_error_message(&self) -> Option<String> {
        if let Some(min_wire_version) = self.min_wire_version {
            if min_wire_version > DRIVER_MAX_WIRE_VERSION {
                return Some(format!(
                    "Server at {} requires wire version {}, but this version of the driver only \
                     supports up to {}",
                    self.address, min_wire_version, DRIVER_MAX_WIRE_VERSION,
                ));
            }
        }

        if let Some(max_wire_version) = self.max_wire_version {
            if max_wire_version < DRIVER_MIN_WIRE_VERSION {
                return Some(format!(
                    "Server at {} reports wire version {}, but this version of the driver \
                     requires at least {} (MongoDB {}).",
                    self.address, max_wire_version, DRIVER_MIN_WIRE_VERSION, DRIVER_MIN_DB_VERSION,
                ));
            }
        }

        None
    }

    pub(crate) fn matches_tag_set(&self, tag_set: &TagSet) -> bool {
        let server_tags = match self.tags {
            Some(ref tags) => tags,
            None => return tag_set.is_empty(),
        };

        tag_set
            .iter()
            .all(|(key, val)| server_tags.get(key) == Some(val))
    }
}
