pub(crate) mod server_selection;

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cmap::Command,
    error::{Error, Result},
    options::ServerAddress,
    sdam::{
        description::server::{ServerDescription, ServerType},
        DEFAULT_HEARTBEAT_FREQUENCY,
    },
    selection_criteria::{ReadPreference, SelectionCriteria},
};

use self::server_selection::IDLE_WRITE_PERIOD;

/// The possible types for a topology.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize, Default, derive_more::Display,
)]
#[non_exhaustive]
pub enum TopologyType {
    /// A single mongod server.
    Single,

    /// A replica set with no primary.
    ReplicaSetNoPrimary,

    /// A replica set with a primary.
    ReplicaSetWithPrimary,

    /// A sharded topology.
    Sharded,

    /// A load balanced topology.
    LoadBalanced,

    /// A topology whose type is not known.
    #[default]
    Unknown,
}

/// A snapshot of the most up-to-date information known about a deployment.
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct TopologyDescription {
    /// The current type of the topology.
    pub(crate) topology_type: TopologyType,

    /// The replica set name of the topology.
    pub(crate) set_name: Option<String>,

    /// The interval between server checks, which bounds how stale a secondary may look.
    pub(crate) heartbeat_freq: Option<Duration>,

    /// The server descriptions of each member of the topology.
    pub(crate) servers: HashMap<ServerAddress, ServerDescription>,
}

impl TopologyDescription {
    /// Creates a snapshot of a topology of the given type made up of `servers`.
    pub fn new(
        topology_type: TopologyType,
        servers: impl IntoIterator<Item = ServerDescription>,
    ) -> Self {
        Self {
            topology_type,
            servers: servers
                .into_iter()
                .map(|server| (server.address.clone(), server))
                .collect(),
            ..Default::default()
        }
    }

    /// Sets the replica set name.
    pub fn with_set_name(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    /// Sets the monitors' check interval.
    pub fn with_heartbeat_frequency(mut self, heartbeat_freq: Duration) -> Self {
        self.heartbeat_freq = Some(heartbeat_freq);
        self
    }

    /// The current type of the topology.
    pub fn topology_type(&self) -> TopologyType {
        self.topology_type
    }

    /// The servers in the topology.
    pub fn servers(&self) -> impl Iterator<Item = &ServerDescription> {
        self.servers.values()
    }

    pub(crate) fn get_server_description(
        &self,
        address: &ServerAddress,
    ) -> Option<&ServerDescription> {
        self.servers.get(address)
    }

    /// Describes the first incompatibility between the driver and a server's wire versions.
    pub(crate) fn compatibility_error(&self) -> Option<String> {
        self.servers
            .values()
            .find_map(ServerDescription::compatibility_error_message)
    }

    /// The smallest session timeout reported by a data-bearing server, or `None` if any of them
    /// does not support sessions.
    pub(crate) fn logical_session_timeout(&self) -> Option<Duration> {
        let mut timeout: Option<Duration> = None;
        for server in self
            .servers
            .values()
            .filter(|server| server.server_type.is_data_bearing())
        {
            let server_timeout = server.logical_session_timeout?;
            timeout = Some(match timeout {
                Some(current) => current.min(server_timeout),
                None => server_timeout,
            });
        }
        timeout
    }

    /// Whether operations on this topology may carry a session.
    pub(crate) fn supports_sessions(&self) -> bool {
        self.topology_type == TopologyType::LoadBalanced || self.logical_session_timeout().is_some()
    }

    pub(crate) fn is_replica_set(&self) -> bool {
        matches!(
            self.topology_type,
            TopologyType::ReplicaSetNoPrimary | TopologyType::ReplicaSetWithPrimary
        )
    }

    /// Gets the heartbeat frequency.
    pub(crate) fn heartbeat_frequency(&self) -> Duration {
        self.heartbeat_freq.unwrap_or(DEFAULT_HEARTBEAT_FREQUENCY)
    }

    /// Adds `$readPreference` to `command` when the server at `address` needs it to route the
    /// command according to `criteria`.
    pub(crate) fn update_command_with_read_pref(
        &self,
        address: &ServerAddress,
        command: &mut Command,
        criteria: Option<&SelectionCriteria>,
    ) {
        let server_type = self
            .get_server_description(address)
            .map(|sd| sd.server_type)
            .unwrap_or(ServerType::Unknown);

        match (self.topology_type, server_type) {
            (TopologyType::Sharded, ServerType::Mongos)
            | (TopologyType::Single, ServerType::Mongos)
            | (TopologyType::LoadBalanced, _) => {
                self.update_command_read_pref_for_mongos(command, criteria)
            }
            (TopologyType::Single, ServerType::Standalone) => {}
            (TopologyType::Single, _) => {
                let specified_read_pref =
                    criteria.and_then(SelectionCriteria::as_read_pref).cloned();

                let resolved_read_pref = match specified_read_pref {
                    Some(ReadPreference::Primary) | None => ReadPreference::PrimaryPreferred {
                        options: Default::default(),
                    },
                    Some(other) => other,
                };
                command.set_read_preference(resolved_read_pref)
            }
            _ => {
                let read_pref = match criteria {
                    Some(SelectionCriteria::ReadPreference(rp)) => rp.clone(),
                    Some(SelectionCriteria::Predicate(_)) => ReadPreference::PrimaryPreferred {
                        options: Default::default(),
                    },
                    None => ReadPreference::Primary,
                };
                if read_pref != ReadPreference::Primary {
                    command.set_read_preference(read_pref)
                }
            }
        }
    }

    fn update_command_read_pref_for_mongos(
        &self,
        command: &mut Command,
        criteria: Option<&SelectionCriteria>,
    ) {
        let read_preference = match criteria {
            Some(SelectionCriteria::ReadPreference(rp)) => rp,
            _ => return,
        };
        match read_preference {
            ReadPreference::Secondary { .. }
            | ReadPreference::PrimaryPreferred { .. }
            | ReadPreference::Nearest { .. }
            | ReadPreference::SecondaryPreferred { .. } => {
                command.set_read_preference(read_preference.clone())
            }
            _ => {}
        }
    }
}

impl fmt::Display for TopologyDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(f, "{{ Type: {}", self.topology_type)?;

        if let Some(ref set_name) = self.set_name {
            write!(f, ", Set Name: {set_name}")?;
        }

        if let Some(compatibility_error) = self.compatibility_error() {
            write!(f, ", Compatibility Error: {compatibility_error}")?;
        }

        if !self.servers.is_empty() {
            write!(f, ", Servers: [ ")?;
            let mut first = true;
            for server in self.servers.values() {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                write!(
                    f,
                    "{{ Address: {}, Type: {} }}",
                    server.address, server.server_type
                )?;
            }
            write!(f, " ]")?;
        }

        write!(f, " }}")
    }
}

pub(crate) fn verify_max_staleness(
    max_staleness: Duration,
    heartbeat_frequency: Duration,
) -> Result<()> {
    let smallest_max_staleness = std::cmp::max(
        Duration::from_secs(90),
        heartbeat_frequency
            .checked_add(IDLE_WRITE_PERIOD)
            .unwrap_or(Duration::MAX),
    );

    if max_staleness < smallest_max_staleness {
        return Err(Error::invalid_argument(format!(
            "invalid max_staleness value: must be at least {} seconds",
            smallest_max_staleness.as_secs()
        )));
    }

    Ok(())
}
