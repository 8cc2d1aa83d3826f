#[cfg(test)]
mod test;

use std::time::Duration;

use rand::seq::IteratorRandom;
use tokio::time::Instant;

use super::TopologyDescription;
use crate::{
    error::{Error, ErrorKind, Result},
    options::ServerAddress,
    sdam::{
        description::{
            server::{ServerDescription, ServerType},
            topology::TopologyType,
        },
        Deployment,
    },
    selection_criteria::{ReadPreference, SelectionCriteria, TagSet},
    trace::server_selection::ServerSelectionEventEmitter,
};

pub(crate) const DEFAULT_LOCAL_THRESHOLD: Duration = Duration::from_millis(15);
pub(crate) const IDLE_WRITE_PERIOD: Duration = Duration::from_secs(10);

/// Snapshot of the server an attempt was routed to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectedServer {
    pub(crate) address: ServerAddress,
    pub(crate) server_type: ServerType,
    pub(crate) topology_type: TopologyType,
    pub(crate) max_wire_version: Option<i32>,
    pub(crate) p90_round_trip_time: Option<Duration>,
}

impl SelectedServer {
    fn new(topology_type: TopologyType, description: &ServerDescription) -> Self {
        Self {
            address: description.address.clone(),
            server_type: description.server_type,
            topology_type,
            max_wire_version: description.max_wire_version,
            p90_round_trip_time: description.p90_round_trip_time,
        }
    }
}

/// Selects a server for an operation, waiting for the topology to change until `deadline` when
/// nothing is suitable.
///
/// A `pinned` address short-circuits selection: the pinned server is returned as soon as it is
/// part of the topology, whatever its type or latency. `deprioritized` is avoided when any other
/// server is suitable.
pub(crate) async fn select_server(
    deployment: &dyn Deployment,
    criteria: &SelectionCriteria,
    operation_name: &str,
    pinned: Option<&ServerAddress>,
    deprioritized: Option<&ServerAddress>,
    local_threshold: Option<Duration>,
    deadline: Instant,
) -> Result<SelectedServer> {
    let emitter = ServerSelectionEventEmitter::new(criteria, operation_name, deadline);
    let mut topology = deployment.description();
    emitter.emit_started_event(&topology);

    let deprioritized: Vec<&ServerAddress> = deprioritized.into_iter().collect();
    let mut waiting_event_emitted = false;
    loop {
        let selected = match pinned {
            Some(address) => topology
                .get_server_description(address)
                .map(|description| SelectedServer::new(topology.topology_type, description)),
            None => attempt_to_select_server(criteria, &topology, &deprioritized, local_threshold)
                .inspect_err(|error| emitter.emit_failed_event(&topology, error))?,
        };
        if let Some(server) = selected {
            emitter.emit_succeeded_event(&topology, &server);
            return Ok(server);
        }

        if !waiting_event_emitted {
            emitter.emit_waiting_event(&topology);
            waiting_event_emitted = true;
        }

        deployment.request_check();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let error = Error::from(ErrorKind::ServerSelection {
                message: topology.server_selection_timeout_error_message(criteria),
            });
            emitter.emit_failed_event(&topology, &error);
            return Err(error);
        }
        let _ = tokio::time::timeout(remaining, deployment.wait_for_change()).await;
        topology = deployment.description();
    }
}

/// Attempt to select a server, returning None if no server could be selected
/// that matched the provided criteria.
pub(crate) fn attempt_to_select_server(
    criteria: &SelectionCriteria,
    topology_description: &TopologyDescription,
    deprioritized: &[&ServerAddress],
    local_threshold: Option<Duration>,
) -> Result<Option<SelectedServer>> {
    if let Some(message) = topology_description.compatibility_error() {
        return Err(ErrorKind::IncompatibleServer { message }.into());
    }
    if topology_description.is_replica_set() {
        if let Some(max_staleness) = criteria.as_read_pref().and_then(|rp| rp.max_staleness()) {
            super::verify_max_staleness(max_staleness, topology_description.heartbeat_frequency())?;
        }
    }

    let mut servers_matching_criteria =
        topology_description.filter_servers_by_selection_criteria(criteria, deprioritized);

    retain_servers_within_latency_window(
        &mut servers_matching_criteria,
        local_threshold.unwrap_or(DEFAULT_LOCAL_THRESHOLD),
    );

    Ok(servers_matching_criteria
        .into_iter()
        .choose(&mut rand::rng())
        .map(|description| SelectedServer::new(topology_description.topology_type, description)))
}

impl TopologyDescription {
    pub(crate) fn server_selection_timeout_error_message(
        &self,
        criteria: &SelectionCriteria,
    ) -> String {
        if self.has_available_servers() {
            format!(
                "Server selection timeout: None of the available servers suitable for criteria \
                 {criteria}. Topology: {self}"
            )
        } else {
            format!("Server selection timeout: No available servers. Topology: {self}")
        }
    }

    pub(crate) fn has_available_servers(&self) -> bool {
        self.servers.values().any(|server| server.is_available())
    }

    pub(crate) fn filter_servers_by_selection_criteria(
        &self,
        selection_criteria: &SelectionCriteria,
        deprioritized: &[&ServerAddress],
    ) -> Vec<&ServerDescription> {
        let mut servers_matching_criteria =
            self.filter_servers_by_selection_criteria_inner(selection_criteria, deprioritized);
        if servers_matching_criteria.is_empty() && !deprioritized.is_empty() {
            servers_matching_criteria =
                self.filter_servers_by_selection_criteria_inner(selection_criteria, &[]);
        }
        servers_matching_criteria
    }

    fn filter_servers_by_selection_criteria_inner(
        &self,
        selection_criteria: &SelectionCriteria,
        deprioritized: &[&ServerAddress],
    ) -> Vec<&ServerDescription> {
        let prioritized = self
            .servers
            .iter()
            .filter(|(address, _)| !deprioritized.contains(address))
            .map(|(_, description)| description);

        match selection_criteria {
            SelectionCriteria::ReadPreference(read_preference) => match self.topology_type {
                TopologyType::Unknown => Vec::new(),
                TopologyType::Single | TopologyType::LoadBalanced => {
                    prioritized.filter(|sd| sd.is_available()).collect()
                }
                TopologyType::Sharded => prioritized
                    .filter(|sd| sd.server_type == ServerType::Mongos)
                    .collect(),
                TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => {
                    self.filter_servers_in_replica_set(prioritized, read_preference)
                }
            },
            SelectionCriteria::Predicate(ref predicate) => prioritized
                .filter(|s| {
                    // If we're direct-connected or connected to a standalone, ignore whether the
                    // single server in the topology is data-bearing.
                    (self.topology_type == TopologyType::Single || s.server_type.is_data_bearing())
                        && predicate(s)
                })
                .collect(),
        }
    }

    fn filter_servers_in_replica_set<'a>(
        &self,
        servers: impl Iterator<Item = &'a ServerDescription> + Clone,
        read_preference: &ReadPreference,
    ) -> Vec<&'a ServerDescription> {
        match read_preference {
            ReadPreference::Primary => servers
                .filter(|sd| sd.server_type == ServerType::RsPrimary)
                .collect(),
            ReadPreference::Secondary { .. } => self.filter_servers_with_read_preference(
                servers,
                &[ServerType::RsSecondary],
                read_preference,
            ),
            ReadPreference::PrimaryPreferred { .. } => {
                let primary = servers
                    .clone()
                    .filter(|sd| sd.server_type == ServerType::RsPrimary)
                    .collect::<Vec<_>>();
                if !primary.is_empty() {
                    primary
                } else {
                    self.filter_servers_with_read_preference(
                        servers,
                        &[ServerType::RsSecondary],
                        read_preference,
                    )
                }
            }
            ReadPreference::SecondaryPreferred { .. } => {
                let primary = servers
                    .clone()
                    .filter(|sd| sd.server_type == ServerType::RsPrimary);
                let secondaries = self.filter_servers_with_read_preference(
                    servers,
                    &[ServerType::RsSecondary],
                    read_preference,
                );
                if !secondaries.is_empty() {
                    secondaries
                } else {
                    primary.collect()
                }
            }
            ReadPreference::Nearest { .. } => self.filter_servers_with_read_preference(
                servers,
                &[ServerType::RsPrimary, ServerType::RsSecondary],
                read_preference,
            ),
        }
    }

    pub(crate) fn primary(&self) -> Option<&ServerDescription> {
        self.servers
            .values()
            .find(|sd| sd.server_type == ServerType::RsPrimary)
    }

    fn filter_servers_with_read_preference<'a>(
        &self,
        servers: impl Iterator<Item = &'a ServerDescription>,
        types: &[ServerType],
        read_preference: &ReadPreference,
    ) -> Vec<&'a ServerDescription> {
        let tag_sets = read_preference.tag_sets();
        let max_staleness = read_preference.max_staleness();

        let mut servers = servers
            .filter(|sd| types.contains(&sd.server_type))
            .collect();

        if let Some(max_staleness) = max_staleness {
            // A zero bound means no bound.
            if max_staleness > Duration::from_secs(0) {
                self.filter_servers_by_max_staleness(&mut servers, max_staleness);
            }
        }

        if let Some(tag_sets) = tag_sets {
            filter_servers_by_tag_sets(&mut servers, tag_sets);
        }

        servers
    }

    fn filter_servers_by_max_staleness(
        &self,
        servers: &mut Vec<&ServerDescription>,
        max_staleness: Duration,
    ) {
        match self.primary() {
            Some(primary) => {
                self.filter_servers_by_max_staleness_with_primary(servers, primary, max_staleness)
            }
            None => self.filter_servers_by_max_staleness_without_primary(servers, max_staleness),
        };
    }

    fn filter_servers_by_max_staleness_with_primary(
        &self,
        servers: &mut Vec<&ServerDescription>,
        primary: &ServerDescription,
        max_staleness: Duration,
    ) {
        let max_staleness_ms = max_staleness.as_millis().try_into().unwrap_or(i64::MAX);

        servers.retain(|server| {
            self.calculate_secondary_staleness_with_primary(server, primary)
                .is_some_and(|staleness| staleness <= max_staleness_ms)
        })
    }

    fn filter_servers_by_max_staleness_without_primary(
        &self,
        servers: &mut Vec<&ServerDescription>,
        max_staleness: Duration,
    ) {
        let max_staleness = max_staleness.as_millis().try_into().unwrap_or(i64::MAX);
        let max_write_date = self
            .servers
            .values()
            .filter(|server| server.server_type == ServerType::RsSecondary)
            .filter_map(|server| server.last_write_date)
            .map(|last_write_date| last_write_date.timestamp_millis())
            .max();

        let secondary_max_write_date = match max_write_date {
            Some(max_write_date) => max_write_date,
            None => return,
        };

        servers.retain(|server| {
            self.calculate_secondary_staleness_without_primary(server, secondary_max_write_date)
                .is_some_and(|staleness| staleness <= max_staleness)
        })
    }

    fn calculate_secondary_staleness_with_primary(
        &self,
        secondary: &ServerDescription,
        primary: &ServerDescription,
    ) -> Option<i64> {
        let primary_last_update = primary.last_update_time?.timestamp_millis();
        let primary_last_write = primary.last_write_date?.timestamp_millis();

        let secondary_last_update = secondary.last_update_time?.timestamp_millis();
        let secondary_last_write = secondary.last_write_date?.timestamp_millis();

        let heartbeat_frequency = self.heartbeat_frequency_millis();

        let staleness = (secondary_last_update - secondary_last_write)
            - (primary_last_update - primary_last_write)
            + heartbeat_frequency;

        Some(staleness)
    }

    fn calculate_secondary_staleness_without_primary(
        &self,
        secondary: &ServerDescription,
        max_last_write_date: i64,
    ) -> Option<i64> {
        let secondary_last_write = secondary.last_write_date?.timestamp_millis();
        let staleness =
            max_last_write_date - secondary_last_write + self.heartbeat_frequency_millis();
        Some(staleness)
    }

    fn heartbeat_frequency_millis(&self) -> i64 {
        self.heartbeat_frequency()
            .as_millis()
            .try_into()
            .unwrap_or(i64::MAX)
    }
}

pub(crate) fn retain_servers_within_latency_window(
    suitable_servers: &mut Vec<&ServerDescription>,
    local_threshold: Duration,
) {
    let shortest_average_rtt = suitable_servers
        .iter()
        .filter_map(|server_desc| server_desc.average_round_trip_time)
        .min();

    let max_rtt_within_window = shortest_average_rtt
        .map(|rtt| rtt.checked_add(local_threshold).unwrap_or(Duration::MAX));

    suitable_servers.retain(move |server_desc| {
        match (server_desc.average_round_trip_time, max_rtt_within_window) {
            (Some(server_rtt), Some(max_rtt)) => server_rtt <= max_rtt,
            // Load balancers and servers that were never measured have no RTT.
            _ => true,
        }
    });
}

fn filter_servers_by_tag_sets(servers: &mut Vec<&ServerDescription>, tag_sets: &[TagSet]) {
    if tag_sets.is_empty() {
        return;
    }

    for tag_set in tag_sets {
        let matches_tag_set = |server: &&ServerDescription| server.matches_tag_set(tag_set);

        if servers.iter().any(matches_tag_set) {
            servers.retain(matches_tag_set);

            return;
        }
    }

    servers.clear();
}
