use tokio::time::Instant;

use super::{TracingRepresentation, SERVER_SELECTION_TRACING_EVENT_TARGET};
use crate::{
    error::Error,
    sdam::{SelectedServer, TopologyDescription},
    selection_criteria::SelectionCriteria,
};

/// Type responsible for emitting server selection tracing events.
pub(crate) struct ServerSelectionEventEmitter<'a> {
    criteria: &'a SelectionCriteria,
    operation_name: &'a str,
    deadline: Instant,
}

impl<'a> ServerSelectionEventEmitter<'a> {
    pub(crate) fn new(
        criteria: &'a SelectionCriteria,
        operation_name: &'a str,
        deadline: Instant,
    ) -> Self {
        Self {
            criteria,
            operation_name,
            deadline,
        }
    }

    pub(crate) fn emit_started_event(&self, topology_description: &TopologyDescription) {
        tracing::debug!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            operation = self.operation_name,
            selector = self.criteria.tracing_representation(),
            topologyDescription = topology_description.tracing_representation(),
            "Server selection started"
        );
    }

    pub(crate) fn emit_failed_event(
        &self,
        topology_description: &TopologyDescription,
        error: &Error,
    ) {
        tracing::debug!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            operation = self.operation_name,
            selector = self.criteria.tracing_representation(),
            topologyDescription = topology_description.tracing_representation(),
            failure = error.tracing_representation(),
            "Server selection failed"
        );
    }

    pub(crate) fn emit_succeeded_event(
        &self,
        topology_description: &TopologyDescription,
        server: &SelectedServer,
    ) {
        tracing::debug!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            operation = self.operation_name,
            selector = self.criteria.tracing_representation(),
            topologyDescription = topology_description.tracing_representation(),
            serverHost = server.address.host(),
            serverPort = server.address.port_tracing_representation(),
            "Server selection succeeded"
        );
    }

    pub(crate) fn emit_waiting_event(&self, topology_description: &TopologyDescription) {
        let remaining_time = self.deadline.saturating_duration_since(Instant::now());
        tracing::info!(
            target: SERVER_SELECTION_TRACING_EVENT_TARGET,
            operation = self.operation_name,
            selector = self.criteria.tracing_representation(),
            topologyDescription = topology_description.tracing_representation(),
            remainingTimeMS = remaining_time.as_millis(),
            "Waiting for suitable server to become available",
        );
    }
}
