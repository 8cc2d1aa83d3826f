//! Topology snapshots and server selection.
//!
//! Discovery and monitoring happen outside this crate: a [`Deployment`] publishes
//! [`TopologyDescription`] snapshots and hands out connections, and the selector here picks a
//! server from whichever snapshot is current.

mod deployment;
pub(crate) mod description;

pub use self::{
    deployment::Deployment,
    description::{
        server::{ServerDescription, ServerType, TopologyVersion},
        topology::{TopologyDescription, TopologyType},
    },
};
pub(crate) use self::description::topology::server_selection::{select_server, SelectedServer};

use std::time::Duration;

pub(crate) const DEFAULT_HEARTBEAT_FREQUENCY: Duration = Duration::from_secs(10);
