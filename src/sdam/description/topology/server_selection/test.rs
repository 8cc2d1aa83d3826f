use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::FutureExt;
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use super::*;
use crate::{
    bson::DateTime,
    cmap::Connection,
    error::Error,
    selection_criteria::ReadPreferenceOptions,
};

fn address(host: &str) -> ServerAddress {
    ServerAddress::Tcp {
        host: host.to_string(),
        port: Some(27017),
    }
}

fn server(host: &str, server_type: ServerType, rtt_ms: u64) -> ServerDescription {
    ServerDescription::builder()
        .address(address(host))
        .server_type(server_type)
        .min_wire_version(0)
        .max_wire_version(21)
        .average_round_trip_time(Duration::from_millis(rtt_ms))
        .build()
}

fn tagged(mut description: ServerDescription, tags: &[(&str, &str)]) -> ServerDescription {
    description.tags = Some(
        tags.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    description
}

fn replica_set() -> TopologyDescription {
    TopologyDescription::new(
        TopologyType::ReplicaSetWithPrimary,
        vec![
            server("primary", ServerType::RsPrimary, 5),
            tagged(
                server("east", ServerType::RsSecondary, 5),
                &[("dc", "east")],
            ),
            tagged(
                server("west", ServerType::RsSecondary, 5),
                &[("dc", "west")],
            ),
        ],
    )
    .with_set_name("rs")
}

fn secondary(options: Option<ReadPreferenceOptions>) -> SelectionCriteria {
    ReadPreference::Secondary { options }.into()
}

fn candidates(topology: &TopologyDescription, criteria: &SelectionCriteria) -> HashSet<String> {
    topology
        .filter_servers_by_selection_criteria(criteria, &[])
        .into_iter()
        .map(|sd| sd.address.host().to_string())
        .collect()
}

fn hosts(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn primary_read_preference_selects_primary() {
    let topology = replica_set();
    for _ in 0..10 {
        let selected = attempt_to_select_server(
            &ReadPreference::Primary.into(),
            &topology,
            &[],
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(selected.address, address("primary"));
        assert_eq!(selected.server_type, ServerType::RsPrimary);
        assert_eq!(
            selected.topology_type,
            TopologyType::ReplicaSetWithPrimary
        );
    }
}

#[test]
fn secondary_preferred_falls_back_to_primary() {
    let topology = TopologyDescription::new(
        TopologyType::ReplicaSetWithPrimary,
        vec![
            server("primary", ServerType::RsPrimary, 5),
            server("arbiter", ServerType::RsArbiter, 5),
        ],
    );
    let criteria = ReadPreference::SecondaryPreferred { options: None }.into();
    assert_eq!(candidates(&topology, &criteria), hosts(&["primary"]));

    let criteria = ReadPreference::PrimaryPreferred { options: None }.into();
    assert_eq!(candidates(&replica_set(), &criteria), hosts(&["primary"]));

    let criteria = ReadPreference::Nearest { options: None }.into();
    assert_eq!(
        candidates(&replica_set(), &criteria),
        hosts(&["primary", "east", "west"])
    );
}

#[test]
fn first_matching_tag_set_wins() {
    let topology = replica_set();
    let tag_set = |dc: &str| -> TagSet { [("dc".to_string(), dc.to_string())].into() };

    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tag_set("north"), tag_set("west"), tag_set("east")])
            .build(),
    ));
    assert_eq!(candidates(&topology, &criteria), hosts(&["west"]));

    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tag_set("north")])
            .build(),
    ));
    assert!(candidates(&topology, &criteria).is_empty());

    // The empty tag set matches every server.
    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .tag_sets(vec![tag_set("north"), TagSet::new()])
            .build(),
    ));
    assert_eq!(candidates(&topology, &criteria), hosts(&["east", "west"]));
}

#[test]
fn max_staleness_with_primary() {
    let now = 1_000_000_000;
    let mut primary = server("primary", ServerType::RsPrimary, 5);
    primary.last_update_time = Some(DateTime::from_millis(now));
    primary.last_write_date = Some(DateTime::from_millis(now - 1_000));

    let mut fresh = server("fresh", ServerType::RsSecondary, 5);
    fresh.last_update_time = Some(DateTime::from_millis(now));
    fresh.last_write_date = Some(DateTime::from_millis(now - 30_000));

    let mut stale = server("stale", ServerType::RsSecondary, 5);
    stale.last_update_time = Some(DateTime::from_millis(now));
    stale.last_write_date = Some(DateTime::from_millis(now - 200_000));

    let topology = TopologyDescription::new(
        TopologyType::ReplicaSetWithPrimary,
        vec![primary, fresh, stale],
    );
    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(90))
            .build(),
    ));

    // fresh: 30s - 1s + 10s heartbeat = 39s, stale: 200s - 1s + 10s = 209s.
    assert_eq!(candidates(&topology, &criteria), hosts(&["fresh"]));
}

#[test]
fn max_staleness_without_primary() {
    let mut newest = server("newest", ServerType::RsSecondary, 5);
    newest.last_write_date = Some(DateTime::from_millis(500_000));

    let mut lagging = server("lagging", ServerType::RsSecondary, 5);
    lagging.last_write_date = Some(DateTime::from_millis(300_000));

    let topology = TopologyDescription::new(
        TopologyType::ReplicaSetNoPrimary,
        vec![newest, lagging],
    );
    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(120))
            .build(),
    ));
    assert_eq!(candidates(&topology, &criteria), hosts(&["newest"]));
}

#[test]
fn max_staleness_below_minimum_is_rejected() {
    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(30))
            .build(),
    ));
    let error = attempt_to_select_server(&criteria, &replica_set(), &[], None).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    // The minimum grows with the heartbeat frequency.
    let topology = replica_set().with_heartbeat_frequency(Duration::from_secs(100));
    let criteria = secondary(Some(
        ReadPreferenceOptions::builder()
            .max_staleness(Duration::from_secs(100))
            .build(),
    ));
    assert!(attempt_to_select_server(&criteria, &topology, &[], None).is_err());
}

#[test]
fn latency_window() {
    let topology = TopologyDescription::new(
        TopologyType::Sharded,
        vec![
            server("fast", ServerType::Mongos, 10),
            server("close", ServerType::Mongos, 24),
            server("slow", ServerType::Mongos, 40),
        ],
    );
    let criteria: SelectionCriteria = ReadPreference::Primary.into();

    let mut servers = topology.filter_servers_by_selection_criteria(&criteria, &[]);
    retain_servers_within_latency_window(&mut servers, DEFAULT_LOCAL_THRESHOLD);
    let remaining: HashSet<_> = servers
        .iter()
        .map(|sd| sd.address.host().to_string())
        .collect();
    assert_eq!(remaining, hosts(&["fast", "close"]));

    let mut servers = topology.filter_servers_by_selection_criteria(&criteria, &[]);
    retain_servers_within_latency_window(&mut servers, Duration::from_millis(100));
    assert_eq!(servers.len(), 3);
}

#[test]
fn sharded_topology_selects_mongos_only() {
    let topology = TopologyDescription::new(
        TopologyType::Sharded,
        vec![
            server("router", ServerType::Mongos, 5),
            server("unknown", ServerType::Unknown, 5),
        ],
    );
    let criteria = secondary(None);
    assert_eq!(candidates(&topology, &criteria), hosts(&["router"]));
}

#[test]
fn deprioritized_server_avoided_when_possible() {
    let topology = TopologyDescription::new(
        TopologyType::Sharded,
        vec![
            server("a", ServerType::Mongos, 5),
            server("b", ServerType::Mongos, 5),
        ],
    );
    let criteria: SelectionCriteria = ReadPreference::Primary.into();
    let failed = address("a");
    for _ in 0..10 {
        let selected = attempt_to_select_server(&criteria, &topology, &[&failed], None)
            .unwrap()
            .unwrap();
        assert_eq!(selected.address, address("b"));
    }

    let single = TopologyDescription::new(
        TopologyType::Sharded,
        vec![server("a", ServerType::Mongos, 5)],
    );
    let selected = attempt_to_select_server(&criteria, &single, &[&failed], None)
        .unwrap()
        .unwrap();
    assert_eq!(selected.address, failed);
}

#[test]
fn predicate_only_considers_data_bearing_servers() {
    let topology = TopologyDescription::new(
        TopologyType::ReplicaSetWithPrimary,
        vec![
            server("primary", ServerType::RsPrimary, 5),
            server("arbiter", ServerType::RsArbiter, 5),
            server("secondary", ServerType::RsSecondary, 5),
        ],
    );
    let criteria = SelectionCriteria::Predicate(Arc::new(|sd| {
        sd.server_type != ServerType::RsPrimary
    }));
    assert_eq!(candidates(&topology, &criteria), hosts(&["secondary"]));
}

#[test]
fn incompatible_wire_version_fails_immediately() {
    let mut old = server("old", ServerType::Standalone, 5);
    old.max_wire_version = Some(2);
    let topology = TopologyDescription::new(TopologyType::Single, vec![old]);

    let error =
        attempt_to_select_server(&ReadPreference::Primary.into(), &topology, &[], None)
            .unwrap_err();
    assert!(error.is_incompatible_server());
}

struct WatchDeployment {
    topology: watch::Sender<TopologyDescription>,
    checks_requested: AtomicUsize,
}

impl WatchDeployment {
    fn new(topology: TopologyDescription) -> Arc<Self> {
        Arc::new(Self {
            topology: watch::Sender::new(topology),
            checks_requested: AtomicUsize::new(0),
        })
    }
}

impl Deployment for WatchDeployment {
    fn description(&self) -> TopologyDescription {
        self.topology.borrow().clone()
    }

    fn wait_for_change(&self) -> futures_core::future::BoxFuture<'_, ()> {
        let mut receiver = self.topology.subscribe();
        async move {
            let _ = receiver.changed().await;
        }
        .boxed()
    }

    fn request_check(&self) {
        self.checks_requested.fetch_add(1, Ordering::SeqCst);
    }

    fn check_out<'a>(
        &'a self,
        _address: &'a ServerAddress,
    ) -> futures_core::future::BoxFuture<'a, Result<Connection>> {
        async { Err(Error::internal("no connections in selection tests")) }.boxed()
    }

    fn check_in(&self, _connection: Connection) {}

    fn handle_application_error(&self, _address: &ServerAddress, _error: &Error) {}
}

#[tokio::test(start_paused = true)]
async fn selection_times_out_with_topology_summary() {
    let deployment = WatchDeployment::new(TopologyDescription::new(
        TopologyType::ReplicaSetNoPrimary,
        vec![server("east", ServerType::RsSecondary, 5)],
    ));
    let deadline = Instant::now() + Duration::from_secs(5);

    let error = select_server(
        deployment.as_ref(),
        &ReadPreference::Primary.into(),
        "insert",
        None,
        None,
        None,
        deadline,
    )
    .await
    .unwrap_err();

    assert!(error.is_server_selection_error());
    assert!(error.to_string().contains("east:27017"), "{error}");
    assert!(deployment.checks_requested.load(Ordering::SeqCst) >= 1);
    assert!(Instant::now() >= deadline);
}

#[tokio::test(start_paused = true)]
async fn selection_waits_for_topology_change() {
    let deployment = WatchDeployment::new(TopologyDescription::new(
        TopologyType::ReplicaSetNoPrimary,
        vec![server("east", ServerType::RsSecondary, 5)],
    ));

    let updater = deployment.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        updater.topology.send_replace(replica_set());
    });

    let selected = select_server(
        deployment.as_ref(),
        &ReadPreference::Primary.into(),
        "insert",
        None,
        None,
        None,
        Instant::now() + Duration::from_secs(30),
    )
    .await
    .unwrap();
    assert_eq!(selected.address, address("primary"));
}

#[tokio::test]
async fn pinned_server_skips_filtering() {
    let deployment = WatchDeployment::new(replica_set());
    let pinned = address("east");

    let selected = select_server(
        deployment.as_ref(),
        &ReadPreference::Primary.into(),
        "find",
        Some(&pinned),
        None,
        None,
        Instant::now() + Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert_eq!(selected.address, pinned);
    assert_eq!(selected.server_type, ServerType::RsSecondary);
}
