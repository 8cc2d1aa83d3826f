//! End-to-end tests of the command pipeline against an in-memory deployment.

mod client;
mod handshake;
mod mock;
mod transaction;

use std::time::Duration;

pub(crate) use self::mock::{MockDeployment, ReceivedCommand, Reply};
use crate::{
    bson::{doc, Bson, Document, Timestamp},
    options::ServerAddress,
    sdam::{ServerDescription, ServerType, TopologyDescription, TopologyType},
};

pub(crate) fn address(host: &str) -> ServerAddress {
    ServerAddress::Tcp {
        host: host.to_string(),
        port: Some(27017),
    }
}

pub(crate) fn server(host: &str, server_type: ServerType) -> ServerDescription {
    ServerDescription::builder()
        .address(address(host))
        .server_type(server_type)
        .min_wire_version(0)
        .max_wire_version(21)
        .average_round_trip_time(Duration::from_millis(1))
        .logical_session_timeout(Duration::from_secs(30 * 60))
        .build()
}

/// A primary at `a` and a secondary at `b`.
pub(crate) fn replica_set() -> TopologyDescription {
    TopologyDescription::new(
        TopologyType::ReplicaSetWithPrimary,
        vec![
            server("a", ServerType::RsPrimary),
            server("b", ServerType::RsSecondary),
        ],
    )
    .with_set_name("rs")
}

/// Two routers, `s1` and `s2`.
pub(crate) fn sharded() -> TopologyDescription {
    TopologyDescription::new(
        TopologyType::Sharded,
        vec![server("s1", ServerType::Mongos), server("s2", ServerType::Mongos)],
    )
}

pub(crate) fn ok() -> Reply {
    doc! { "ok": 1 }.into()
}

pub(crate) fn cursor_reply(ns: &str, id: i64, first: bool, batch: Vec<Document>) -> Reply {
    let key = if first { "firstBatch" } else { "nextBatch" };
    doc! {
        "ok": 1,
        "cursor": { "id": id, "ns": ns, key: batch },
    }
    .into()
}

pub(crate) fn cluster_time_reply(time: u32, mut reply: Document) -> Reply {
    reply.insert(
        "$clusterTime",
        doc! {
            "clusterTime": Timestamp { time, increment: 1 },
            "signature": { "hash": Bson::Int32(0), "keyId": 0_i64 },
        },
    );
    reply.into()
}

pub(crate) fn command_error(code: i32, code_name: &str, labels: &[&str]) -> Reply {
    let mut reply = doc! { "ok": 0, "code": code, "codeName": code_name, "errmsg": code_name };
    if !labels.is_empty() {
        reply.insert("errorLabels", labels.to_vec());
    }
    reply.into()
}
