use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Timestamp},
    concern::{Acknowledgment, ReadConcern, ReadConcernInternal, ReadConcernLevel, WriteConcern},
};

#[test]
fn write_concern_is_acknowledged() {
    let w_1 = WriteConcern::builder()
        .w(Acknowledgment::Nodes(1))
        .journal(false)
        .build();
    assert!(w_1.is_acknowledged());

    let w_majority = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .journal(false)
        .build();
    assert!(w_majority.is_acknowledged());

    let w_0 = WriteConcern::builder().w(Acknowledgment::Nodes(0)).build();
    assert!(!w_0.is_acknowledged());

    let w_0_journaled = WriteConcern::builder()
        .w(Acknowledgment::Nodes(0))
        .journal(true)
        .build();
    assert!(w_0_journaled.is_acknowledged());
    assert!(w_0_journaled.validate().is_err());

    let empty = WriteConcern::builder().build();
    assert!(empty.is_acknowledged());
    assert!(empty.is_empty());
}

#[test]
fn write_concern_wire_shape() {
    let wc = WriteConcern::builder()
        .w(Acknowledgment::Majority)
        .w_timeout(Duration::from_millis(10_000))
        .journal(true)
        .build();
    assert_eq!(
        crate::bson::to_document(&wc).unwrap(),
        doc! { "w": "majority", "wtimeout": 10_000, "j": true }
    );

    let custom = WriteConcern::from(Acknowledgment::from("dc-aware"));
    assert_eq!(
        crate::bson::to_document(&custom).unwrap(),
        doc! { "w": "dc-aware" }
    );
}

#[test]
fn write_concern_deserialize() {
    let wc: WriteConcern = crate::bson::from_bson(Bson::Document(doc! { "w": 1 })).unwrap();
    assert_eq!(wc, WriteConcern::nodes(1));

    let wc: WriteConcern =
        crate::bson::from_bson(Bson::Document(doc! { "w": "majority", "wtimeout": 100 }))
            .unwrap();
    assert_eq!(wc.w, Some(Acknowledgment::Majority));
    assert_eq!(wc.w_timeout, Some(Duration::from_millis(100)));
}

#[test]
fn read_concern_levels() {
    assert_eq!(
        crate::bson::to_document(&ReadConcern::snapshot()).unwrap(),
        doc! { "level": "snapshot" }
    );
    assert_eq!(
        ReadConcern::custom("experimental").level,
        ReadConcernLevel::Custom("experimental".to_string())
    );
    assert_eq!(ReadConcern::custom("local"), ReadConcern::local());
}

#[test]
fn internal_read_concern_after_cluster_time() {
    let mut rc: ReadConcernInternal = ReadConcern::majority().into();
    rc.after_cluster_time = Some(Timestamp {
        time: 10,
        increment: 2,
    });
    assert_eq!(
        crate::bson::to_document(&rc).unwrap(),
        doc! {
            "level": "majority",
            "afterClusterTime": Timestamp { time: 10, increment: 2 },
        }
    );

    let empty = ReadConcernInternal::default();
    assert!(empty.is_empty());
    assert_eq!(crate::bson::to_document(&empty).unwrap(), doc! {});
}
