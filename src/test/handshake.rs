use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use pretty_assertions::assert_eq;

use super::{address, replica_set, MockDeployment, Reply};
use crate::{
    bson::{doc, oid::ObjectId, Document},
    error::Result,
    options::{ClientOptions, ServerApi, ServerApiVersion},
    sdam::{Deployment, ServerType, TopologyVersion},
    AwaitableHelloOptions,
    Authenticator,
    Connection,
    Handshaker,
};

fn hello_reply(primary: bool, process_id: ObjectId, counter: i64) -> Document {
    doc! {
        "ok": 1,
        "isWritablePrimary": primary,
        "secondary": !primary,
        "setName": "rs",
        "helloOk": true,
        "minWireVersion": 0,
        "maxWireVersion": 21,
        "topologyVersion": { "processId": process_id, "counter": counter },
    }
}

#[derive(Default)]
struct RecordingAuthenticator {
    mechs: Mutex<Option<Vec<String>>>,
}

impl Authenticator for RecordingAuthenticator {
    fn sasl_supported_mechs(&self) -> Option<String> {
        Some("admin.ada".to_string())
    }

    fn authenticate<'a>(
        &'a self,
        conn: &'a mut Connection,
        _speculative_reply: Option<Document>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            *self.mechs.lock().unwrap() = conn.sasl_supported_mechs().map(<[String]>::to_vec);
            Ok(())
        }
        .boxed()
    }
}

#[tokio::test]
async fn handshake_hands_sasl_mechanisms_to_the_authenticator() {
    let deployment = MockDeployment::new(replica_set(), |_, _| {
        let mut reply = hello_reply(true, ObjectId::new(), 0);
        reply.insert("saslSupportedMechs", vec!["SCRAM-SHA-256"]);
        reply.into()
    });
    let authenticator = Arc::new(RecordingAuthenticator::default());
    let options = ClientOptions::builder()
        .server_api(ServerApi::builder().version(ServerApiVersion::V1).build())
        .authenticator(authenticator.clone() as Arc<dyn Authenticator>)
        .build();
    let handshaker = Handshaker::new(&options).unwrap();

    let mut conn = deployment.check_out(&address("a")).await.unwrap();
    handshaker.handshake(&mut conn).await.unwrap();

    let hello = &deployment.received_named("hello")[0];
    assert_eq!(hello.body.get_str("saslSupportedMechs"), Ok("admin.ada"));
    assert_eq!(
        *authenticator.mechs.lock().unwrap(),
        Some(vec!["SCRAM-SHA-256".to_string()])
    );
}

#[tokio::test]
async fn check_sends_the_negotiated_hello() {
    for (hello_ok, name) in [(true, "hello"), (false, "isMaster")] {
        let deployment =
            MockDeployment::new(replica_set(), |_, _| hello_reply(true, ObjectId::new(), 0).into())
                .with_stream_description(|description| description.hello_ok = hello_ok);
        let handshaker = Handshaker::new(&ClientOptions::default()).unwrap();

        let mut conn = deployment.check_out(&address("a")).await.unwrap();
        let description = handshaker.check(&mut conn, None).await.unwrap();

        let received = deployment.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].name(), name);
        assert!(!received[0].body.contains_key("helloOk"));
        assert!(!received[0].body.contains_key("client"));
        assert!(!received[0].exhaust_allowed);

        assert_eq!(description.address, address("a"));
        assert_eq!(description.server_type, ServerType::RsPrimary);
        assert_eq!(description.set_name.as_deref(), Some("rs"));
        assert!(description.hello_ok);
        assert!(description.average_round_trip_time.is_some());
        assert!(!conn.is_streaming());
    }
}

#[tokio::test]
async fn awaitable_check_streams_topology_changes() {
    let process_id = ObjectId::new();
    let deployment = MockDeployment::new(replica_set(), move |_, _| {
        Reply::Stream(vec![
            hello_reply(true, process_id, 2),
            hello_reply(false, process_id, 3),
        ])
    });
    let handshaker = Handshaker::new(&ClientOptions::default()).unwrap();
    let awaitable = AwaitableHelloOptions::new(
        TopologyVersion {
            process_id,
            counter: 1,
        },
        Duration::from_millis(500),
    );

    let mut conn = deployment.check_out(&address("a")).await.unwrap();
    let first = handshaker.check(&mut conn, Some(awaitable)).await.unwrap();
    assert_eq!(first.server_type, ServerType::RsPrimary);
    assert_eq!(first.topology_version.map(|version| version.counter), Some(2));
    assert_eq!(first.average_round_trip_time, None);
    assert!(conn.is_streaming());
    assert!(conn.is_broken());

    // The connection belongs to the stream until its last reply arrives.
    assert!(handshaker.check(&mut conn, None).await.is_err());

    let second = handshaker.next_check(&mut conn).await.unwrap();
    assert_eq!(second.server_type, ServerType::RsSecondary);
    assert_eq!(second.topology_version.map(|version| version.counter), Some(3));
    assert!(!conn.is_streaming());
    assert!(!conn.is_broken());
    assert!(handshaker.next_check(&mut conn).await.is_err());

    let received = deployment.received();
    assert_eq!(received.len(), 1);
    let hello = &received[0];
    assert_eq!(hello.name(), "hello");
    assert!(hello.exhaust_allowed);
    assert!(!hello.body.contains_key("helloOk"));
    assert_eq!(hello.body.get_i64("maxAwaitTimeMS"), Ok(500));
    let topology_version = hello.body.get_document("topologyVersion").unwrap();
    assert_eq!(topology_version.get_object_id("processId"), Ok(process_id));
    assert_eq!(topology_version.get_i64("counter"), Ok(1));
}
