use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use pretty_assertions::assert_eq;

use super::{command_error, cursor_reply, ok, replica_set, sharded, MockDeployment, Reply};
use crate::{
    bson::{doc, Document},
    error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{
        FindOptions,
        ReadConcern,
        ReadPreference,
        SelectionCriteria,
        TransactionOptions,
        WriteConcern,
    },
    sdam::{ServerType, TopologyDescription},
    Client,
};

/// Answers inserts with `{n: 1}`, finds with an empty cursor and everything else with `{ok: 1}`.
fn answer(command: &Document) -> Reply {
    if command.contains_key("insert") {
        doc! { "ok": 1, "n": 1 }.into()
    } else if command.contains_key("find") {
        cursor_reply("db.c", 0, true, Vec::new())
    } else {
        ok()
    }
}

fn deployment(topology: TopologyDescription) -> (Client, Arc<MockDeployment>) {
    MockDeployment::new(topology, |_, command| answer(command)).into_client()
}

#[tokio::test]
async fn statements_share_one_transaction() {
    let (client, deployment) = deployment(replica_set());
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    let options = TransactionOptions::builder()
        .write_concern(WriteConcern::majority())
        .build();
    session.start_transaction(options).await.unwrap();
    coll.insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap();
    coll.insert_one_with_session(doc! { "_id": 2 }, None, &mut session)
        .await
        .unwrap();
    coll.find_one_with_session(None, None, &mut session)
        .await
        .unwrap();
    session.commit_transaction().await.unwrap();

    assert_eq!(
        deployment.command_names(),
        vec!["insert", "insert", "find", "commitTransaction"]
    );
    let received = deployment.received();
    let lsid = session.id();
    for command in &received {
        assert_eq!(command.body.get_document("lsid").unwrap(), lsid);
        assert_eq!(command.body.get_i64("txnNumber").unwrap(), 1);
        assert_eq!(command.body.get_bool("autocommit").unwrap(), false);
    }

    assert_eq!(received[0].body.get_bool("startTransaction").unwrap(), true);
    for command in &received[1..] {
        assert!(!command.body.contains_key("startTransaction"));
    }
    for command in &received[..3] {
        assert!(!command.body.contains_key("writeConcern"));
        assert!(!command.body.contains_key("readConcern"));
    }

    let commit = &received[3].body;
    assert_eq!(commit.get_str("$db").unwrap(), "admin");
    assert_eq!(
        commit.get_document("writeConcern").unwrap(),
        &doc! { "w": "majority" }
    );
}

#[tokio::test]
async fn next_transaction_gets_the_next_number() {
    let (client, deployment) = deployment(replica_set());
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    for id in 0..2 {
        session.start_transaction(None).await.unwrap();
        coll.insert_one_with_session(doc! { "_id": id }, None, &mut session)
            .await
            .unwrap();
        session.commit_transaction().await.unwrap();
    }

    let numbers: Vec<_> = deployment
        .received()
        .iter()
        .map(|command| command.body.get_i64("txnNumber").unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 1, 2, 2]);
}

#[tokio::test]
async fn transaction_read_concern_goes_on_the_first_statement() {
    let (client, deployment) = deployment(replica_set());
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    let options = TransactionOptions::builder()
        .read_concern(ReadConcern::snapshot())
        .build();
    session.start_transaction(options).await.unwrap();
    coll.find_one_with_session(None, None, &mut session)
        .await
        .unwrap();
    coll.find_one_with_session(None, None, &mut session)
        .await
        .unwrap();

    let finds = deployment.received_named("find");
    assert_eq!(
        finds[0].body.get_document("readConcern").unwrap(),
        &doc! { "level": "snapshot" }
    );
    assert!(!finds[1].body.contains_key("readConcern"));
}

#[tokio::test]
async fn sharded_transaction_stays_on_one_router() {
    let (client, deployment) = MockDeployment::new(sharded(), |_, command| {
        if command.contains_key("insert") {
            doc! { "ok": 1, "n": 1, "recoveryToken": { "shardId": "sh0" } }.into()
        } else {
            ok()
        }
    })
    .with_stream_description(|description| description.initial_server_type = ServerType::Mongos)
    .into_client();
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    for id in 0..5 {
        coll.insert_one_with_session(doc! { "_id": id }, None, &mut session)
            .await
            .unwrap();
    }
    session.commit_transaction().await.unwrap();

    let received = deployment.received();
    assert_eq!(received.len(), 6);
    assert!(received
        .iter()
        .all(|command| command.address == received[0].address));

    let commit = &received[5];
    assert_eq!(commit.name(), "commitTransaction");
    assert_eq!(
        commit.body.get_document("recoveryToken").unwrap(),
        &doc! { "shardId": "sh0" }
    );
}

#[tokio::test]
async fn repeated_commit_upgrades_the_write_concern() {
    let (client, deployment) = deployment(replica_set());
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    coll.insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap();
    session.commit_transaction().await.unwrap();
    session.commit_transaction().await.unwrap();

    let commits = deployment.received_named("commitTransaction");
    assert_eq!(commits.len(), 2);
    assert!(!commits[0].body.contains_key("writeConcern"));
    assert_eq!(
        commits[1].body.get_document("writeConcern").unwrap(),
        &doc! { "w": "majority", "wtimeout": 10_000 }
    );
    assert_eq!(
        commits[0].body.get_i64("txnNumber").unwrap(),
        commits[1].body.get_i64("txnNumber").unwrap()
    );
}

#[tokio::test]
async fn commit_is_retried_after_a_network_error() {
    let commits = AtomicUsize::new(0);
    let (client, deployment) = MockDeployment::new(replica_set(), move |_, command| {
        if command.contains_key("commitTransaction")
            && commits.fetch_add(1, Ordering::SeqCst) == 0
        {
            Reply::Close
        } else {
            answer(command)
        }
    })
    .into_client();
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    coll.insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap();
    session.commit_transaction().await.unwrap();

    let commits = deployment.received_named("commitTransaction");
    assert_eq!(commits.len(), 2);
    assert_eq!(
        commits[1].body.get_document("writeConcern").unwrap(),
        &doc! { "w": "majority", "wtimeout": 10_000 }
    );
}

#[tokio::test]
async fn commit_failure_is_labelled_unknown() {
    let (client, _deployment) = MockDeployment::new(replica_set(), |_, command| {
        if command.contains_key("commitTransaction") {
            command_error(50, "MaxTimeMSExpired", &[])
        } else {
            answer(command)
        }
    })
    .into_client();
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    coll.insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap();
    let error = session.commit_transaction().await.unwrap_err();
    assert!(error.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT));
}

#[tokio::test]
async fn network_error_in_a_transaction_is_transient() {
    let (client, deployment) = MockDeployment::new(replica_set(), |_, command| {
        if command.contains_key("insert") {
            Reply::Close
        } else {
            ok()
        }
    })
    .into_client();
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    let error = coll
        .insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap_err();
    assert!(error.contains_label(TRANSIENT_TRANSACTION_ERROR));
    // Statements inside a transaction are never retried.
    assert_eq!(deployment.received_named("insert").len(), 1);

    session.abort_transaction().await.unwrap();
    assert_eq!(deployment.received_named("abortTransaction").len(), 1);
}

#[tokio::test]
async fn abort_ignores_server_errors() {
    let (client, deployment) = MockDeployment::new(replica_set(), |_, command| {
        if command.contains_key("abortTransaction") {
            command_error(251, "NoSuchTransaction", &[])
        } else {
            answer(command)
        }
    })
    .into_client();
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();
    coll.insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap();
    session.abort_transaction().await.unwrap();

    let aborts = deployment.received_named("abortTransaction");
    assert_eq!(aborts.len(), 1);
    assert_eq!(aborts[0].body.get_i64("txnNumber").unwrap(), 1);
    assert_eq!(aborts[0].body.get_bool("autocommit").unwrap(), false);
}

#[tokio::test]
async fn statements_cannot_override_transaction_settings() {
    let (client, deployment) = deployment(replica_set());
    let coll = client.database("db").collection("c");

    let mut session = client.start_session(None).await.unwrap();
    session.start_transaction(None).await.unwrap();

    let options = FindOptions::builder()
        .read_concern(ReadConcern::majority())
        .build();
    let error = coll
        .find_one_with_session(None, options, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let options = FindOptions::builder()
        .selection_criteria(SelectionCriteria::ReadPreference(ReadPreference::Secondary {
            options: None,
        }))
        .build();
    let error = coll
        .find_one_with_session(None, options, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Transaction { .. }));

    assert!(deployment.received().is_empty());
}
