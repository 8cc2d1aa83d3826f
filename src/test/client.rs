use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
    Mutex,
};

use pretty_assertions::assert_eq;

use super::{
    cluster_time_reply,
    command_error,
    cursor_reply,
    ok,
    replica_set,
    server,
    MockDeployment,
};
use crate::{
    bson::{doc, Document, Timestamp},
    error::ErrorKind,
    event::command::{
        CommandEventHandler,
        CommandFailedEvent,
        CommandStartedEvent,
        CommandSucceededEvent,
    },
    options::{ClientOptions, ServerApi, ServerApiVersion},
    sdam::{ServerType, TopologyDescription, TopologyType},
};

fn sent_cluster_time(command: &Document) -> Option<u32> {
    command
        .get_document("$clusterTime")
        .ok()
        .and_then(|cluster_time| cluster_time.get_timestamp("clusterTime").ok())
        .map(|timestamp| timestamp.time)
}

#[tokio::test]
async fn cluster_time_only_moves_forward() {
    let times = [200, 150, 300];
    let replies = AtomicU32::new(0);
    let (client, deployment) = MockDeployment::new(replica_set(), move |_, _| {
        let n = replies.fetch_add(1, Ordering::SeqCst) as usize;
        cluster_time_reply(times[n.min(times.len() - 1)], doc! { "ok": 1 })
    })
    .into_client();
    let db = client.database("admin");

    assert!(client.cluster_time().is_none());
    db.run_command(doc! { "ping": 1 }, None).await.unwrap();
    db.run_command(doc! { "ping": 1 }, None).await.unwrap();
    assert_eq!(
        client.cluster_time().map(|time| time.cluster_time),
        Some(Timestamp {
            time: 200,
            increment: 1
        })
    );
    db.run_command(doc! { "ping": 1 }, None).await.unwrap();

    let sent: Vec<_> = deployment
        .received()
        .iter()
        .map(|command| sent_cluster_time(&command.body))
        .collect();
    assert_eq!(sent, vec![None, Some(200), Some(200)]);
    assert_eq!(
        client.cluster_time().map(|time| time.cluster_time.time),
        Some(300)
    );
}

#[tokio::test]
async fn shutdown_ends_pooled_sessions() {
    let (client, deployment) = MockDeployment::new(replica_set(), |_, _| ok()).into_client();

    let first = client.start_session(None).await.unwrap();
    let second = client.start_session(None).await.unwrap();
    let mut ids = vec![first.id().clone(), second.id().clone()];
    drop(first);
    drop(second);
    assert_eq!(client.pooled_session_count(), 2);

    client.shutdown().await;
    assert_eq!(client.pooled_session_count(), 0);

    let end_sessions = deployment.received_named("endSessions");
    assert_eq!(end_sessions.len(), 1);
    assert_eq!(end_sessions[0].body.get_str("$db").unwrap(), "admin");
    assert!(!end_sessions[0].body.contains_key("lsid"));
    let mut ended: Vec<Document> = end_sessions[0]
        .body
        .get_array("endSessions")
        .unwrap()
        .iter()
        .filter_map(|id| id.as_document().cloned())
        .collect();
    let key = |id: &Document| format!("{id:?}");
    ended.sort_by_key(key);
    ids.sort_by_key(key);
    assert_eq!(ended, ids);

    let error = client
        .database("db")
        .collection("c")
        .insert_one(doc! { "_id": 1 }, None)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Shutdown));
    assert_eq!(deployment.received().len(), 1);
}

#[derive(Default)]
struct EventRecorder {
    events: Mutex<Vec<String>>,
    started: Mutex<Vec<CommandStartedEvent>>,
    request_ids: Mutex<Vec<i32>>,
}

impl CommandEventHandler for EventRecorder {
    fn handle_command_started_event(&self, event: CommandStartedEvent) {
        self.events
            .lock()
            .unwrap()
            .push(format!("started {}", event.command_name));
        self.request_ids.lock().unwrap().push(event.request_id);
        self.started.lock().unwrap().push(event);
    }

    fn handle_command_succeeded_event(&self, event: CommandSucceededEvent) {
        self.events
            .lock()
            .unwrap()
            .push(format!("succeeded {}", event.command_name));
        self.request_ids.lock().unwrap().push(event.request_id);
    }

    fn handle_command_failed_event(&self, event: CommandFailedEvent) {
        self.events.lock().unwrap().push(format!(
            "failed {} {:?}",
            event.command_name,
            event.failure.code()
        ));
        self.request_ids.lock().unwrap().push(event.request_id);
    }
}

#[tokio::test]
async fn command_events_bracket_each_command() {
    let recorder = Arc::new(EventRecorder::default());
    let handler: Arc<dyn CommandEventHandler> = recorder.clone();
    let (client, _deployment) = MockDeployment::new(replica_set(), |_, command| {
        if command.contains_key("insert") {
            doc! { "ok": 1, "n": 1 }.into()
        } else {
            command_error(2, "BadValue", &[])
        }
    })
    .into_client_with_options(ClientOptions::builder().command_event_handler(handler).build());
    let coll = client.database("db").collection("c");

    coll.insert_one(doc! { "_id": 1 }, None).await.unwrap();
    coll.find_one(None, None).await.unwrap_err();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "started insert".to_string(),
            "succeeded insert".to_string(),
            "started find".to_string(),
            "failed find Some(2)".to_string(),
        ]
    );

    let request_ids = recorder.request_ids.lock().unwrap().clone();
    assert_eq!(request_ids[0], request_ids[1]);
    assert_eq!(request_ids[2], request_ids[3]);
    assert_ne!(request_ids[0], request_ids[2]);

    let started = recorder.started.lock().unwrap();
    assert_eq!(started[0].db, "db");
    assert_eq!(started[0].command.get_str("insert").unwrap(), "c");
    assert!(started[0].command.contains_key("documents"));
}

#[tokio::test]
async fn deployment_without_sessions() {
    let mut standalone = server("a", ServerType::Standalone);
    standalone.logical_session_timeout = None;
    let topology = TopologyDescription::new(TopologyType::Single, vec![standalone]);
    let (client, deployment) =
        MockDeployment::new(topology, |_, _| doc! { "ok": 1, "n": 1 }.into())
            .with_stream_description(|description| {
                description.initial_server_type = ServerType::Standalone;
                description.logical_session_timeout = None;
            })
            .into_client();

    let error = client.start_session(None).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::SessionsNotSupported));

    client
        .database("db")
        .collection("c")
        .insert_one(doc! { "_id": 1 }, None)
        .await
        .unwrap();
    let insert = &deployment.received_named("insert")[0];
    assert!(!insert.body.contains_key("lsid"));
    assert!(!insert.body.contains_key("txnNumber"));
}

#[tokio::test]
async fn sessions_belong_to_one_client() {
    let (client, deployment) = MockDeployment::new(replica_set(), |_, _| ok()).into_client();
    let (other, _) = MockDeployment::new(replica_set(), |_, _| ok()).into_client();

    let mut session = other.start_session(None).await.unwrap();
    let error = client
        .database("db")
        .collection("c")
        .insert_one_with_session(doc! { "_id": 1 }, None, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
    assert!(deployment.received().is_empty());
}

#[tokio::test]
async fn declared_server_api_goes_on_every_command() {
    let (client, deployment) = MockDeployment::new(replica_set(), |_, _| {
        cursor_reply("db.c", 0, true, Vec::new())
    })
    .into_client_with_options(
        ClientOptions::builder()
            .server_api(ServerApi::builder().version(ServerApiVersion::V1).strict(true).build())
            .build(),
    );

    client
        .database("db")
        .collection("c")
        .find(None, None)
        .await
        .unwrap();
    let find = &deployment.received_named("find")[0];
    assert_eq!(find.body.get_str("apiVersion").unwrap(), "1");
    assert_eq!(find.body.get_bool("apiStrict").unwrap(), true);
    assert!(!find.body.contains_key("apiDeprecationErrors"));
}
