use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document, Timestamp},
    cmap::{Command, Connection, RawCommandResponse, StreamDescription},
    coll::Namespace,
    error::{Result, TRANSIENT_TRANSACTION_ERROR},
    operation::{
        CommandErrorBody,
        CommandResponse,
        EndSessions,
        ExecutionContext,
        Operation,
        WriteConcernOnlyBody,
    },
    options::ServerAddress,
};

pub(crate) fn ns() -> Namespace {
    Namespace::new("test_db", "test_coll")
}

/// A connection that never does any I/O, carrying a handshake result for `max_wire_version`.
pub(crate) fn connection(max_wire_version: i32) -> Connection {
    let (stream, _) = tokio::io::duplex(64);
    let mut connection = Connection::new(ServerAddress::default(), 1, stream);
    connection.stream_description = Some(StreamDescription::with_wire_version(max_wire_version));
    connection
}

pub(crate) fn build_test<T: Operation>(op: &mut T, max_wire_version: i32) -> Result<Command> {
    op.build(&StreamDescription::with_wire_version(max_wire_version))
}

pub(crate) fn handle_response_test<T: Operation>(op: &mut T, response: Document) -> Result<T::O> {
    handle_response_test_with_wire_version(op, response, 9)
}

pub(crate) fn handle_response_test_with_wire_version<T: Operation>(
    op: &mut T,
    response: Document,
    max_wire_version: i32,
) -> Result<T::O> {
    let connection = connection(max_wire_version);
    let raw = RawCommandResponse::with_document_and_address(ServerAddress::default(), response)?;
    op.handle_response(
        raw,
        ExecutionContext {
            connection: &connection,
        },
    )
}

#[test]
fn response_success() {
    let cluster_timestamp = Timestamp {
        time: 123,
        increment: 345,
    };
    let doc = doc! {
        "ok": 1,
        "some": "field",
        "$clusterTime": {
            "clusterTime": cluster_timestamp,
            "signature": {}
        }
    };
    let raw =
        RawCommandResponse::with_document_and_address(ServerAddress::default(), doc).unwrap();
    let response: CommandResponse<Document> = raw.body().unwrap();

    assert!(response.is_success());
    assert_eq!(response.body.get_str("some"), Ok("field"));
}

#[test]
fn response_failure() {
    let doc = doc! {
        "ok": 0,
        "code": 123,
        "codeName": "name",
        "errmsg": "some message",
        "errorLabels": [TRANSIENT_TRANSACTION_ERROR],
    };
    let raw =
        RawCommandResponse::with_document_and_address(ServerAddress::default(), doc).unwrap();
    assert!(!raw.is_success());

    let body: CommandErrorBody = raw.body().unwrap();
    assert_eq!(body.command_error.code, 123);
    assert_eq!(body.command_error.code_name, "name");
    assert_eq!(body.command_error.message, "some message");
    assert_eq!(
        body.error_labels,
        Some(vec![TRANSIENT_TRANSACTION_ERROR.to_string()])
    );

    let error = raw.command_error();
    assert_eq!(error.code(), Some(123));
    assert!(error.contains_label(TRANSIENT_TRANSACTION_ERROR));
}

#[test]
fn double_ok_is_success() {
    let raw = RawCommandResponse::with_document_and_address(
        ServerAddress::default(),
        doc! { "ok": 1.0 },
    )
    .unwrap();
    assert!(raw.is_success());
}

#[test]
fn write_concern_error_surfaces() {
    let body: WriteConcernOnlyBody = crate::bson::from_document(doc! {
        "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "timed out" },
        "errorLabels": ["RetryableWriteError"],
    })
    .unwrap();
    let error = body.validate().unwrap_err();
    assert_eq!(error.code(), Some(64));
    assert!(error.contains_label("RetryableWriteError"));

    let body = WriteConcernOnlyBody::default();
    assert!(body.validate().is_ok());
}

#[test]
fn end_sessions() {
    let ids = vec![doc! { "id": 1 }, doc! { "id": 2 }];
    let mut op = EndSessions::new(ids.clone());
    let command = build_test(&mut op, 9).unwrap();

    assert_eq!(command.name, "endSessions");
    assert_eq!(command.target_db, "admin");
    assert_eq!(
        command.body,
        doc! { "endSessions": ids.into_iter().map(Bson::Document).collect::<Vec<_>>() }
    );
    assert!(!op.supports_sessions());
    assert!(op.selection_criteria().is_set());
}

#[test]
fn namespace_round_trip() {
    assert_eq!(ns().to_string(), "test_db.test_coll");
    assert_eq!(
        Namespace::from_str("db.coll.with.dots"),
        Some(Namespace::new("db", "coll.with.dots"))
    );
    assert_eq!(Namespace::from_str("nodot"), None);
}
