use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    cmap::StreamDescription,
    concern::WriteConcern,
    error::{ErrorKind, PartialWriteResult},
    operation::{
        test::{build_test, handle_response_test, ns},
        Insert,
        Operation,
        Retryability,
    },
    options::InsertOptions,
    results::InsertResult,
};

fn sequence_documents(command: &crate::cmap::Command) -> Vec<Document> {
    assert_eq!(command.document_sequences.len(), 1);
    assert_eq!(command.document_sequences[0].identifier, "documents");
    command.document_sequences[0]
        .documents
        .iter()
        .map(|raw| raw.to_document().unwrap())
        .collect()
}

#[test]
fn build_single_document() {
    let options = InsertOptions::builder()
        .write_concern(WriteConcern::nodes(1))
        .build();
    let mut insert = Insert::new(
        ns(),
        vec![doc! { "_id": 1, "x": "a" }],
        Some(options),
    )
    .unwrap();

    let command = build_test(&mut insert, 9).unwrap();

    assert_eq!(command.name, "insert");
    assert_eq!(command.target_db, "test_db");
    assert_eq!(
        command.body,
        doc! { "insert": "test_coll", "ordered": true }
    );
    assert_eq!(command.body.keys().next().map(String::as_str), Some("insert"));
    assert_eq!(sequence_documents(&command), vec![doc! { "_id": 1, "x": "a" }]);
    assert!(insert.write_concern().is_set());
    assert_eq!(insert.retryability(), Retryability::Write);
}

#[test]
fn generates_missing_ids_first() {
    let mut insert = Insert::new(
        ns(),
        vec![doc! { "x": 1 }, doc! { "_id": "given", "x": 2 }],
        None,
    )
    .unwrap();

    let command = build_test(&mut insert, 9).unwrap();
    let documents = sequence_documents(&command);

    assert_eq!(documents[0].keys().next().map(String::as_str), Some("_id"));
    assert!(documents[0].get_object_id("_id").is_ok());
    assert_eq!(documents[0].get_i32("x"), Ok(1));
    assert_eq!(documents[1], doc! { "_id": "given", "x": 2 });

    // A retried frame carries the same generated ids.
    let again = build_test(&mut insert, 9).unwrap();
    assert_eq!(sequence_documents(&again), documents);
}

#[test]
fn unordered_and_options() {
    let options = InsertOptions::builder()
        .ordered(false)
        .bypass_document_validation(true)
        .comment(Bson::from("c"))
        .build();
    let mut insert = Insert::new(ns(), vec![doc! { "_id": 1 }], Some(options)).unwrap();

    let command = build_test(&mut insert, 9).unwrap();
    assert_eq!(
        command.body,
        doc! {
            "insert": "test_coll",
            "ordered": false,
            "bypassDocumentValidation": true,
            "comment": "c",
        }
    );
}

#[test]
fn empty_input_is_rejected() {
    let error = Insert::new(ns(), Vec::new(), None).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn n_round_trips() {
    for n in [0_i64, 1, (1 << 31) - 1, 1 << 31, 1 << 62] {
        let mut insert = Insert::new(ns(), vec![doc! { "_id": 1 }], None).unwrap();
        build_test(&mut insert, 9).unwrap();
        let result = handle_response_test(&mut insert, doc! { "ok": 1, "n": n }).unwrap();
        assert_eq!(result, InsertResult { n });
    }

    let mut insert = Insert::new(ns(), vec![doc! { "_id": 1 }], None).unwrap();
    build_test(&mut insert, 9).unwrap();
    let result = handle_response_test(&mut insert, doc! { "ok": 1, "n": 1_i32 }).unwrap();
    assert_eq!(result.n, 1);
}

#[test]
fn ordered_write_error_reports_partial_result() {
    let documents = vec![doc! { "_id": 1 }, doc! { "_id": 1 }, doc! { "_id": 2 }];
    let mut insert = Insert::new(ns(), documents, None).unwrap();
    build_test(&mut insert, 9).unwrap();

    let error = handle_response_test(
        &mut insert,
        doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
        },
    )
    .unwrap_err();

    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected a bulk write failure, got {error:?}");
    };
    let write_errors = failure.write_errors.as_ref().unwrap();
    assert_eq!(write_errors.len(), 1);
    assert_eq!(write_errors[0].index, 1);
    assert_eq!(write_errors[0].code, 11000);
    assert_eq!(
        failure.partial_result,
        Some(PartialWriteResult::Insert(InsertResult { n: 1 }))
    );
}

#[test]
fn results_accumulate_across_frames() {
    let mut description = StreamDescription::with_wire_version(9);
    description.max_write_batch_size = 2;

    let documents = (0..5).map(|i| doc! { "_id": i }).collect();
    let mut insert = Insert::new(ns(), documents, None).unwrap();

    let command = insert.build(&description).unwrap();
    assert_eq!(sequence_documents(&command).len(), 2);
    let result = handle_response_test(&mut insert, doc! { "ok": 1, "n": 2 }).unwrap();
    assert_eq!(result.n, 2);
    insert.batches().unwrap().clear();

    let command = insert.build(&description).unwrap();
    assert_eq!(
        sequence_documents(&command),
        vec![doc! { "_id": 2 }, doc! { "_id": 3 }]
    );
    let error = handle_response_test(
        &mut insert,
        doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [{ "index": 0, "code": 11000, "errmsg": "duplicate key" }],
        },
    )
    .unwrap_err();
    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected a bulk write failure, got {error:?}");
    };
    // Frame-relative index 0 is statement 2 of the whole insert.
    assert_eq!(failure.write_errors.as_ref().unwrap()[0].index, 2);
    assert_eq!(
        failure.partial_result,
        Some(PartialWriteResult::Insert(InsertResult { n: 3 }))
    );
}

#[test]
fn write_concern_error_is_reported() {
    let mut insert = Insert::new(ns(), vec![doc! { "_id": 1 }], None).unwrap();
    build_test(&mut insert, 9).unwrap();

    let error = handle_response_test(
        &mut insert,
        doc! {
            "ok": 1,
            "n": 1,
            "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "" },
            "errorLabels": ["RetryableWriteError"],
        },
    )
    .unwrap_err();
    let ErrorKind::BulkWrite(ref failure) = *error.kind else {
        panic!("expected a bulk write failure, got {error:?}");
    };
    assert_eq!(failure.write_concern_error.as_ref().map(|e| e.code), Some(64));
    assert!(failure.write_errors.is_none());
    assert!(error.contains_label("RetryableWriteError"));
}
