use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, rawdoc, Bson},
    error::ErrorKind,
    operation::{
        test::{build_test, handle_response_test, handle_response_test_with_wire_version, ns},
        Find,
        Operation,
        Retryability,
    },
    options::{Collation, CursorType, FindOptions, Hint},
};

#[test]
fn build() {
    let filter = doc! { "x": 2, "y": { "$gt": 1 } };
    let options = FindOptions::builder()
        .hint(Hint::Keys(doc! { "x": 1, "y": 2 }))
        .projection(doc! { "x": 0 })
        .allow_partial_results(true)
        .build();
    let mut find = Find::new(ns(), filter.clone(), Some(options));

    let command = build_test(&mut find, 9).unwrap();

    assert_eq!(command.name, "find");
    assert_eq!(command.target_db, "test_db");
    assert_eq!(
        command.body,
        doc! {
            "find": "test_coll",
            "allowPartialResults": true,
            "hint": { "x": 1, "y": 2 },
            "projection": { "x": 0 },
            "filter": filter,
        }
    );
}

#[test]
fn build_without_options_sends_empty_filter() {
    let mut find = Find::new(ns(), doc! {}, None);
    let command = build_test(&mut find, 9).unwrap();
    assert_eq!(command.body, doc! { "find": "test_coll", "filter": {} });
}

#[test]
fn negative_limit_requests_single_batch() {
    let options = FindOptions::builder().limit(-5).build();
    let mut find = Find::new(ns(), doc! {}, Some(options));

    let command = build_test(&mut find, 9).unwrap();

    assert_eq!(command.body.get_bool("singleBatch"), Ok(true));
    assert_eq!(command.body.get_i64("limit"), Ok(5));
}

#[test]
fn positive_limit_is_sent_as_is() {
    let options = FindOptions::builder().limit(3).build();
    let mut find = Find::new(ns(), doc! {}, Some(options));

    let command = build_test(&mut find, 9).unwrap();

    assert!(!command.body.contains_key("singleBatch"));
    assert_eq!(command.body.get_i64("limit"), Ok(3));
}

#[test]
fn cursor_types() {
    let cases = [
        (CursorType::NonTailable, None, None),
        (CursorType::Tailable, Some(true), None),
        (CursorType::TailableAwait, Some(true), Some(true)),
    ];
    for (cursor_type, tailable, await_data) in cases {
        let options = FindOptions::builder().cursor_type(cursor_type).build();
        let mut find = Find::new(ns(), doc! {}, Some(options));
        let command = build_test(&mut find, 9).unwrap();

        assert_eq!(command.body.get_bool("tailable").ok(), tailable);
        assert_eq!(command.body.get_bool("awaitData").ok(), await_data);
    }
}

#[test]
fn batch_size_must_fit_in_i32() {
    let options = FindOptions::builder().batch_size(u32::MAX).build();
    let mut find = Find::new(ns(), doc! {}, Some(options));

    let error = build_test(&mut find, 9).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn collation_requires_supporting_server() {
    let options = FindOptions::builder()
        .collation(Collation::builder().locale("fr").build())
        .build();
    let mut find = Find::new(ns(), doc! {}, Some(options));

    let error = build_test(&mut find, 4).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let command = build_test(&mut find, 5).unwrap();
    assert_eq!(
        command.body.get_document("collation"),
        Ok(&doc! { "locale": "fr" })
    );
}

#[test]
fn handle_success() {
    let options = FindOptions::builder()
        .batch_size(2)
        .comment(Bson::from("tagged"))
        .build();
    let mut find = Find::new(ns(), doc! {}, Some(options));

    let response = doc! {
        "ok": 1,
        "cursor": {
            "id": 123_i64,
            "ns": "test_db.test_coll",
            "firstBatch": [{ "_id": 1 }, { "_id": 2 }],
        },
    };
    let spec = handle_response_test(&mut find, response.clone()).unwrap();

    assert_eq!(spec.id(), 123);
    assert_eq!(spec.info.ns, ns());
    assert_eq!(spec.info.batch_size, Some(2));
    assert_eq!(spec.info.comment, Some(Bson::from("tagged")));
    assert_eq!(spec.info.max_time, None);
    assert!(!spec.info.await_data);
    assert_eq!(
        spec.initial_buffer.into_iter().collect::<Vec<_>>(),
        vec![rawdoc! { "_id": 1 }, rawdoc! { "_id": 2 }]
    );

    // getMore does not accept a comment before 4.4.
    let spec = handle_response_test_with_wire_version(&mut find, response, 8).unwrap();
    assert_eq!(spec.info.comment, None);
}

#[test]
fn await_time_only_for_tailable_await() {
    let response = doc! {
        "ok": 1,
        "cursor": { "id": 1_i64, "ns": "test_db.test_coll", "firstBatch": [] },
    };

    let options = FindOptions::builder()
        .cursor_type(CursorType::TailableAwait)
        .max_await_time(Duration::from_millis(500))
        .build();
    let mut find = Find::new(ns(), doc! {}, Some(options));
    let spec = handle_response_test(&mut find, response.clone()).unwrap();
    assert!(spec.info.await_data);
    assert_eq!(spec.info.max_time, Some(Duration::from_millis(500)));

    let options = FindOptions::builder()
        .cursor_type(CursorType::Tailable)
        .max_await_time(Duration::from_millis(500))
        .build();
    let mut find = Find::new(ns(), doc! {}, Some(options));
    let spec = handle_response_test(&mut find, response).unwrap();
    assert!(!spec.info.await_data);
    assert_eq!(spec.info.max_time, None);
}

#[test]
fn handle_invalid_response() {
    let mut find = Find::new(ns(), doc! {}, None);

    let error = handle_response_test(&mut find, doc! { "ok": 1, "cursor": {} }).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidResponse { .. }));

    let error = handle_response_test(
        &mut find,
        doc! { "ok": 1, "cursor": { "id": 0_i64, "ns": "nodot", "firstBatch": [] } },
    )
    .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidResponse { .. }));
}

#[test]
fn retryable_read() {
    let find = Find::new(ns(), doc! {}, None);
    assert_eq!(find.retryability(), Retryability::Read);
    assert!(!find.selection_criteria().is_set());
}
