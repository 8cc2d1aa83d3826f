use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson},
    concern::{ReadConcern, WriteConcern},
    error::ErrorKind,
    operation::{
        test::{build_test, handle_response_test, ns},
        Aggregate,
        Operation,
        Retryability,
    },
    options::{AggregateOptions, Collation},
};

#[test]
fn build() {
    let pipeline = vec![doc! { "$match": { "x": 3 } }];
    let options = AggregateOptions::builder()
        .allow_disk_use(true)
        .batch_size(5)
        .build();
    let mut aggregate = Aggregate::new(ns(), pipeline.clone(), Some(options));

    let command = build_test(&mut aggregate, 9).unwrap();

    assert_eq!(command.name, "aggregate");
    assert_eq!(command.target_db, "test_db");
    assert_eq!(
        command.body,
        doc! {
            "aggregate": "test_coll",
            "pipeline": [{ "$match": { "x": 3 } }],
            "allowDiskUse": true,
            "cursor": { "batchSize": 5 },
        }
    );
}

#[test]
fn empty_pipeline_is_sent() {
    let mut aggregate = Aggregate::new(ns(), Vec::new(), None);
    let command = build_test(&mut aggregate, 9).unwrap();
    assert_eq!(
        command.body,
        doc! { "aggregate": "test_coll", "pipeline": [], "cursor": {} }
    );
}

#[test]
fn database_aggregate() {
    let mut aggregate = Aggregate::new(
        "admin".to_string(),
        vec![doc! { "$currentOp": {} }],
        None,
    );
    let command = build_test(&mut aggregate, 9).unwrap();
    assert_eq!(command.target_db, "admin");
    assert_eq!(command.body.get("aggregate"), Some(&Bson::Int32(1)));
}

#[test]
fn out_stage_drops_batch_size() {
    let options = AggregateOptions::builder()
        .batch_size(5)
        .write_concern(WriteConcern::majority())
        .read_concern(ReadConcern::majority())
        .build();
    let pipeline = vec![doc! { "$match": {} }, doc! { "$out": "other" }];
    let mut aggregate = Aggregate::new(ns(), pipeline, Some(options));

    assert!(aggregate.is_out_or_merge());
    let command = build_test(&mut aggregate, 9).unwrap();
    assert_eq!(command.body.get_document("cursor"), Ok(&doc! {}));

    assert_eq!(aggregate.retryability(), Retryability::None);
    assert!(!aggregate.selection_criteria().supported());
    assert!(aggregate.write_concern().is_set());
    assert!(aggregate.read_concern().is_set());

    // Writing aggregates only take a read concern on 4.2+.
    build_test(&mut aggregate, 7).unwrap();
    assert!(!aggregate.read_concern().supported());
}

#[test]
fn merge_stage_is_detected() {
    let aggregate = Aggregate::new(ns(), vec![doc! { "$merge": { "into": "c" } }], None);
    assert!(aggregate.is_out_or_merge());

    let aggregate = Aggregate::new(ns(), vec![doc! { "$out": "c" }, doc! { "$match": {} }], None);
    assert!(!aggregate.is_out_or_merge());
    assert_eq!(aggregate.retryability(), Retryability::Read);
    assert!(!aggregate.write_concern().supported());
}

#[test]
fn collation_requires_supporting_server() {
    let options = AggregateOptions::builder()
        .collation(Collation::builder().locale("en").build())
        .build();
    let mut aggregate = Aggregate::new(ns(), Vec::new(), Some(options));

    let error = build_test(&mut aggregate, 4).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn handle_success() {
    let mut aggregate = Aggregate::new(ns(), Vec::new(), None);
    let spec = handle_response_test(
        &mut aggregate,
        doc! {
            "ok": 1,
            "cursor": {
                "id": 0_i64,
                "ns": "test_db.test_coll",
                "firstBatch": [{ "_id": 1 }],
                "postBatchResumeToken": { "token": 1 },
            },
        },
    )
    .unwrap();

    assert_eq!(spec.id(), 0);
    assert_eq!(spec.initial_buffer.len(), 1);
    assert!(spec.post_batch_resume_token.is_some());
}

#[test]
fn out_stage_surfaces_write_concern_error() {
    let mut aggregate = Aggregate::new(ns(), vec![doc! { "$out": "other" }], None);
    let error = handle_response_test(
        &mut aggregate,
        doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test_db.test_coll", "firstBatch": [] },
            "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "" },
        },
    )
    .unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Write(_)));
}
