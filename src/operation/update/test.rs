use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    cmap::StreamDescription,
    concern::{Acknowledgment, WriteConcern},
    error::ErrorKind,
    operation::{
        test::{build_test, handle_response_test, ns},
        Operation,
        Retryability,
        Update,
        UpdateStatement,
    },
    options::{Collation, Hint, UpdateModifications, UpdateOptions},
    results::{UpdateResult, Upserted},
};

fn statements(command: &crate::cmap::Command) -> Vec<Document> {
    assert_eq!(command.document_sequences[0].identifier, "updates");
    command.document_sequences[0]
        .documents
        .iter()
        .map(|raw| raw.to_document().unwrap())
        .collect()
}

fn set_x() -> UpdateModifications {
    doc! { "$set": { "x": 1 } }.into()
}

#[test]
fn build() {
    let options = UpdateOptions::builder()
        .upsert(true)
        .array_filters(vec![doc! { "e.y": 1 }])
        .bypass_document_validation(true)
        .build();
    let statement = UpdateStatement::update(doc! { "a": 1 }, set_x(), true).unwrap();
    let mut update = Update::new(ns(), vec![statement], Some(options)).unwrap();

    let command = build_test(&mut update, 9).unwrap();

    assert_eq!(command.name, "update");
    assert_eq!(
        command.body,
        doc! { "update": "test_coll", "ordered": true, "bypassDocumentValidation": true }
    );
    assert_eq!(
        statements(&command),
        vec![doc! {
            "q": { "a": 1 },
            "u": { "$set": { "x": 1 } },
            "multi": true,
            "upsert": true,
            "arrayFilters": [{ "e.y": 1 }],
        }]
    );
}

#[test]
fn unordered_option_reaches_the_command() {
    let options = UpdateOptions::builder().ordered(false).build();
    let first = UpdateStatement::update(doc! { "a": 1 }, set_x(), false).unwrap();
    let second = UpdateStatement::replace(doc! { "a": 2 }, doc! { "b": 2 }).unwrap();
    let mut update = Update::new(ns(), vec![first, second], Some(options)).unwrap();

    let command = build_test(&mut update, 9).unwrap();

    assert_eq!(command.body, doc! { "update": "test_coll", "ordered": false });
    assert_eq!(statements(&command).len(), 2);
}

#[test]
fn statement_validation() {
    let error = UpdateStatement::update(doc! {}, doc! { "x": 1 }.into(), false).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let error = UpdateStatement::replace(doc! {}, doc! { "$set": { "x": 1 } }).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    assert!(UpdateStatement::replace(doc! {}, doc! { "x": 1 }).is_ok());
}

#[test]
fn retryability_depends_on_multi() {
    let single = UpdateStatement::update(doc! {}, set_x(), false).unwrap();
    let update = Update::new(ns(), vec![single.clone()], None).unwrap();
    assert_eq!(update.retryability(), Retryability::Write);

    let multi = UpdateStatement::update(doc! {}, set_x(), true).unwrap();
    let update = Update::new(ns(), vec![single, multi], None).unwrap();
    assert_eq!(update.retryability(), Retryability::None);
}

#[test]
fn pipeline_requires_4_2() {
    let pipeline = UpdateModifications::Pipeline(vec![doc! { "$set": { "x": 1 } }]);
    let statement = UpdateStatement::update(doc! {}, pipeline, false).unwrap();
    let mut update = Update::new(ns(), vec![statement], None).unwrap();

    let error = build_test(&mut update, 7).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));

    let command = build_test(&mut update, 8).unwrap();
    assert_eq!(
        statements(&command)[0].get_array("u"),
        Ok(&vec![Bson::Document(doc! { "$set": { "x": 1 } })])
    );
}

#[test]
fn hint_rejected_on_unacknowledged_write() {
    let unacknowledged = WriteConcern::builder().w(Acknowledgment::Nodes(0)).build();
    let options = UpdateOptions::builder()
        .hint(Hint::Name("x_1".to_string()))
        .write_concern(unacknowledged)
        .build();
    let statement = UpdateStatement::update(doc! {}, set_x(), false).unwrap();
    let mut update = Update::new(ns(), vec![statement], Some(options)).unwrap();

    let error = build_test(&mut update, 9).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn collation_rejected_on_old_server() {
    let options = UpdateOptions::builder()
        .collation(Collation::builder().locale("en").build())
        .build();
    let statement = UpdateStatement::update(doc! {}, set_x(), false).unwrap();
    let mut update = Update::new(ns(), vec![statement], Some(options)).unwrap();

    let error = build_test(&mut update, 4).unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::InvalidArgument { .. }));
}

#[test]
fn handle_success() {
    let statement = UpdateStatement::update(doc! {}, set_x(), false).unwrap();
    let mut update = Update::new(ns(), vec![statement], None).unwrap();
    build_test(&mut update, 9).unwrap();

    let result =
        handle_response_test(&mut update, doc! { "ok": 1, "n": 1, "nModified": 1 }).unwrap();
    assert_eq!(
        result,
        UpdateResult {
            n: 1,
            n_modified: 1,
            upserted: Vec::new(),
        }
    );
}

#[test]
fn upserted_indexes_are_offset() {
    let mut description = StreamDescription::with_wire_version(9);
    description.max_write_batch_size = 2;

    let statements = (0..4)
        .map(|i| UpdateStatement::update(doc! { "_id": i }, set_x(), false).unwrap())
        .collect();
    let mut update = Update::new(ns(), statements, None).unwrap();

    update.build(&description).unwrap();
    let result = handle_response_test(
        &mut update,
        doc! { "ok": 1, "n": 2, "nModified": 1, "upserted": [{ "index": 1, "_id": 1 }] },
    )
    .unwrap();
    assert_eq!(result.upserted[0].index, 1);
    update.batches().unwrap().clear();

    update.build(&description).unwrap();
    let result = handle_response_test(
        &mut update,
        doc! { "ok": 1, "n": 1, "nModified": 0, "upserted": [{ "index": 0, "_id": 2 }] },
    )
    .unwrap();

    assert_eq!(result.n, 3);
    assert_eq!(result.n_modified, 1);
    assert_eq!(
        result.upserted,
        vec![
            Upserted {
                index: 1,
                id: Bson::Int32(1),
            },
            Upserted {
                index: 2,
                id: Bson::Int32(2),
            },
        ]
    );
}
