//! Contains the types of results returned by the typed operations.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bson::{Bson, Document, RawDocumentBuf};

/// The result of an `insert` command, accumulated over every frame the insert was split into.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertResult {
    /// The number of documents inserted.
    pub n: i64,
}

/// The result of an `update` command.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateResult {
    /// The number of documents that matched the filters.
    pub n: i64,
    /// The number of documents that were modified by the operation.
    pub n_modified: i64,
    /// The documents that were upserted, indexed relative to the whole operation.
    pub upserted: Vec<Upserted>,
}

/// A document upserted by an `update` command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Upserted {
    /// Position of the update statement that produced the upsert.
    pub index: usize,
    /// The `_id` of the upserted document.
    #[serde(rename = "_id")]
    pub id: Bson,
}

/// The result of a `delete` command.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteResult {
    /// The number of documents deleted by the operation.
    pub n: i64,
}

/// The result of a `findAndModify` command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindAndModifyResult {
    /// The matched document (pre- or post-image), or `None` when nothing matched.
    #[serde(default)]
    pub value: Option<Document>,
    /// Details about the modification.
    #[serde(default)]
    pub last_error_object: LastErrorObject,
}

/// The `lastErrorObject` section of a `findAndModify` reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LastErrorObject {
    /// Whether an existing document was updated.
    #[serde(default)]
    pub updated_existing: bool,
    /// The `_id` of the upserted document, if any.
    pub upserted: Option<Bson>,
    /// The number of documents affected.
    #[serde(default)]
    pub n: i64,
}

/// The result of a `createIndexes` command.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct CreateIndexesResult {
    /// The names of the indexes that were requested.
    pub index_names: Vec<String>,
}

/// A database as reported by `listDatabases`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DatabaseSpecification {
    /// The name of the database.
    pub name: String,

    /// The amount of disk space in bytes that is consumed by the database.
    #[serde(default)]
    pub size_on_disk: u64,

    /// Whether the database has any data.
    #[serde(default)]
    pub empty: bool,

    /// For sharded clusters, this field includes a document which maps each shard to the size in
    /// bytes of the database on disk on that shard.
    pub shards: Option<Document>,
}

#[derive(Debug, Clone)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: VecDeque<RawDocumentBuf>,
    pub(crate) exhausted: bool,
    pub(crate) id: i64,
    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}
