use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::{Bson, Document},
    collation::Collation,
    concern::{ReadConcern, WriteConcern},
    selection_criteria::SelectionCriteria,
    serde_util,
};

/// These are the valid options for creating a [`Collection`](crate::Collection) with
/// [`Database::collection_with_options`](crate::Database::collection_with_options).
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct CollectionOptions {
    /// The default read preference for operations.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The default read concern for operations.
    pub read_concern: Option<ReadConcern>,

    /// The default write concern for operations.
    pub write_concern: Option<WriteConcern>,
}

/// Specifies whether a `findAndModify` returns the document before or after modification.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum ReturnDocument {
    /// Return the document after modification.
    After,
    /// Return the document before modification.
    Before,
}

impl ReturnDocument {
    pub(crate) fn as_bool(&self) -> bool {
        matches!(self, Self::After)
    }
}

/// The modifications an update applies: an update document of `$` operators or, on 4.2+
/// servers, an aggregation pipeline.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum UpdateModifications {
    /// An update document. Every top-level key must be an update operator.
    Document(Document),

    /// An aggregation pipeline of update stages.
    Pipeline(Vec<Document>),
}

impl UpdateModifications {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Self::Document(ref d) => Bson::Document(d.clone()),
            Self::Pipeline(ref stages) => {
                Bson::Array(stages.iter().cloned().map(Bson::Document).collect())
            }
        }
    }
}

impl From<Document> for UpdateModifications {
    fn from(item: Document) -> Self {
        UpdateModifications::Document(item)
    }
}

impl From<Vec<Document>> for UpdateModifications {
    fn from(item: Vec<Document>) -> Self {
        UpdateModifications::Pipeline(item)
    }
}

/// Specifies the index to use for an operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Hint {
    /// Specifies the keys of the index to use.
    Keys(Document),
    /// Specifies the name of the index to use.
    Name(String),
}

impl Hint {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Hint::Keys(ref d) => Bson::Document(d.clone()),
            Hint::Name(ref s) => Bson::String(s.clone()),
        }
    }
}

/// Specifies the type of cursor to return from a find operation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[non_exhaustive]
pub enum CursorType {
    /// Default; close the cursor after the last document is received from the server.
    #[default]
    NonTailable,

    /// Do not close the cursor after the last document is received from the server. If more
    /// results become available later, the cursor will return them.
    Tailable,

    /// Similar to `Tailable`, except that the cursor should block on receiving more results if
    /// none are available.
    TailableAwait,
}

/// Specifies the options to a [`Collection::insert_many`](crate::Collection::insert_many)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, when an insert fails, return without performing the remaining writes. If false,
    /// when a write fails, continue with the remaining writes, if any.
    ///
    /// Defaults to true.
    #[serde(skip)]
    pub ordered: Option<bool>,

    /// The write concern for the operation.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::update_one`](crate::Collection::update_one),
/// [`Collection::update_many`](crate::Collection::update_many) or
/// [`Collection::replace_one`](crate::Collection::replace_one) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateOptions {
    /// A set of filters specifying to which array elements an update should apply.
    #[serde(skip)]
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, stop at the first statement that fails. If false, keep applying the remaining
    /// statements.
    ///
    /// Defaults to true.
    #[serde(skip)]
    pub ordered: Option<bool>,

    /// If true, insert a document if no matching document is found.
    #[serde(skip)]
    pub upsert: Option<bool>,

    /// The collation to use for the operation.
    #[serde(skip)]
    pub collation: Option<Collation>,

    /// A document or string that specifies the index to use to support the query predicate.
    ///
    /// Rejected when the write concern is unacknowledged.
    #[serde(skip)]
    pub hint: Option<Hint>,

    /// The write concern for the operation.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// Map of parameter names and values. Values must be constant or closed
    /// expressions that do not reference document fields. Parameters can then be
    /// accessed as variables in an aggregate expression context (e.g. "$$var").
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::delete_one`](crate::Collection::delete_one) or
/// [`Collection::delete_many`](crate::Collection::delete_many) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteOptions {
    /// If true, stop at the first statement that fails. If false, keep applying the remaining
    /// statements.
    ///
    /// Defaults to true.
    #[serde(skip)]
    pub ordered: Option<bool>,

    /// The collation to use for the operation.
    #[serde(skip)]
    pub collation: Option<Collation>,

    /// The write concern for the operation.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    ///
    /// Rejected when the write concern is unacknowledged.
    #[serde(skip)]
    pub hint: Option<Hint>,

    /// Map of parameter names and values. Values must be constant or closed
    /// expressions that do not reference document fields. Parameters can then be
    /// accessed as variables in an aggregate expression context (e.g. "$$var").
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a
/// [`Collection::find_one_and_delete`](crate::Collection::find_one_and_delete) operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct FindOneAndDeleteOptions {
    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// The level of the write concern.
    pub write_concern: Option<WriteConcern>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Map of parameter names and values.
    pub let_vars: Option<Document>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a
/// [`Collection::find_one_and_update`](crate::Collection::find_one_and_update) or
/// [`Collection::find_one_and_replace`](crate::Collection::find_one_and_replace) operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct FindOneAndUpdateOptions {
    /// A set of filters specifying to which array elements an update should apply. Ignored for
    /// replacements.
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The maximum amount of time to allow the query to run.
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// Whether the operation should return the document before or after modification.
    pub return_document: Option<ReturnDocument>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The level of the write concern.
    pub write_concern: Option<WriteConcern>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Map of parameter names and values.
    pub let_vars: Option<Document>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::aggregate`](crate::Collection::aggregate) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AggregateOptions {
    /// Enables writing to temporary files. When set to true, aggregation stages
    /// can write data to the _tmp subdirectory in the dbPath directory.
    pub allow_disk_use: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    ///
    /// Note that this does not have any affect on the documents that are returned by a cursor,
    /// only the number of documents kept in memory at a given time (and by extension, the
    /// number of round trips needed to return the entire set of documents returned by the
    /// query).
    #[serde(
        serialize_with = "serde_util::serialize_u32_option_as_batch_size",
        rename(serialize = "cursor")
    )]
    pub batch_size: Option<u32>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// Specifies a collation.
    pub collation: Option<Collation>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,

    /// The index to use for the aggregation. The hint does not apply to $lookup and $graphLookup
    /// stages.
    pub hint: Option<Hint>,

    /// The maximum amount of time for the server to wait on new documents to satisfy a tailable
    /// cursor query. If the cursor is not tailable, this option is ignored.
    #[serde(skip)]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The read concern to use for the operation.
    ///
    /// If none is specified, the read concern defined on the object executing this operation will
    /// be used.
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,

    /// The criteria used to select a server for this operation.
    ///
    /// Ignored when the pipeline ends with `$out` or `$merge`, which always runs on a primary.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// The write concern to use for the operation. Only sent for pipelines that write.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// A document with any amount of parameter names, each followed by definitions of constants in
    /// the MQL Aggregate Expression language. Each parameter name is then usable to access the
    /// value of the corresponding MQL Expression with the "$$" syntax within Aggregate Expression
    /// contexts.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

/// Specifies the options to a [`Collection::count`](crate::Collection::count) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CountOptions {
    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum number of documents to count.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64")]
    pub limit: Option<u64>,

    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The number of documents to skip before counting.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64")]
    pub skip: Option<u64>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// The level of the read concern.
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::distinct`](crate::Collection::distinct) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DistinctOptions {
    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// The level of the read concern.
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::find`](crate::Collection::find) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOptions {
    /// Enables writing to temporary files by the server. When set to true, the find operation can
    /// write data to the _tmp subdirectory in the dbPath directory.
    pub allow_disk_use: Option<bool>,

    /// If true, partial results will be returned from a mongos rather than an error being
    /// returned if one or more shards is down.
    pub allow_partial_results: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    #[serde(serialize_with = "serde_util::serialize_u32_option_as_i32")]
    pub batch_size: Option<u32>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,

    /// The type of cursor to return.
    #[serde(skip)]
    pub cursor_type: Option<CursorType>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum number of documents to query. A negative value returns a single batch of at
    /// most that many documents and closes the cursor.
    pub limit: Option<i64>,

    /// The exclusive upper bound for a specific index.
    pub max: Option<Document>,

    /// The maximum amount of time for the server to wait on new documents to satisfy a tailable
    /// cursor query. If the cursor is not tailable, this option is ignored.
    #[serde(skip)]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The inclusive lower bound for a specific index.
    pub min: Option<Document>,

    /// Whether the server should close the cursor after a period of inactivity.
    pub no_cursor_timeout: Option<bool>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// The read concern to use for this find query.
    ///
    /// If none specified, the default set on the collection will be used.
    #[serde(skip)]
    pub read_concern: Option<ReadConcern>,

    /// Whether to return only the index keys in the documents.
    pub return_key: Option<bool>,

    /// The criteria used to select a server for this find query.
    ///
    /// If none specified, the default set on the collection will be used.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// Whether to return the record identifier for each document.
    pub show_record_id: Option<bool>,

    /// The number of documents to skip before counting.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64")]
    pub skip: Option<u64>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// Map of parameter names and values. Values must be constant or closed
    /// expressions that do not reference document fields. Parameters can then be
    /// accessed as variables in an aggregate expression context (e.g. "$$var").
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

/// The number of members that must be ready before a new index is committed.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum CommitQuorum {
    /// A specific number of voting replica set members.
    Nodes(u32),

    /// All data-bearing voting members (the server's default).
    VotingMembers,

    /// A majority of data-bearing voting members.
    Majority,

    /// A replica set tag name.
    Custom(String),
}

impl Serialize for CommitQuorum {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CommitQuorum::Nodes(n) => serde_util::serialize_u32_option_as_i32(&Some(*n), serializer),
            CommitQuorum::VotingMembers => serializer.serialize_str("votingMembers"),
            CommitQuorum::Majority => serializer.serialize_str("majority"),
            CommitQuorum::Custom(s) => serializer.serialize_str(s),
        }
    }
}

/// Specifies the options to a [`Collection::create_indexes`](crate::Collection::create_indexes)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CreateIndexOptions {
    /// Specify the commit quorum needed to mark an `index` as ready. Requires a 4.4+ server.
    pub commit_quorum: Option<CommitQuorum>,

    /// The maximum amount of time to allow the index to build.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The write concern for the operation.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::drop`](crate::Collection::drop) operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct DropCollectionOptions {
    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,
}

/// Specifies the options to a [`Collection::drop_index`](crate::Collection::drop_index) or
/// [`Collection::drop_indexes`](crate::Collection::drop_indexes) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DropIndexOptions {
    /// The maximum amount of time to allow the index to drop.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The write concern for the operation.
    #[serde(skip)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Collection::list_indexes`](crate::Collection::list_indexes)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListIndexesOptions {
    /// The maximum amount of time to search for the index.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The number of indexes the server should return per cursor batch.
    #[serde(
        serialize_with = "serde_util::serialize_u32_option_as_batch_size",
        rename(serialize = "cursor")
    )]
    pub batch_size: Option<u32>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}
