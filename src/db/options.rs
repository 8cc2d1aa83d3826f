use std::time::Duration;

use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::{Bson, Document},
    concern::{ReadConcern, WriteConcern},
    selection_criteria::SelectionCriteria,
    serde_util,
};

/// These are the valid options for creating a [`Database`](crate::Database) with
/// [`Client::database_with_options`](crate::Client::database_with_options).
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct DatabaseOptions {
    /// The default read preference for operations.
    pub selection_criteria: Option<SelectionCriteria>,

    /// The default read concern for operations.
    pub read_concern: Option<ReadConcern>,

    /// The default write concern for operations.
    pub write_concern: Option<WriteConcern>,
}

/// Specifies the options to a [`Database::drop`](crate::Database::drop) operation.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct DropDatabaseOptions {
    /// The write concern for the operation.
    pub write_concern: Option<WriteConcern>,
}

/// Specifies the options to a
/// [`Database::list_collections`](crate::Database::list_collections) operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListCollectionsOptions {
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

    /// Filters the list operation.
    #[serde(skip)]
    pub filter: Option<Document>,

    /// If true and `nameOnly` is true, allows a user without the required privilege (i.e.
    /// listCollections action on the database) to run the command when access control is
    /// enforced.
    ///
    /// Note: this option is only available on MongoDB 4.0+.
    pub authorized_collections: Option<bool>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Specifies the options to a [`Client::list_databases`](crate::Client::list_databases)
/// operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListDatabasesOptions {
    /// Filters the query.
    #[serde(skip)]
    pub filter: Option<Document>,

    /// Determines which databases to return based on the user's access privileges. This option is
    /// only supported on server versions 4.0.5+.
    pub authorized_databases: Option<bool>,

    /// Tags the command so it can be found in the server's logs and profiler output.
    pub comment: Option<Bson>,
}

/// Options shared by the Atlas Search index helpers.
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct SearchIndexOptions {
    /// The maximum amount of time to allow the command to run.
    pub max_time: Option<Duration>,
}
