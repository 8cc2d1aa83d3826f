use std::time::Duration;

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    bson::{Bson, Document},
    collation::Collation,
    concern::WriteConcern,
    options::{FindOneAndDeleteOptions, FindOneAndUpdateOptions, Hint, ReturnDocument},
};

/// The options of a `findAndModify`, assembled from whichever public options struct the caller
/// used.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FindAndModifyOptions {
    pub(super) sort: Option<Document>,

    pub(super) new: Option<bool>,

    pub(super) upsert: Option<bool>,

    pub(super) bypass_document_validation: Option<bool>,

    #[serde(skip)]
    pub(super) write_concern: Option<WriteConcern>,

    pub(super) array_filters: Option<Vec<Document>>,

    #[serde(skip)]
    pub(super) max_time: Option<Duration>,

    #[serde(rename = "fields")]
    pub(super) projection: Option<Document>,

    pub(super) collation: Option<Collation>,

    pub(super) hint: Option<Hint>,

    #[serde(rename = "let")]
    pub(super) let_vars: Option<Document>,

    pub(super) comment: Option<Bson>,
}

impl From<FindOneAndDeleteOptions> for FindAndModifyOptions {
    fn from(opts: FindOneAndDeleteOptions) -> Self {
        Self {
            sort: opts.sort,
            write_concern: opts.write_concern,
            max_time: opts.max_time,
            projection: opts.projection,
            collation: opts.collation,
            hint: opts.hint,
            let_vars: opts.let_vars,
            comment: opts.comment,
            ..Default::default()
        }
    }
}

impl From<FindOneAndUpdateOptions> for FindAndModifyOptions {
    fn from(opts: FindOneAndUpdateOptions) -> Self {
        Self {
            sort: opts.sort,
            new: opts.return_document.as_ref().map(ReturnDocument::as_bool),
            upsert: opts.upsert,
            bypass_document_validation: opts.bypass_document_validation,
            write_concern: opts.write_concern,
            array_filters: opts.array_filters,
            max_time: opts.max_time,
            projection: opts.projection,
            collation: opts.collation,
            hint: opts.hint,
            let_vars: opts.let_vars,
            comment: opts.comment,
        }
    }
}
