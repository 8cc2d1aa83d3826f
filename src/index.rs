//! Index models for `createIndexes` and the Atlas Search index commands.

use std::time::Duration;

use serde::Serialize;
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{bson::Document, collation::Collation, serde_util};

/// Specifies the fields and options of an index to create with
/// [`Collection::create_indexes`](crate::Collection::create_indexes).
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IndexModel {
    /// Specifies the index’s fields. For each field, specify a key-value pair in which the key is
    /// the name of the field to index and the value is index type.
    #[serde(rename = "key")]
    #[builder(!default)]
    pub keys: Document,

    /// The options for the index.
    #[serde(flatten)]
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    /// If the client did not specify a name, generate and set it. Otherwise, do nothing.
    pub(crate) fn update_name(&mut self) {
        if self
            .options
            .as_ref()
            .and_then(|o| o.name.as_ref())
            .is_none()
        {
            let key_names: Vec<String> = self
                .keys
                .iter()
                .map(|(k, v)| format!("{k}_{v}"))
                .collect();
            self.options.get_or_insert_with(IndexOptions::default).name = Some(key_names.join("_"));
        }
    }

    pub(crate) fn get_name(&self) -> Option<String> {
        self.options.as_ref().and_then(|o| o.name.as_ref()).cloned()
    }
}

/// The options of an index.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IndexOptions {
    /// The name of the index. Generated from the keys in the form `<field>_<direction>` when
    /// absent.
    pub name: Option<String>,

    /// Whether the index rejects duplicate values for the indexed fields.
    pub unique: Option<bool>,

    /// If true, the index only references documents with the specified field.
    pub sparse: Option<bool>,

    /// A TTL controlling how long the server retains documents in the collection.
    #[serde(
        rename = "expireAfterSeconds",
        serialize_with = "serde_util::duration_option_as_int_seconds::serialize"
    )]
    pub expire_after: Option<Duration>,

    /// If specified, the index only references documents that match the filter expression.
    pub partial_filter_expression: Option<Document>,

    /// The collation of the index.
    pub collation: Option<Collation>,

    /// Whether the index is hidden from the query planner.
    pub hidden: Option<bool>,
}

/// Specifies the options for a search index.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, TypedBuilder, Serialize)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct SearchIndexModel {
    /// The definition for this index.
    #[builder(!default)]
    pub definition: Document,

    /// The name for this index, if present.
    pub name: Option<String>,

    /// The type for this index, if present.
    #[serde(rename = "type")]
    pub index_type: Option<SearchIndexType>,
}

/// Specifies the type of search index.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub enum SearchIndexType {
    /// A regular search index.
    #[serde(rename = "search")]
    Search,
    /// A vector search index.
    #[serde(rename = "vectorSearch")]
    VectorSearch,
}
