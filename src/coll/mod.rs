pub mod options;

use std::{fmt, sync::Arc};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};

use self::options::*;
use crate::{
    bson::{Bson, Document},
    concern::{ReadConcern, WriteConcern},
    cursor::Cursor,
    error::Result,
    index::{IndexModel, SearchIndexModel},
    operation::{
        Aggregate,
        Count,
        CreateIndexes,
        CreateSearchIndexes,
        Delete,
        DeleteStatement,
        Distinct,
        DropCollection,
        DropIndexes,
        DropSearchIndex,
        Find,
        FindAndModify,
        Insert,
        ListIndexes,
        Modification,
        Update,
        UpdateSearchIndex,
        UpdateStatement,
    },
    options::SearchIndexOptions,
    results::{CreateIndexesResult, DeleteResult, InsertResult, UpdateResult},
    selection_criteria::SelectionCriteria,
    Client,
    ClientSession,
    Database,
};

/// `Collection` is the client-side abstraction of a MongoDB Collection. It can be used to
/// perform collection-level operations such as CRUD operations. A `Collection` can be obtained
/// through a [`Database`](struct.Database.html) by calling either
/// [`Database::collection`](struct.Database.html#method.collection) or
/// [`Database::collection_with_options`](struct.Database.html#method.collection_with_options).
///
/// Every method has a `_with_session` counterpart that runs the operation on an explicit
/// [`ClientSession`], which is how statements join a transaction.
///
/// ```rust
/// # use mongodb_core::{bson::doc, error::Result, Client};
/// # async fn run(client: Client) -> Result<()> {
/// let coll = client.database("items").collection("in_stock");
/// coll.insert_many(vec![doc! { "x": 1 }, doc! { "x": 2 }], None).await?;
/// let mut cursor = coll.find(doc! { "x": { "$gt": 0 } }, None).await?;
/// while let Some(batch) = cursor.next_batch().await? {
///     println!("{batch:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

#[derive(Debug)]
struct CollectionInner {
    client: Client,
    db: Database,
    name: String,
    selection_criteria: Option<SelectionCriteria>,
    read_concern: Option<ReadConcern>,
    write_concern: Option<WriteConcern>,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str, options: Option<CollectionOptions>) -> Self {
        let options = options.unwrap_or_default();
        let selection_criteria = options
            .selection_criteria
            .or_else(|| db.selection_criteria().cloned());

        let read_concern = options.read_concern.or_else(|| db.read_concern().cloned());

        let write_concern = options
            .write_concern
            .or_else(|| db.write_concern().cloned());

        Self {
            inner: Arc::new(CollectionInner {
                client: db.client().clone(),
                db,
                name: name.to_string(),
                selection_criteria,
                read_concern,
                write_concern,
            }),
        }
    }

    fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the namespace of the `Collection`.
    ///
    /// The namespace of a MongoDB collection is the concatenation of the name of the database
    /// containing it, the '.' character, and the name of the collection itself. For example, if a
    /// collection named "bar" is created in a database named "foo", the namespace of the collection
    /// is "foo.bar".
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.inner.db.name(), self.name())
    }

    /// Gets the selection criteria of the `Collection`.
    pub fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.selection_criteria.as_ref()
    }

    /// Gets the read concern of the `Collection`.
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.inner.read_concern.as_ref()
    }

    /// Gets the write concern of the `Collection`.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.write_concern.as_ref()
    }

    async fn drop_common(
        &self,
        options: Option<DropCollectionOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<()> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);

        let drop = DropCollection::new(self.namespace(), options);
        self.client().execute_operation(drop, session).await
    }

    /// Drops the collection, deleting all data and indexes stored in it. Dropping a collection
    /// that does not exist succeeds.
    pub async fn drop(&self, options: impl Into<Option<DropCollectionOptions>>) -> Result<()> {
        self.drop_common(options.into(), None).await
    }

    /// Drops the collection using the provided `ClientSession`.
    pub async fn drop_with_session(
        &self,
        options: impl Into<Option<DropCollectionOptions>>,
        session: &mut ClientSession,
    ) -> Result<()> {
        self.drop_common(options.into(), Some(session)).await
    }

    async fn aggregate_common(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<Cursor> {
        let mut options = options;
        resolve_options_with_session!(
            self,
            options,
            session,
            [read_concern, write_concern, selection_criteria]
        );

        let aggregate = Aggregate::new(self.namespace(), pipeline, options);
        self.client()
            .execute_cursor_operation(aggregate, session, None)
            .await
    }

    /// Runs an aggregation operation.
    ///
    /// See the documentation [here](https://www.mongodb.com/docs/manual/aggregation/) for more
    /// information on aggregations.
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), None)
            .await
    }

    /// Runs an aggregation operation using the provided `ClientSession`.
    pub async fn aggregate_with_session(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
        session: &mut ClientSession,
    ) -> Result<Cursor> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), Some(session))
            .await
    }

    async fn count_common(
        &self,
        filter: Option<Document>,
        options: Option<CountOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<u64> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [read_concern, selection_criteria]);

        let count = Count::new(self.namespace(), filter.unwrap_or_default(), options);
        self.client().execute_operation(count, session).await
    }

    /// Counts the documents matching `filter` with the `count` command.
    pub async fn count(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<CountOptions>>,
    ) -> Result<u64> {
        self.count_common(filter.into(), options.into(), None).await
    }

    /// Counts the documents matching `filter` using the provided `ClientSession`.
    pub async fn count_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<CountOptions>>,
        session: &mut ClientSession,
    ) -> Result<u64> {
        self.count_common(filter.into(), options.into(), Some(session))
            .await
    }

    async fn distinct_common(
        &self,
        field_name: &str,
        filter: Option<Document>,
        options: Option<DistinctOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<Vec<Bson>> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [read_concern, selection_criteria]);

        let op = Distinct::new(
            self.namespace(),
            field_name.to_string(),
            filter.unwrap_or_default(),
            options,
        );
        self.client().execute_operation(op, session).await
    }

    /// Finds the distinct values of the field specified by `field_name` across the collection.
    pub async fn distinct(
        &self,
        field_name: impl AsRef<str>,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<DistinctOptions>>,
    ) -> Result<Vec<Bson>> {
        self.distinct_common(field_name.as_ref(), filter.into(), options.into(), None)
            .await
    }

    /// Finds the distinct values of the field specified by `field_name` using the provided
    /// `ClientSession`.
    pub async fn distinct_with_session(
        &self,
        field_name: impl AsRef<str>,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<DistinctOptions>>,
        session: &mut ClientSession,
    ) -> Result<Vec<Bson>> {
        self.distinct_common(
            field_name.as_ref(),
            filter.into(),
            options.into(),
            Some(session),
        )
        .await
    }

    async fn find_common(
        &self,
        filter: Option<Document>,
        options: Option<FindOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<Cursor> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [read_concern, selection_criteria]);

        let find = Find::new(self.namespace(), filter.unwrap_or_default(), options);
        self.client()
            .execute_cursor_operation(find, session, None)
            .await
    }

    /// Finds the documents in the collection matching `filter`.
    pub async fn find(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Cursor> {
        self.find_common(filter.into(), options.into(), None).await
    }

    /// Finds the documents in the collection matching `filter` using the provided
    /// `ClientSession`. Later batches are fetched with [`Cursor::next_batch_with_session`].
    pub async fn find_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
        session: &mut ClientSession,
    ) -> Result<Cursor> {
        self.find_common(filter.into(), options.into(), Some(session))
            .await
    }

    /// Finds a single document in the collection matching `filter`.
    pub async fn find_one(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Option<Document>> {
        let mut cursor = self
            .find_common(filter.into(), Some(single_batch(options.into())), None)
            .await?;
        Ok(cursor
            .next_batch()
            .await?
            .and_then(|batch| batch.into_iter().next()))
    }

    /// Finds a single document in the collection matching `filter` using the provided
    /// `ClientSession`.
    pub async fn find_one_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<FindOptions>>,
        session: &mut ClientSession,
    ) -> Result<Option<Document>> {
        let mut cursor = self
            .find_common(
                filter.into(),
                Some(single_batch(options.into())),
                Some(&mut *session),
            )
            .await?;
        Ok(cursor
            .next_batch_with_session(session)
            .await?
            .and_then(|batch| batch.into_iter().next()))
    }

    async fn find_and_modify_common(
        &self,
        op: Result<FindAndModify>,
        session: Option<&mut ClientSession>,
    ) -> Result<Option<Document>> {
        let result = self.client().execute_operation(op?, session).await?;
        Ok(result.value)
    }

    fn find_one_and_delete_op(
        &self,
        filter: Document,
        options: Option<FindOneAndDeleteOptions>,
        session: &Option<&mut ClientSession>,
    ) -> Result<FindAndModify> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);
        Ok(FindAndModify::with_delete(
            self.namespace(),
            filter,
            options,
        ))
    }

    /// Atomically finds up to one document in the collection matching `filter` and deletes it,
    /// returning the deleted document.
    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        options: impl Into<Option<FindOneAndDeleteOptions>>,
    ) -> Result<Option<Document>> {
        let op = self.find_one_and_delete_op(filter, options.into(), &None);
        self.find_and_modify_common(op, None).await
    }

    /// Atomically finds up to one document matching `filter` and deletes it using the provided
    /// `ClientSession`.
    pub async fn find_one_and_delete_with_session(
        &self,
        filter: Document,
        options: impl Into<Option<FindOneAndDeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<Option<Document>> {
        let session = Some(session);
        let op = self.find_one_and_delete_op(filter, options.into(), &session);
        self.find_and_modify_common(op, session).await
    }

    fn find_one_and_update_op(
        &self,
        filter: Document,
        modification: Modification,
        options: Option<FindOneAndUpdateOptions>,
        session: &Option<&mut ClientSession>,
    ) -> Result<FindAndModify> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);
        FindAndModify::with_update(self.namespace(), filter, modification, options)
    }

    /// Atomically finds up to one document in the collection matching `filter` and updates it.
    /// Whether the pre- or post-update version is returned is controlled by
    /// [`FindOneAndUpdateOptions::return_document`].
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
    ) -> Result<Option<Document>> {
        let op = self.find_one_and_update_op(
            filter,
            Modification::Update(update.into()),
            options.into(),
            &None,
        );
        self.find_and_modify_common(op, None).await
    }

    /// Atomically finds up to one document matching `filter` and updates it using the provided
    /// `ClientSession`.
    pub async fn find_one_and_update_with_session(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<Option<Document>> {
        let session = Some(session);
        let op = self.find_one_and_update_op(
            filter,
            Modification::Update(update.into()),
            options.into(),
            &session,
        );
        self.find_and_modify_common(op, session).await
    }

    /// Atomically finds up to one document in the collection matching `filter` and replaces it
    /// with `replacement`.
    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
    ) -> Result<Option<Document>> {
        let op = self.find_one_and_update_op(
            filter,
            Modification::Replace(replacement),
            options.into(),
            &None,
        );
        self.find_and_modify_common(op, None).await
    }

    /// Atomically finds up to one document matching `filter` and replaces it using the provided
    /// `ClientSession`.
    pub async fn find_one_and_replace_with_session(
        &self,
        filter: Document,
        replacement: Document,
        options: impl Into<Option<FindOneAndUpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<Option<Document>> {
        let session = Some(session);
        let op = self.find_one_and_update_op(
            filter,
            Modification::Replace(replacement),
            options.into(),
            &session,
        );
        self.find_and_modify_common(op, session).await
    }

    async fn insert_common(
        &self,
        docs: Vec<Document>,
        options: Option<InsertOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<InsertResult> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);

        let insert = Insert::new(self.namespace(), docs, options)?;
        self.client().execute_operation(insert, session).await
    }

    /// Inserts `doc` into the collection. A document without an `_id` is given a fresh
    /// `ObjectId`.
    pub async fn insert_one(
        &self,
        doc: Document,
        options: impl Into<Option<InsertOptions>>,
    ) -> Result<InsertResult> {
        self.insert_common(vec![doc], options.into(), None).await
    }

    /// Inserts `doc` into the collection using the provided `ClientSession`.
    pub async fn insert_one_with_session(
        &self,
        doc: Document,
        options: impl Into<Option<InsertOptions>>,
        session: &mut ClientSession,
    ) -> Result<InsertResult> {
        self.insert_common(vec![doc], options.into(), Some(session))
            .await
    }

    /// Inserts the documents in `docs` into the collection. Large inserts are split into as many
    /// commands as the server's size limits require, all sent over one connection.
    pub async fn insert_many(
        &self,
        docs: impl IntoIterator<Item = Document>,
        options: impl Into<Option<InsertOptions>>,
    ) -> Result<InsertResult> {
        self.insert_common(docs.into_iter().collect(), options.into(), None)
            .await
    }

    /// Inserts the documents in `docs` into the collection using the provided `ClientSession`.
    pub async fn insert_many_with_session(
        &self,
        docs: impl IntoIterator<Item = Document>,
        options: impl Into<Option<InsertOptions>>,
        session: &mut ClientSession,
    ) -> Result<InsertResult> {
        self.insert_common(docs.into_iter().collect(), options.into(), Some(session))
            .await
    }

    async fn update_common(
        &self,
        statement: Result<UpdateStatement>,
        options: Option<UpdateOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<UpdateResult> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);

        let update = Update::new(self.namespace(), vec![statement?], options)?;
        self.client().execute_operation(update, session).await
    }

    /// Updates up to one document matching `query` in the collection.
    pub async fn update_one(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::update(query, update.into(), false);
        self.update_common(statement, options.into(), None).await
    }

    /// Updates up to one document matching `query` using the provided `ClientSession`.
    pub async fn update_one_with_session(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::update(query, update.into(), false);
        self.update_common(statement, options.into(), Some(session))
            .await
    }

    /// Updates all documents matching `query` in the collection. Multi-document updates are not
    /// retried.
    pub async fn update_many(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::update(query, update.into(), true);
        self.update_common(statement, options.into(), None).await
    }

    /// Updates all documents matching `query` using the provided `ClientSession`.
    pub async fn update_many_with_session(
        &self,
        query: Document,
        update: impl Into<UpdateModifications>,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::update(query, update.into(), true);
        self.update_common(statement, options.into(), Some(session))
            .await
    }

    /// Replaces up to one document matching `query` in the collection with `replacement`.
    pub async fn replace_one(
        &self,
        query: Document,
        replacement: Document,
        options: impl Into<Option<UpdateOptions>>,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::replace(query, replacement);
        self.update_common(statement, options.into(), None).await
    }

    /// Replaces up to one document matching `query` using the provided `ClientSession`.
    pub async fn replace_one_with_session(
        &self,
        query: Document,
        replacement: Document,
        options: impl Into<Option<UpdateOptions>>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult> {
        let statement = UpdateStatement::replace(query, replacement);
        self.update_common(statement, options.into(), Some(session))
            .await
    }

    async fn delete_common(
        &self,
        query: Document,
        single: bool,
        options: Option<DeleteOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<DeleteResult> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);

        let statement = DeleteStatement {
            filter: query,
            single,
        };
        let delete = Delete::new(self.namespace(), vec![statement], options)?;
        self.client().execute_operation(delete, session).await
    }

    /// Deletes up to one document found matching `query`.
    pub async fn delete_one(
        &self,
        query: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(query, true, options.into(), None).await
    }

    /// Deletes up to one document found matching `query` using the provided `ClientSession`.
    pub async fn delete_one_with_session(
        &self,
        query: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(query, true, options.into(), Some(session))
            .await
    }

    /// Deletes all documents stored in the collection matching `query`. Multi-document deletes
    /// are not retried.
    pub async fn delete_many(
        &self,
        query: Document,
        options: impl Into<Option<DeleteOptions>>,
    ) -> Result<DeleteResult> {
        self.delete_common(query, false, options.into(), None).await
    }

    /// Deletes all documents matching `query` using the provided `ClientSession`.
    pub async fn delete_many_with_session(
        &self,
        query: Document,
        options: impl Into<Option<DeleteOptions>>,
        session: &mut ClientSession,
    ) -> Result<DeleteResult> {
        self.delete_common(query, false, options.into(), Some(session))
            .await
    }

    /// Creates the given indexes on this collection, returning their names.
    pub async fn create_indexes(
        &self,
        indexes: impl IntoIterator<Item = IndexModel>,
        options: impl Into<Option<CreateIndexOptions>>,
    ) -> Result<CreateIndexesResult> {
        let mut options = options.into();
        resolve_options!(self, options, [write_concern]);

        let op = CreateIndexes::new(self.namespace(), indexes.into_iter().collect(), options);
        self.client().execute_operation(op, None).await
    }

    /// Drops the index called `name`.
    pub async fn drop_index(
        &self,
        name: impl AsRef<str>,
        options: impl Into<Option<DropIndexOptions>>,
    ) -> Result<()> {
        self.drop_indexes_common(Some(name.as_ref().to_string()), options.into())
            .await
    }

    /// Drops every index on this collection except the one on `_id`.
    pub async fn drop_indexes(&self, options: impl Into<Option<DropIndexOptions>>) -> Result<()> {
        self.drop_indexes_common(None, options.into()).await
    }

    async fn drop_indexes_common(
        &self,
        name: Option<String>,
        options: Option<DropIndexOptions>,
    ) -> Result<()> {
        let mut options = options;
        resolve_options!(self, options, [write_concern]);

        let op = DropIndexes::new(self.namespace(), name, options);
        self.client().execute_operation(op, None).await
    }

    /// Lists the indexes on this collection.
    pub async fn list_indexes(
        &self,
        options: impl Into<Option<ListIndexesOptions>>,
    ) -> Result<Cursor> {
        let op = ListIndexes::new(self.namespace(), options.into());
        self.client().execute_cursor_operation(op, None, None).await
    }

    /// Creates Atlas Search indexes on this collection, returning their names.
    pub async fn create_search_indexes(
        &self,
        models: impl IntoIterator<Item = SearchIndexModel>,
        options: impl Into<Option<SearchIndexOptions>>,
    ) -> Result<Vec<String>> {
        let op = CreateSearchIndexes::new(
            self.namespace(),
            models.into_iter().collect(),
            options.into(),
        );
        self.client().execute_operation(op, None).await
    }

    /// Replaces the definition of the search index called `name`.
    pub async fn update_search_index(
        &self,
        name: impl AsRef<str>,
        definition: Document,
        options: impl Into<Option<SearchIndexOptions>>,
    ) -> Result<()> {
        let op = UpdateSearchIndex::new(
            self.namespace(),
            name.as_ref().to_string(),
            definition,
            options.into(),
        );
        self.client().execute_operation(op, None).await
    }

    /// Drops the search index called `name`. Dropping an index of a collection that does not
    /// exist succeeds.
    pub async fn drop_search_index(
        &self,
        name: impl AsRef<str>,
        options: impl Into<Option<SearchIndexOptions>>,
    ) -> Result<()> {
        let op = DropSearchIndex::new(self.namespace(), name.as_ref().to_string(), options.into());
        self.client().execute_operation(op, None).await
    }
}

/// Restricts a find to the first matching document.
fn single_batch(options: Option<FindOptions>) -> FindOptions {
    let mut options = options.unwrap_or_default();
    options.limit = Some(-1);
    options
}

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl Namespace {
    /// Creates a namespace from a database and a collection name.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// Parses `db.coll`. Everything after the first `.` is the collection name, which may itself
    /// contain dots.
    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Some(Self::new(db, coll)),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> String {
        ns.to_string()
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::from_str(&s)
            .ok_or_else(|| D::Error::custom("Missing one or more fields in namespace"))
    }
}
