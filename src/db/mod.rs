pub mod options;

use std::sync::Arc;

use crate::{
    bson::{Bson, Document},
    concern::{ReadConcern, WriteConcern},
    cursor::Cursor,
    error::{ErrorKind, Result},
    operation::{Aggregate, AggregateTarget, DropDatabase, ListCollections, RunCommand},
    options::{
        AggregateOptions,
        CallOptions,
        CollectionOptions,
        DatabaseOptions,
        DropDatabaseOptions,
        ListCollectionsOptions,
    },
    selection_criteria::SelectionCriteria,
    Client,
    ClientSession,
    Collection,
};

/// `Database` is the client-side abstraction of a MongoDB database. It can be used to perform
/// database-level operations or to obtain handles to specific collections within the database. A
/// `Database` can only be obtained through a `Client` by calling either `Client::database` or
/// `Client::database_with_options`.
///
/// `Database` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    client: Client,
    name: String,
    selection_criteria: Option<SelectionCriteria>,
    read_concern: Option<ReadConcern>,
    write_concern: Option<WriteConcern>,
}

impl Database {
    pub(crate) fn new(client: Client, name: &str, options: Option<DatabaseOptions>) -> Self {
        let options = options.unwrap_or_default();
        let selection_criteria = options
            .selection_criteria
            .or_else(|| client.selection_criteria().cloned());

        let read_concern = options
            .read_concern
            .or_else(|| client.read_concern().cloned());

        let write_concern = options
            .write_concern
            .or_else(|| client.write_concern().cloned());

        Self {
            inner: Arc::new(DatabaseInner {
                client,
                name: name.to_string(),
                selection_criteria,
                read_concern,
                write_concern,
            }),
        }
    }

    /// Get the `Client` that this collection descended from.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// Gets the name of the `Database`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the read preference of the `Database`.
    pub fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.selection_criteria.as_ref()
    }

    /// Gets the read concern of the `Database`.
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.inner.read_concern.as_ref()
    }

    /// Gets the write concern of the `Database`.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.write_concern.as_ref()
    }

    /// Gets a handle to a collection in this database with the provided name. The
    /// `Collection` options (e.g. read preference and write concern) will default to those of
    /// this `Database`.
    ///
    /// This method does not send or receive anything across the wire to the database, so it can be
    /// used repeatedly without incurring any costs from I/O.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name, None)
    }

    /// Gets a handle to a collection in this database with the provided name.
    /// Operations done with this `Collection` will use the options specified by
    /// `options` and will otherwise default to those of this `Database`.
    pub fn collection_with_options(&self, name: &str, options: CollectionOptions) -> Collection {
        Collection::new(self.clone(), name, Some(options))
    }

    async fn drop_common(
        &self,
        options: Option<DropDatabaseOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<()> {
        let mut options = options;
        resolve_options_with_session!(self, options, session, [write_concern]);

        let drop_database = DropDatabase::new(self.name().to_string(), options);
        self.client().execute_operation(drop_database, session).await
    }

    /// Drops the database, deleting all data, collections, and indexes stored in it.
    pub async fn drop(&self, options: impl Into<Option<DropDatabaseOptions>>) -> Result<()> {
        self.drop_common(options.into(), None).await
    }

    /// Drops the database using the provided `ClientSession`.
    pub async fn drop_with_session(
        &self,
        options: impl Into<Option<DropDatabaseOptions>>,
        session: &mut ClientSession,
    ) -> Result<()> {
        self.drop_common(options.into(), Some(session)).await
    }

    /// Gets information about each of the collections in the database. The cursor will yield a
    /// document pertaining to each collection in the database.
    pub async fn list_collections(
        &self,
        options: impl Into<Option<ListCollectionsOptions>>,
    ) -> Result<Cursor> {
        let list_collections =
            ListCollections::new(self.name().to_string(), false, options.into());
        self.client()
            .execute_cursor_operation(list_collections, None, None)
            .await
    }

    /// Gets the names of the collections in the database.
    pub async fn list_collection_names(
        &self,
        filter: impl Into<Option<Document>>,
    ) -> Result<Vec<String>> {
        let options = ListCollectionsOptions {
            filter: filter.into(),
            ..Default::default()
        };
        let list_collections = ListCollections::new(self.name().to_string(), true, Some(options));
        let mut cursor = self
            .client()
            .execute_cursor_operation(list_collections, None, None)
            .await?;

        let mut names = Vec::new();
        while let Some(batch) = cursor.next_batch().await? {
            for doc in batch {
                let name = doc
                    .get("name")
                    .and_then(Bson::as_str)
                    .ok_or_else(|| ErrorKind::InvalidResponse {
                        message: "Expected name field in server response, but there was none."
                            .to_string(),
                    })?;
                names.push(name.to_string());
            }
        }
        Ok(names)
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

        let aggregate = Aggregate::new(
            AggregateTarget::Database(self.name().to_string()),
            pipeline,
            options,
        );
        self.client()
            .execute_cursor_operation(aggregate, session, None)
            .await
    }

    /// Runs an aggregation operation against the database itself, for pipelines that start with a
    /// stage such as `$currentOp` or `$documents`.
    pub async fn aggregate(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Result<Cursor> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), None)
            .await
    }

    /// Runs a database-level aggregation using the provided `ClientSession`. Later batches are
    /// fetched with [`Cursor::next_batch_with_session`].
    pub async fn aggregate_with_session(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
        session: &mut ClientSession,
    ) -> Result<Cursor> {
        self.aggregate_common(pipeline.into_iter().collect(), options.into(), Some(session))
            .await
    }

    async fn run_command_common(
        &self,
        command: Document,
        selection_criteria: Option<SelectionCriteria>,
        session: Option<&mut ClientSession>,
        call: Option<CallOptions>,
    ) -> Result<Document> {
        let operation = RunCommand::new(self.name().to_string(), command, selection_criteria)?;
        self.client()
            .execute_operation_with_options(operation, session, call)
            .await
    }

    /// Runs a database-level command.
    ///
    /// Note that no inspection is done on `command`, so the command will not use the database's
    /// default read concern or write concern. If specific read concern or write concern is
    /// desired, it must be specified manually.
    pub async fn run_command(
        &self,
        command: Document,
        selection_criteria: impl Into<Option<SelectionCriteria>>,
    ) -> Result<Document> {
        self.run_command_common(command, selection_criteria.into(), None, None)
            .await
    }

    /// Runs a database-level command bounded by the deadline and cancellation token of `call`.
    pub async fn run_command_with_call_options(
        &self,
        command: Document,
        selection_criteria: impl Into<Option<SelectionCriteria>>,
        call: CallOptions,
    ) -> Result<Document> {
        self.run_command_common(command, selection_criteria.into(), None, Some(call))
            .await
    }

    /// Runs a database-level command using the provided `ClientSession`.
    pub async fn run_command_with_session(
        &self,
        command: Document,
        selection_criteria: impl Into<Option<SelectionCriteria>>,
        session: &mut ClientSession,
    ) -> Result<Document> {
        self.run_command_common(command, selection_criteria.into(), Some(session), None)
            .await
    }
}
