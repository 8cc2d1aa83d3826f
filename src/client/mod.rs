pub mod auth;
pub mod csfle;
mod executor;
pub mod options;
mod retry;
pub mod session;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use derive_where::derive_where;

use crate::{
    bson::Document,
    concern::{ReadConcern, WriteConcern},
    db::Database,
    error::{ErrorKind, Result},
    operation::{EndSessions, ListDatabases},
    options::{
        ClientOptions,
        DatabaseOptions,
        ListDatabasesOptions,
        SelectionCriteria,
        SessionOptions,
    },
    results::DatabaseSpecification,
    sdam::{Deployment, ServerDescription, TopologyType},
    trace::command::CommandTracingEventEmitter,
    ClientSession,
};

pub use session::ClusterTime;
pub(crate) use session::{ClusterClock, TransactionSupportStatus};

use session::{ServerSession, ServerSessionPool};

/// The largest number of session ids sent in one `endSessions` command.
pub(crate) const MAX_END_SESSIONS_BATCH_SIZE: usize = 10_000;

/// The oldest wire versions that run transactions on a replica set and on a sharded cluster.
const REPLICA_SET_TRANSACTIONS_WIRE_VERSION: i32 = 7;
const SHARDED_TRANSACTIONS_WIRE_VERSION: i32 = 8;

/// The entry point of the command pipeline. A `Client` runs operations against a [`Deployment`],
/// which owns discovery, monitoring and connection pooling.
///
/// `Client` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks. For example:
///
/// ```rust
/// # use mongodb_core::{bson::doc, error::Result, Client};
/// # async fn start_workers(client: Client) -> Result<()> {
/// for i in 0..5 {
///     let client_ref = client.clone();
///
///     tokio::task::spawn(async move {
///         let collection = client_ref.database("items").collection(&format!("coll{}", i));
///
///         // Do something with the collection
///     });
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive_where(Debug)]
struct ClientInner {
    #[derive_where(skip)]
    deployment: Arc<dyn Deployment>,
    options: ClientOptions,
    session_pool: ServerSessionPool,
    cluster_clock: ClusterClock,
    shutdown: AtomicBool,
    #[derive_where(skip)]
    tracing_emitter: CommandTracingEventEmitter,
}

impl Client {
    /// Creates a client that runs operations against `deployment`.
    pub fn new(deployment: Arc<dyn Deployment>, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        let tracing_emitter =
            CommandTracingEventEmitter::new(options.tracing_max_document_length_bytes);
        let inner = Arc::new(ClientInner {
            deployment,
            session_pool: ServerSessionPool::new(),
            cluster_clock: ClusterClock::default(),
            shutdown: AtomicBool::new(false),
            tracing_emitter,
            options,
        });
        Ok(Self { inner })
    }

    pub(crate) fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Whether `other` is a handle to this same client.
    pub(crate) fn is_same(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The highest cluster time this client has seen.
    pub fn cluster_time(&self) -> Option<ClusterTime> {
        self.inner.cluster_clock.get()
    }

    /// Gets the default selection criteria the `Client` uses for operations.
    pub fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.options.selection_criteria.as_ref()
    }

    /// Gets the default read concern the `Client` uses for operations.
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.inner.options.read_concern.as_ref()
    }

    /// Gets the default write concern the `Client` uses for operations.
    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.options.write_concern.as_ref()
    }

    /// Gets a handle to a database specified by `name` in the cluster the `Client` is connected
    /// to. The `Database` options (e.g. read preference and write concern) will default to those
    /// of the `Client`.
    ///
    /// This method does not send or receive anything across the wire to the database, so it can be
    /// used repeatedly without incurring any costs from I/O.
    pub fn database(&self, name: &str) -> Database {
        Database::new(self.clone(), name, None)
    }

    /// Gets a handle to a database specified by `name` in the cluster the `Client` is connected
    /// to. Operations done with this `Database` will use the options specified by `options` by
    /// default and will otherwise default to those of the `Client`.
    pub fn database_with_options(&self, name: &str, options: DatabaseOptions) -> Database {
        Database::new(self.clone(), name, Some(options))
    }

    async fn list_databases_common(
        &self,
        filter: Option<Document>,
        name_only: bool,
        options: Option<ListDatabasesOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<Vec<Document>> {
        let mut options = options;
        if let Some(filter) = filter {
            options.get_or_insert_with(Default::default).filter = Some(filter);
        }
        let op = ListDatabases::new(name_only, options);
        self.execute_operation(op, session).await
    }

    /// Gets information about each database present in the cluster the Client is connected to.
    pub async fn list_databases(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<ListDatabasesOptions>>,
    ) -> Result<Vec<DatabaseSpecification>> {
        self.list_databases_with_session_common(filter.into(), options.into(), None)
            .await
    }

    /// Gets information about each database present in the cluster the Client is connected to
    /// using the provided `ClientSession`.
    pub async fn list_databases_with_session(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<ListDatabasesOptions>>,
        session: &mut ClientSession,
    ) -> Result<Vec<DatabaseSpecification>> {
        self.list_databases_with_session_common(filter.into(), options.into(), Some(session))
            .await
    }

    async fn list_databases_with_session_common(
        &self,
        filter: Option<Document>,
        options: Option<ListDatabasesOptions>,
        session: Option<&mut ClientSession>,
    ) -> Result<Vec<DatabaseSpecification>> {
        self.list_databases_common(filter, false, options, session)
            .await?
            .into_iter()
            .map(|spec| crate::bson::from_document(spec).map_err(Into::into))
            .collect()
    }

    /// Gets the names of the databases present in the cluster the Client is connected to.
    pub async fn list_database_names(
        &self,
        filter: impl Into<Option<Document>>,
        options: impl Into<Option<ListDatabasesOptions>>,
    ) -> Result<Vec<String>> {
        self.list_databases_common(filter.into(), true, options.into(), None)
            .await?
            .into_iter()
            .map(|doc| {
                let name = doc
                    .get_str("name")
                    .map_err(|_| ErrorKind::InvalidResponse {
                        message: "Expected \"name\" field in server response, but it was not found"
                            .to_string(),
                    })?;
                Ok(name.to_string())
            })
            .collect()
    }

    /// Starts a new `ClientSession`.
    pub async fn start_session(
        &self,
        options: impl Into<Option<SessionOptions>>,
    ) -> Result<ClientSession> {
        let criteria = data_bearing_criteria();
        self.select_server_for("Check sessions support status", &criteria, None, None, None)
            .await?;
        let description = self.inner.deployment.description();
        if !description.supports_sessions() {
            return Err(ErrorKind::SessionsNotSupported.into());
        }

        Ok(ClientSession::new(
            self.inner
                .session_pool
                .check_out(description.logical_session_timeout()),
            self.clone(),
            options.into(),
            false,
        ))
    }

    /// Ends every pooled server session with `endSessions` and stops accepting operations.
    /// Failures while ending sessions are ignored; the server expires them on its own.
    pub async fn shutdown(&self) {
        let session_ids = self.inner.session_pool.drain_ids();
        for chunk in session_ids.chunks(MAX_END_SESSIONS_BATCH_SIZE) {
            let op = EndSessions::new(chunk.to_vec());
            if let Err(error) = self.execute_operation(op, None).await {
                tracing::debug!(%error, "failed to end sessions");
            }
        }
        self.inner.shutdown.store(true, Ordering::SeqCst);
    }

    /// Creates the session an operation runs under when the caller did not supply one.
    fn start_implicit_session(
        &self,
        stream_description: &crate::cmap::StreamDescription,
    ) -> ClientSession {
        let logical_session_timeout = self
            .inner
            .deployment
            .description()
            .logical_session_timeout()
            .or(stream_description.logical_session_timeout);
        ClientSession::new(
            self.inner.session_pool.check_out(logical_session_timeout),
            self.clone(),
            None,
            true,
        )
    }

    /// Returns a server session to the pool, unless the deployment no longer supports sessions.
    pub(crate) fn check_in_server_session(&self, session: ServerSession) {
        let description = self.inner.deployment.description();
        if description.supports_sessions() {
            self.inner
                .session_pool
                .check_in(session, description.logical_session_timeout());
        }
    }

    /// Whether the deployment can run transactions, selecting a data-bearing server first if the
    /// topology is not known yet.
    pub(crate) async fn transaction_support_status(&self) -> Result<TransactionSupportStatus> {
        let criteria = data_bearing_criteria();
        let server = self
            .select_server_for(
                "Check transactions support status",
                &criteria,
                None,
                None,
                None,
            )
            .await?;

        if !self.inner.deployment.description().supports_sessions() {
            return Ok(TransactionSupportStatus::Unsupported);
        }
        let max_wire_version = server.max_wire_version.unwrap_or(0);
        let supported = match server.topology_type {
            TopologyType::LoadBalanced => true,
            TopologyType::Sharded => max_wire_version >= SHARDED_TRANSACTIONS_WIRE_VERSION,
            TopologyType::ReplicaSetWithPrimary | TopologyType::ReplicaSetNoPrimary => {
                max_wire_version >= REPLICA_SET_TRANSACTIONS_WIRE_VERSION
            }
            _ => false,
        };
        Ok(if supported {
            TransactionSupportStatus::Supported
        } else {
            TransactionSupportStatus::Unsupported
        })
    }

    #[cfg(test)]
    pub(crate) fn is_session_checked_in(&self, id: &Document) -> bool {
        self.inner.session_pool.contains(id)
    }

    #[cfg(test)]
    pub(crate) fn pooled_session_count(&self) -> usize {
        self.inner.session_pool.len()
    }

    #[cfg(test)]
    pub(crate) fn check_out_server_session(&self) -> ServerSession {
        self.inner
            .session_pool
            .check_out(self.inner.deployment.description().logical_session_timeout())
    }
}

fn data_bearing_criteria() -> SelectionCriteria {
    SelectionCriteria::Predicate(Arc::new(|server: &ServerDescription| {
        server.server_type.is_data_bearing()
    }))
}
