mod cluster_time;
mod pool;

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document, Timestamp},
    error::{ErrorKind, Result},
    operation::{AbortTransaction, CommitTransaction, Retryability},
    options::{ServerAddress, SessionOptions, TransactionOptions},
    Client,
};
pub use cluster_time::ClusterTime;
pub(crate) use cluster_time::ClusterClock;
pub(super) use pool::ServerSessionPool;

/// Whether the deployment a client talks to can run transactions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TransactionSupportStatus {
    Supported,
    Unsupported,
}

/// A logical session used for ordering sequential operations. To create a `ClientSession`, call
/// [`Client::start_session`].
///
/// A `ClientSession` may only be used by one task at a time; every operation that uses it takes
/// it by `&mut`.
///
/// ## Transactions
///
/// ```rust
/// # use mongodb_core::{
/// #     error::{Result, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
/// #     Client,
/// #     ClientSession,
/// # };
/// # async fn run(client: Client) -> Result<()> {
/// let mut session = client.start_session(None).await?;
/// session.start_transaction(None).await?;
/// // ... run operations with the session ...
/// loop {
///     let result = session.commit_transaction().await;
///     if let Err(ref error) = result {
///         if error.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
///             continue;
///         }
///     }
///     break result;
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct ClientSession {
    cluster_time: Option<ClusterTime>,
    operation_time: Option<Timestamp>,
    server_session: ServerSession,
    client: Client,
    is_implicit: bool,
    options: Option<SessionOptions>,
    pub(crate) transaction: Transaction,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Transaction {
    pub(crate) state: TransactionState,
    pub(crate) options: Option<TransactionOptions>,
    /// The mongos or load balancer every statement of a sharded transaction is routed to.
    pub(crate) pinned: Option<ServerAddress>,
    pub(crate) recovery_token: Option<Document>,
}

impl Transaction {
    pub(crate) fn start(&mut self, options: Option<TransactionOptions>) {
        self.state = TransactionState::Starting;
        self.options = options;
        self.recovery_token = None;
    }

    pub(crate) fn commit(&mut self, data_committed: bool) {
        self.state = TransactionState::Committed { data_committed };
    }

    pub(crate) fn abort(&mut self) {
        self.state = TransactionState::Aborted;
        self.options = None;
    }

    pub(crate) fn reset(&mut self) {
        self.state = TransactionState::None;
        self.options = None;
        self.pinned = None;
        self.recovery_token = None;
    }

    pub(crate) fn pin(&mut self, address: ServerAddress) {
        self.pinned = Some(address);
    }

    pub(crate) fn unpin(&mut self) {
        self.pinned = None;
    }

    /// The server the next statement must go to, if the transaction is pinned.
    pub(crate) fn pinned_address(&self) -> Option<&ServerAddress> {
        match self.state {
            TransactionState::None => None,
            _ => self.pinned.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) enum TransactionState {
    #[default]
    None,
    Starting,
    InProgress,
    Committed {
        /// Whether any data was committed when commit_transaction was initially called. This is
        /// required to determine whether a commitTransaction command should be run if the user
        /// calls commit_transaction again.
        data_committed: bool,
    },
    Aborted,
}

impl ClientSession {
    /// Creates a new `ClientSession` wrapping the provided server session.
    pub(crate) fn new(
        server_session: ServerSession,
        client: Client,
        options: Option<SessionOptions>,
        is_implicit: bool,
    ) -> Self {
        Self {
            client,
            server_session,
            cluster_time: None,
            operation_time: None,
            is_implicit,
            options,
            transaction: Default::default(),
        }
    }

    /// The client used to create this session.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The id of this session.
    pub fn id(&self) -> &Document {
        &self.server_session.id
    }

    /// Whether this session was created implicitly by the driver or explicitly by the user.
    pub(crate) fn is_implicit(&self) -> bool {
        self.is_implicit
    }

    /// Whether this session is currently in a transaction.
    pub(crate) fn in_transaction(&self) -> bool {
        matches!(
            self.transaction.state,
            TransactionState::Starting | TransactionState::InProgress
        )
    }

    /// The highest seen cluster time this session has seen so far.
    /// This will be `None` if this session has not been used in an operation yet.
    pub fn cluster_time(&self) -> Option<&ClusterTime> {
        self.cluster_time.as_ref()
    }

    /// The operation time of the most recent reply this session received.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time
    }

    /// The options used to create this session.
    pub fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// Whether reads on this session observe the writes and reads that preceded them.
    pub fn causal_consistency(&self) -> bool {
        self.options()
            .and_then(|options| options.causal_consistency)
            .unwrap_or(!self.is_implicit())
    }

    /// Set the cluster time to the provided one if it is greater than this session's highest seen
    /// cluster time or if this session's cluster time is `None`.
    pub fn advance_cluster_time(&mut self, to: &ClusterTime) {
        if self.cluster_time().map(|ct| ct < to).unwrap_or(true) {
            self.cluster_time = Some(to.clone());
        }
    }

    /// Set the operation time to the provided one if it is greater than this session's current
    /// operation time or if this session's operation time is `None`.
    pub fn advance_operation_time(&mut self, ts: Timestamp) {
        if self.operation_time.is_none_or(|current| current < ts) {
            self.operation_time = Some(ts);
        }
    }

    /// Mark this session (and the underlying server session) as dirty.
    pub(crate) fn mark_dirty(&mut self) {
        self.server_session.dirty = true;
    }

    /// Updates the date that the underlying server session was last used as part of an operation
    /// sent to the server.
    pub(crate) fn update_last_use(&mut self) {
        self.server_session.last_use = Instant::now();
    }

    /// Gets the current txn_number.
    pub(crate) fn txn_number(&self) -> i64 {
        self.server_session.txn_number
    }

    /// Increments the txn_number.
    pub(crate) fn increment_txn_number(&mut self) {
        self.server_session.txn_number += 1;
    }

    /// Increments the txn_number and returns the new value.
    pub(crate) fn get_and_increment_txn_number(&mut self) -> i64 {
        self.increment_txn_number();
        self.server_session.txn_number
    }

    /// The `txnNumber` an operation carries: the transaction's number for every statement of a
    /// transaction (including commit and abort), a fresh number for a retryable write, and none
    /// otherwise.
    pub(crate) fn get_txn_number_for_operation(
        &mut self,
        retryability: Retryability,
    ) -> Option<i64> {
        if self.transaction.state != TransactionState::None {
            Some(self.txn_number())
        } else if retryability == Retryability::Write {
            Some(self.get_and_increment_txn_number())
        } else {
            None
        }
    }

    /// Whether this session is dirty.
    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.server_session.dirty
    }

    /// Starts a new transaction on this session with the given `TransactionOptions`. If no options
    /// are provided, the session's `default_transaction_options` will be used, and any option
    /// still missing is inherited from the client. This session must be passed into each
    /// operation within the transaction; otherwise, the operation will be executed outside of the
    /// transaction.
    pub async fn start_transaction(
        &mut self,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<()> {
        if self.in_transaction() {
            return Err(ErrorKind::Transaction {
                message: "transaction already in progress".into(),
            }
            .into());
        }

        if self.client.transaction_support_status().await? != TransactionSupportStatus::Supported
        {
            return Err(ErrorKind::Transaction {
                message: "Transactions are not supported by this deployment".into(),
            }
            .into());
        }

        let mut options = options.into().unwrap_or_default();
        if let Some(defaults) = self.default_transaction_options() {
            if options.read_concern.is_none() {
                options.read_concern = defaults.read_concern.clone();
            }
            if options.write_concern.is_none() {
                options.write_concern = defaults.write_concern.clone();
            }
            if options.selection_criteria.is_none() {
                options.selection_criteria = defaults.selection_criteria.clone();
            }
            if options.max_commit_time.is_none() {
                options.max_commit_time = defaults.max_commit_time;
            }
        }
        let client_options = self.client.options();
        if options.read_concern.is_none() {
            options.read_concern = client_options.read_concern.clone();
        }
        if options.write_concern.is_none() {
            options.write_concern = client_options.write_concern.clone();
        }
        if options.selection_criteria.is_none() {
            options.selection_criteria = client_options.selection_criteria.clone();
        }

        if !options
            .write_concern
            .as_ref()
            .map(|wc| wc.is_acknowledged())
            .unwrap_or(true)
        {
            return Err(ErrorKind::Transaction {
                message: "transactions do not support unacknowledged write concerns".into(),
            }
            .into());
        }

        self.increment_txn_number();
        self.transaction.reset();
        self.transaction.start(Some(options));
        Ok(())
    }

    /// Commits the transaction that is currently active on this session.
    ///
    /// A transaction that ran no statements is committed without contacting the server. Calling
    /// this again after a commit retries the commit with a majority write concern.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(ErrorKind::Transaction {
                message: "no transaction started".into(),
            }
            .into()),
            TransactionState::Aborted => Err(ErrorKind::Transaction {
                message: "Cannot call commitTransaction after calling abortTransaction".into(),
            }
            .into()),
            TransactionState::Starting => {
                self.transaction.commit(false);
                Ok(())
            }
            TransactionState::InProgress => {
                let commit_transaction = CommitTransaction::new(self.transaction.options.clone());
                self.transaction.commit(true);
                self.client
                    .clone()
                    .execute_operation(commit_transaction, self)
                    .await
            }
            TransactionState::Committed {
                data_committed: true,
            } => {
                let mut commit_transaction =
                    CommitTransaction::new(self.transaction.options.clone());
                commit_transaction.upgrade_write_concern();
                self.client
                    .clone()
                    .execute_operation(commit_transaction, self)
                    .await
            }
            TransactionState::Committed {
                data_committed: false,
            } => Ok(()),
        }
    }

    /// Aborts the transaction that is currently active on this session. Any open transaction will
    /// be aborted automatically when the `ClientSession` is dropped.
    ///
    /// Errors returned by the server while aborting are ignored.
    pub async fn abort_transaction(&mut self) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(ErrorKind::Transaction {
                message: "no transaction started".into(),
            }
            .into()),
            TransactionState::Committed { .. } => Err(ErrorKind::Transaction {
                message: "Cannot call abortTransaction after calling commitTransaction".into(),
            }
            .into()),
            TransactionState::Aborted => Err(ErrorKind::Transaction {
                message: "cannot call abortTransaction twice".into(),
            }
            .into()),
            TransactionState::Starting => {
                self.transaction.abort();
                Ok(())
            }
            TransactionState::InProgress => {
                let write_concern = self
                    .transaction
                    .options
                    .as_ref()
                    .and_then(|options| options.write_concern.as_ref())
                    .cloned();
                let abort_transaction = AbortTransaction::new(write_concern);
                self.transaction.abort();
                let _result = self
                    .client
                    .clone()
                    .execute_operation(abort_transaction, &mut *self)
                    .await;
                self.transaction.unpin();
                Ok(())
            }
        }
    }

    fn default_transaction_options(&self) -> Option<&TransactionOptions> {
        self.options
            .as_ref()
            .and_then(|options| options.default_transaction_options.as_ref())
    }
}

struct DroppedClientSession {
    cluster_time: Option<ClusterTime>,
    operation_time: Option<Timestamp>,
    server_session: ServerSession,
    client: Client,
    is_implicit: bool,
    options: Option<SessionOptions>,
    transaction: Transaction,
}

impl From<DroppedClientSession> for ClientSession {
    fn from(dropped_session: DroppedClientSession) -> Self {
        Self {
            cluster_time: dropped_session.cluster_time,
            operation_time: dropped_session.operation_time,
            server_session: dropped_session.server_session,
            client: dropped_session.client,
            is_implicit: dropped_session.is_implicit,
            options: dropped_session.options,
            transaction: dropped_session.transaction,
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.transaction.state == TransactionState::InProgress {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let dropped_session = DroppedClientSession {
                    cluster_time: self.cluster_time.clone(),
                    operation_time: self.operation_time,
                    server_session: self.server_session.clone(),
                    client: self.client.clone(),
                    is_implicit: self.is_implicit,
                    options: self.options.clone(),
                    transaction: self.transaction.clone(),
                };
                handle.spawn(async move {
                    let mut session: ClientSession = dropped_session.into();
                    let _result = session.abort_transaction().await;
                });
                return;
            }
        }
        self.client
            .check_in_server_session(self.server_session.clone());
    }
}

/// Client side abstraction of a server session. These are pooled and may be associated with
/// multiple `ClientSession`s over the course of their lifetime.
#[derive(Clone, Debug)]
pub(crate) struct ServerSession {
    /// The id of the server session to which this corresponds.
    pub(crate) id: Document,

    /// The last time an operation was executed with this session.
    last_use: Instant,

    /// Whether a network error was encountered while using this session.
    dirty: bool,

    /// A monotonically increasing transaction number for this session.
    txn_number: i64,
}

impl ServerSession {
    /// Creates a new session, generating the id client side.
    fn new() -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });

        Self {
            id: doc! { "id": binary },
            last_use: Instant::now(),
            dirty: false,
            txn_number: 0,
        }
    }

    /// Determines if this server session is about to expire in a short amount of time (1 minute).
    fn is_about_to_expire(&self, logical_session_timeout: Option<Duration>) -> bool {
        let timeout = match logical_session_timeout {
            Some(timeout) => timeout,
            None => return false,
        };
        let expiration_date = self.last_use + timeout;
        expiration_date < Instant::now() + Duration::from_secs(60)
    }

    #[cfg(test)]
    pub(crate) fn with_last_use(mut self, last_use: Instant) -> Self {
        self.last_use = last_use;
        self
    }
}
