use std::{sync::atomic::Ordering, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    options::CallOptions,
    retry::{self, ErrorClass, RetryDecision, RetryMode},
    session::TransactionState,
    Client,
    ClientSession,
};
use crate::{
    bson::{doc, Document, RawBsonRef, RawDocument},
    cmap::{
        conn::wire::{next_request_id, Message},
        Command,
        Connection,
        RawCommandResponse,
        StreamDescription,
    },
    concern::WriteConcern,
    cursor::{Cursor, CursorSpecification},
    error::{
        Error,
        ErrorKind,
        Result,
        WriteFailure,
        RETRYABLE_WRITE_ERROR,
        TRANSIENT_TRANSACTION_ERROR,
        UNKNOWN_TRANSACTION_COMMIT_RESULT,
    },
    event::command::{
        CommandEvent,
        CommandFailedEvent,
        CommandStartedEvent,
        CommandSucceededEvent,
    },
    operation::{
        AbortTransaction,
        CommandErrorBody,
        CommitTransaction,
        ExecutionContext,
        Feature,
        Operation,
        Retryability,
    },
    options::{ServerAddress, SelectionCriteria},
    sdam::{select_server, SelectedServer, ServerType},
    selection_criteria::ReadPreference,
    trace::{connection::emit_connection_discarded, COMMAND_TRACING_EVENT_TARGET},
    ClusterTime,
};

impl Client {
    /// Execute the given operation.
    ///
    /// Server selection will performed using the criteria specified on the operation, if any, and
    /// an implicit session will be created if the operation and write concern are compatible with
    /// sessions and an explicit session is not provided.
    pub(crate) async fn execute_operation<T: Operation>(
        &self,
        op: T,
        session: impl Into<Option<&mut ClientSession>>,
    ) -> Result<T::O> {
        self.execute_operation_with_options(op, session, None).await
    }

    /// Like [`Client::execute_operation`], bounded by a per-call deadline and cancellation token.
    pub(crate) async fn execute_operation_with_options<T: Operation>(
        &self,
        mut op: T,
        session: impl Into<Option<&mut ClientSession>>,
        call: impl Into<Option<CallOptions>>,
    ) -> Result<T::O> {
        self.execute_operation_with_details(&mut op, session.into(), call.into().unwrap_or_default())
            .await
            .map(|details| details.output)
    }

    /// Execute the given operation, returning the cursor created by the operation. A cursor that
    /// was opened under an implicit session keeps it until the cursor is exhausted.
    pub(crate) async fn execute_cursor_operation<T>(
        &self,
        mut op: T,
        session: Option<&mut ClientSession>,
        call: Option<CallOptions>,
    ) -> Result<Cursor>
    where
        T: Operation<O = CursorSpecification>,
    {
        let details = self
            .execute_operation_with_details(&mut op, session, call.unwrap_or_default())
            .await?;
        Ok(Cursor::new(
            self.clone(),
            details.output,
            details.implicit_session,
        ))
    }

    async fn execute_operation_with_details<T: Operation>(
        &self,
        op: &mut T,
        mut session: Option<&mut ClientSession>,
        call: CallOptions,
    ) -> Result<ExecutionDetails<T>> {
        // Validate inputs that can be checked before server selection and connection checkout.
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return Err(ErrorKind::Shutdown.into());
        }
        if call
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(Error::cancelled());
        }

        let in_transaction = session.as_ref().is_some_and(|s| s.in_transaction());
        if in_transaction {
            if op.read_concern().is_set() {
                return Err(Error::invalid_argument(
                    "Cannot set read concern after starting a transaction",
                ));
            }
            if op.write_concern().is_set() {
                return Err(Error::invalid_argument(
                    "Cannot set write concern after starting a transaction",
                ));
            }
        }

        if let Feature::Set(wc) = op.write_concern() {
            wc.validate()?;
        }

        let selection_criteria = match op.selection_criteria() {
            Feature::Set(criteria) => criteria.clone(),
            Feature::NotSupported => SelectionCriteria::ReadPreference(ReadPreference::Primary),
            Feature::Inherit => session
                .as_ref()
                .filter(|s| s.in_transaction())
                .and_then(|s| s.transaction.options.as_ref())
                .and_then(|o| o.selection_criteria.clone())
                .or_else(|| self.inner.options.selection_criteria.clone())
                .unwrap_or(SelectionCriteria::ReadPreference(ReadPreference::Primary)),
        };

        // Validate the session and update its transaction status if needed.
        if let Some(ref mut session) = session {
            if !session.client().is_same(self) {
                return Err(Error::invalid_argument(
                    "the session provided to an operation must be created from the same client as \
                     the collection/database on which the operation is being performed",
                ));
            }
            if in_transaction
                && selection_criteria
                    .as_read_pref()
                    .is_some_and(|rp| rp != &ReadPreference::Primary)
            {
                return Err(ErrorKind::Transaction {
                    message: "read preference in a transaction must be primary".into(),
                }
                .into());
            }
            // If the current transaction has been committed/aborted and it is not being
            // re-committed/re-aborted, reset the transaction's state to None.
            if matches!(
                session.transaction.state,
                TransactionState::Committed { .. }
            ) && op.name() != CommitTransaction::NAME
                || session.transaction.state == TransactionState::Aborted
                    && op.name() != AbortTransaction::NAME
            {
                session.transaction.reset();
            }
        }

        let deadline = self.operation_deadline(&call);
        Box::pin(async {
            self.execute_operation_with_retry(
                op,
                selection_criteria,
                session,
                deadline,
                call.cancellation.as_ref(),
            )
            .await
        })
        .await
    }

    /// The earlier of the caller's deadline and the client timeout, if either is set.
    fn operation_deadline(&self, call: &CallOptions) -> Option<Instant> {
        let timeout_deadline = self.inner.options.timeout.map(|t| Instant::now() + t);
        match (call.deadline, timeout_deadline) {
            (Some(deadline), Some(timeout_deadline)) => Some(deadline.min(timeout_deadline)),
            (deadline, timeout_deadline) => deadline.or(timeout_deadline),
        }
    }

    /// Selects a server and executes the given operation on it, optionally using a provided
    /// session. Retries the operation upon failure if retryability is supported, and sends every
    /// frame of a batched write over the same connection.
    async fn execute_operation_with_retry<T: Operation>(
        &self,
        op: &mut T,
        selection_criteria: SelectionCriteria,
        session: Option<&mut ClientSession>,
        deadline: Option<Instant>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ExecutionDetails<T>> {
        let mut implicit_session: Option<ClientSession> = None;
        let mut session = session;
        let mut retry: Option<ExecutionRetry> = None;
        let mut attempt: u32 = 0;
        // The connection and server of the previous frame of a batched write.
        let mut kept: Option<(Connection, SelectedServer)> = None;

        loop {
            attempt += 1;
            if retry.is_some() {
                op.update_for_retry();
            }

            let (mut conn, server) = match kept.take() {
                Some(kept) => kept,
                None => {
                    let server = match self
                        .select_server_for(
                            op.name(),
                            &selection_criteria,
                            session.as_deref(),
                            retry.as_ref().map(|r| &r.first_server),
                            deadline,
                        )
                        .await
                    {
                        Ok(server) => server,
                        Err(mut err) => {
                            err.add_labels_and_update_pin(None, &mut session, None);
                            return Err(match retry {
                                Some(r) => r.first_error,
                                None => err,
                            });
                        }
                    };

                    match self.check_out(&server.address, deadline).await {
                        Ok(conn) => (conn, server),
                        Err(mut err) => {
                            err.add_labels_and_update_pin(None, &mut session, None);
                            let retryability = op.retryability().with_options(&self.inner.options);
                            if retryability == Retryability::Write && err.is_network_error() {
                                err.add_label(RETRYABLE_WRITE_ERROR);
                            }
                            let in_transaction =
                                session.as_ref().is_some_and(|s| s.in_transaction());
                            let class = ErrorClass::of(&err, retryability, in_transaction);
                            match decide_for(attempt, retryability, class, deadline, true) {
                                RetryDecision::Retry => {
                                    retry = Some(ExecutionRetry::new(
                                        retry,
                                        err,
                                        server.address.clone(),
                                        None,
                                    ));
                                    continue;
                                }
                                decision => return Err(final_error(decision, retry, err)),
                            }
                        }
                    }
                }
            };

            let stream_description = conn.stream_description()?.clone();
            if !stream_description.supports_sessions()
                && session.as_ref().is_some_and(|s| !s.is_implicit())
            {
                self.release(conn);
                return Err(ErrorKind::SessionsNotSupported.into());
            }

            let in_transaction = session.as_ref().is_some_and(|s| s.in_transaction());
            let write_concern = self.effective_write_concern(op, in_transaction);
            let acknowledged = write_concern
                .as_ref()
                .is_none_or(WriteConcern::is_acknowledged);

            if session.is_none()
                && stream_description.supports_sessions()
                && op.supports_sessions()
                && acknowledged
            {
                implicit_session = Some(self.start_implicit_session(&stream_description));
                session = implicit_session.as_mut();
            }

            let retryability = self.get_retryability(op, &session, &stream_description);
            if retryability == Retryability::None {
                if let Some(r) = retry.take() {
                    self.release(conn);
                    return Err(r.first_error);
                }
            }

            let txn_number = match retry.as_ref().and_then(|r| r.prior_txn_number) {
                Some(txn_number) => Some(txn_number),
                None => session
                    .as_mut()
                    .and_then(|s| s.get_txn_number_for_operation(retryability)),
            };

            let result = self
                .execute_operation_on_connection(
                    op,
                    &mut conn,
                    &mut session,
                    OnConnection {
                        txn_number,
                        retryability,
                        criteria: &selection_criteria,
                        write_concern: write_concern.as_ref(),
                        deadline,
                        cancellation,
                        round_trip_time: server.p90_round_trip_time,
                    },
                )
                .await;

            let mut err = match result {
                Ok(output) => {
                    let next_frame = op.batches().is_some_and(|batches| {
                        batches.clear();
                        !batches.is_exhausted()
                    });
                    if next_frame {
                        kept = Some((conn, server));
                        retry = None;
                        attempt = 0;
                        continue;
                    }
                    self.release(conn);
                    return Ok(ExecutionDetails {
                        output,
                        implicit_session,
                    });
                }
                Err(err) => err,
            };

            err.wire_version = stream_description.max_wire_version;
            if err.is_network_error() || err.is_state_change_error() {
                self.inner
                    .deployment
                    .handle_application_error(&server.address, &err);
            }

            let in_transaction = session.as_ref().is_some_and(|s| s.in_transaction());
            let class = ErrorClass::of(&err, retryability, in_transaction);
            if class == ErrorClass::Fatal && conn.error.is_none() {
                conn.error = Some(err.clone());
            }
            if !class.is_retryable() && is_write_failure(&err) {
                let next_frame = op.batches().is_some_and(|batches| {
                    if batches.ordered() && has_write_errors(&err) {
                        return false;
                    }
                    batches.clear();
                    !batches.is_exhausted()
                });
                if next_frame {
                    kept = Some((conn, server));
                    retry = None;
                    attempt = 0;
                    continue;
                }
            }

            self.release(conn);
            match decide_for(attempt, retryability, class, deadline, acknowledged) {
                RetryDecision::Retry => {
                    retry = Some(ExecutionRetry::new(
                        retry,
                        err,
                        server.address.clone(),
                        txn_number,
                    ));
                }
                decision => return Err(final_error(decision, retry, err)),
            }
        }
    }

    pub(super) async fn select_server_for(
        &self,
        operation_name: &str,
        criteria: &SelectionCriteria,
        session: Option<&ClientSession>,
        deprioritized: Option<&ServerAddress>,
        deadline: Option<Instant>,
    ) -> Result<SelectedServer> {
        let pinned = session.and_then(|s| s.transaction.pinned_address());
        let selection_deadline = Instant::now() + self.inner.options.server_selection_timeout();
        let (selection_deadline, timeout_bound) = match deadline {
            Some(deadline) if deadline < selection_deadline => (deadline, true),
            _ => (selection_deadline, false),
        };

        select_server(
            self.inner.deployment.as_ref(),
            criteria,
            operation_name,
            pinned,
            deprioritized,
            self.inner.options.local_threshold,
            selection_deadline,
        )
        .await
        .map_err(|err| {
            if timeout_bound && err.is_server_selection_error() {
                Error::timeout("the operation timed out during server selection").with_source(err)
            } else {
                err
            }
        })
    }

    async fn check_out(
        &self,
        address: &ServerAddress,
        deadline: Option<Instant>,
    ) -> Result<Connection> {
        let check_out = self.inner.deployment.check_out(address);
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, check_out)
                .await
                .unwrap_or_else(|_| {
                    Err(Error::timeout(
                        "the operation timed out while checking out a connection",
                    ))
                }),
            None => check_out.await,
        }
    }

    /// Hands a connection back to the deployment, logging it if it is going to be discarded.
    fn release(&self, conn: Connection) {
        if conn.is_broken() {
            emit_connection_discarded(&conn.info(), conn.error.as_ref());
        }
        self.inner.deployment.check_in(conn);
    }

    /// Executes an operation on a given connection, optionally using a provided session.
    async fn execute_operation_on_connection<T: Operation>(
        &self,
        op: &mut T,
        connection: &mut Connection,
        session: &mut Option<&mut ClientSession>,
        params: OnConnection<'_>,
    ) -> Result<T::O> {
        let mut reauthenticated = false;
        loop {
            let mut cmd = self.build_command(op, connection, session, &params)?;
            self.set_max_time(op, &mut cmd, params.deadline, params.round_trip_time)?;
            if let Some(ref crypt) = self.inner.options.crypt {
                cmd = encrypt_command(crypt.as_ref(), cmd).await?;
            }
            if params
                .cancellation
                .is_some_and(CancellationToken::is_cancelled)
            {
                return Err(Error::cancelled());
            }

            let connection_info = connection.info();
            let service_id = connection.stream_description()?.service_id;
            let request_id = next_request_id();
            let should_redact = cmd.should_redact();
            let cmd_name = cmd.name.clone();
            let target_db = cmd.target_db.clone();

            self.emit_command_event(|| {
                let command_body = if should_redact {
                    Document::new()
                } else {
                    command_document(&cmd)
                };
                CommandEvent::Started(CommandStartedEvent {
                    command: command_body,
                    db: target_db.clone(),
                    command_name: cmd_name.clone(),
                    request_id,
                    connection: connection_info.clone(),
                    service_id,
                })
            });

            let start_time = Instant::now();
            let send_result = {
                let send = send_bounded(connection, &cmd, request_id, params.deadline);
                match params.cancellation {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(Error::cancelled()),
                        result = send => result,
                    },
                    None => send.await,
                }
            };
            let is_sharded =
                connection.stream_description()?.initial_server_type == ServerType::Mongos;
            let command_result = match send_result {
                Ok(response) => match self.parse_response(session, is_sharded, &response) {
                    Ok(()) => Ok(response),
                    Err(error) => Err(error.with_server_response(&response.raw)),
                },
                Err(err) => Err(err),
            };
            let duration = start_time.elapsed();

            let result = match command_result {
                Err(mut err) => {
                    self.emit_command_event(|| {
                        let mut err = err.clone();
                        if should_redact {
                            err.redact();
                        }
                        CommandEvent::Failed(CommandFailedEvent {
                            duration,
                            command_name: cmd_name.clone(),
                            failure: err,
                            request_id,
                            connection: connection_info.clone(),
                            service_id,
                        })
                    });

                    if let Some(ref mut session) = session {
                        if err.is_network_error() {
                            session.mark_dirty();
                        }
                    }
                    err.add_labels_and_update_pin(
                        Some(connection.stream_description()?),
                        session,
                        Some(params.retryability),
                    );
                    op.handle_error(err)
                }
                Ok(response) => {
                    self.emit_command_event(|| {
                        let reply = if should_redact {
                            Document::new()
                        } else {
                            response
                                .body()
                                .unwrap_or_else(|e| doc! { "deserialization error": e.to_string() })
                        };
                        CommandEvent::Succeeded(CommandSucceededEvent {
                            duration,
                            reply,
                            command_name: cmd_name.clone(),
                            request_id,
                            connection: connection_info.clone(),
                            service_id,
                        })
                    });

                    let response = match self.inner.options.crypt {
                        Some(ref crypt) => {
                            let body = crypt
                                .decrypt(response.raw_body())
                                .await
                                .map_err(into_encryption_error)?;
                            RawCommandResponse::new(response.source, body)
                        }
                        None => response,
                    };

                    let context = ExecutionContext { connection };
                    match op.handle_response(response, context) {
                        Ok(output) => Ok(output),
                        Err(mut err) => {
                            err.add_labels_and_update_pin(
                                Some(connection.stream_description()?),
                                session,
                                Some(params.retryability),
                            );
                            Err(err)
                        }
                    }
                }
            };

            match result {
                Err(ref err) if err.is_reauthentication_required() && !reauthenticated => {
                    // Resent regardless of retryability; this does not count as a retry.
                    self.reauthenticate_connection(connection).await?;
                    reauthenticated = true;
                }
                result => return result,
            }
        }
    }

    fn build_command<T: Operation>(
        &self,
        op: &mut T,
        connection: &Connection,
        session: &mut Option<&mut ClientSession>,
        params: &OnConnection<'_>,
    ) -> Result<Command> {
        let stream_description = connection.stream_description()?;
        let is_sharded = stream_description.initial_server_type == ServerType::Mongos;
        let mut cmd = op.build(stream_description)?;
        let in_transaction = session.as_ref().is_some_and(|s| s.in_transaction());

        let topology = self.inner.deployment.description();
        topology.update_command_with_read_pref(
            connection.address(),
            &mut cmd,
            Some(params.criteria),
        );

        if !in_transaction {
            match op.read_concern() {
                Feature::Set(read_concern) => cmd.set_read_concern(read_concern.clone().into()),
                Feature::Inherit => {
                    if let Some(ref read_concern) = self.inner.options.read_concern {
                        cmd.set_read_concern(read_concern.clone().into());
                    }
                }
                Feature::NotSupported => {}
            }
        }
        if let Some(write_concern) = params.write_concern {
            cmd.set_write_concern(write_concern.clone());
        }

        let acknowledged = params
            .write_concern
            .is_none_or(WriteConcern::is_acknowledged);
        match session {
            Some(ref mut session) if op.supports_sessions() && acknowledged => {
                cmd.set_session(session.id());
                if let Some(txn_number) = params.txn_number {
                    cmd.set_txn_number(txn_number);
                }
                // If this is a causally consistent session, set `readConcern.afterClusterTime`.
                if session.causal_consistency()
                    && matches!(
                        session.transaction.state,
                        TransactionState::None | TransactionState::Starting
                    )
                    && op.read_concern().supported()
                {
                    if let Some(operation_time) = session.operation_time() {
                        cmd.set_after_cluster_time(operation_time);
                    }
                }

                match session.transaction.state {
                    TransactionState::Starting => {
                        cmd.set_start_transaction();
                        cmd.set_autocommit();
                        if let Some(read_concern) = session
                            .transaction
                            .options
                            .as_ref()
                            .and_then(|options| options.read_concern.clone())
                        {
                            let mut internal = cmd.read_concern.take().unwrap_or_default();
                            internal.level = Some(read_concern.level);
                            cmd.set_read_concern(internal);
                        }
                        session.transaction.pin(connection.address().clone());
                        session.transaction.state = TransactionState::InProgress;
                    }
                    TransactionState::InProgress => cmd.set_autocommit(),
                    TransactionState::Committed { .. } | TransactionState::Aborted => {
                        cmd.set_autocommit();

                        // Append the recovery token to the command if we are committing or aborting
                        // on a sharded transaction.
                        if is_sharded {
                            if let Some(ref recovery_token) = session.transaction.recovery_token {
                                cmd.set_recovery_token(recovery_token);
                            }
                        }
                    }
                    TransactionState::None => {}
                }
                session.update_last_use();
            }
            Some(ref session) if !op.supports_sessions() && !session.is_implicit() => {
                return Err(ErrorKind::InvalidArgument {
                    message: format!("{} does not support sessions", cmd.name),
                }
                .into());
            }
            Some(ref session) if !acknowledged && !session.is_implicit() => {
                return Err(ErrorKind::InvalidArgument {
                    message: "Cannot use ClientSessions with unacknowledged write concern"
                        .to_string(),
                }
                .into());
            }
            _ => {}
        }

        let session_cluster_time = session.as_ref().and_then(|session| session.cluster_time());
        let client_cluster_time = self.inner.cluster_clock.get();
        let max_cluster_time = std::cmp::max(session_cluster_time, client_cluster_time.as_ref());
        if let Some(cluster_time) = max_cluster_time {
            cmd.set_cluster_time(cluster_time);
        }

        if let Some(ref server_api) = self.inner.options.server_api {
            cmd.set_server_api(server_api);
        }

        Ok(cmd)
    }

    /// Sets `maxTimeMS`: the remaining client timeout less the server's round trip time, or the
    /// operation's own limit when no client timeout applies.
    fn set_max_time<T: Operation>(
        &self,
        op: &T,
        cmd: &mut Command,
        deadline: Option<Instant>,
        round_trip_time: Option<Duration>,
    ) -> Result<()> {
        let Some(deadline) = deadline else {
            if let Some(max_time) = op.max_time() {
                cmd.max_time_ms = Some(duration_to_millis(max_time));
            }
            return Ok(());
        };

        let round_trip_time = round_trip_time.unwrap_or_default();
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining <= round_trip_time {
            return Err(Error::timeout(
                "the remaining time is shorter than the server's round trip time",
            ));
        }
        if !op.omit_csot_max_time_ms() {
            cmd.max_time_ms = Some(duration_to_millis(remaining - round_trip_time).max(1));
        }
        Ok(())
    }

    async fn reauthenticate_connection(&self, connection: &mut Connection) -> Result<()> {
        let authenticator =
            self.inner
                .options
                .authenticator
                .as_ref()
                .ok_or_else(|| ErrorKind::Authentication {
                    message: "the connection requires reauthentication but no authenticator was \
                              set"
                    .to_string(),
                })?;
        authenticator.reauthenticate(connection).await
    }

    /// Absorbs the cluster time, operation time and recovery token of a reply, returning the
    /// command error if the reply is `ok: 0`.
    fn parse_response(
        &self,
        session: &mut Option<&mut ClientSession>,
        is_sharded: bool,
        response: &RawCommandResponse,
    ) -> Result<()> {
        let raw_doc = RawDocument::from_bytes(response.raw.as_bytes())?;

        let ok = match raw_doc.get("ok")? {
            Some(b) => {
                crate::bson_util::get_int_raw(b).ok_or_else(|| ErrorKind::InvalidResponse {
                    message: format!("expected ok value to be a number, instead got {b:?}"),
                })?
            }
            None => {
                return Err(ErrorKind::InvalidResponse {
                    message: "missing 'ok' value in response".to_string(),
                }
                .into())
            }
        };

        let cluster_time: Option<ClusterTime> = raw_doc
            .get("$clusterTime")?
            .and_then(RawBsonRef::as_document)
            .map(|d| crate::bson::from_slice(d.as_bytes()))
            .transpose()?;
        if let Some(ref cluster_time) = cluster_time {
            self.inner.cluster_clock.advance(cluster_time);
            if let Some(ref mut session) = session {
                session.advance_cluster_time(cluster_time);
            }
        }

        if let (Some(session), Some(ts)) = (
            session.as_mut(),
            raw_doc
                .get("operationTime")?
                .and_then(RawBsonRef::as_timestamp),
        ) {
            session.advance_operation_time(ts);
        }

        if ok == 1 {
            if let Some(ref mut session) = session {
                if is_sharded && session.in_transaction() {
                    let recovery_token = raw_doc
                        .get("recoveryToken")?
                        .and_then(RawBsonRef::as_document)
                        .map(Document::try_from)
                        .transpose()?;
                    session.transaction.recovery_token = recovery_token;
                }
            }

            Ok(())
        } else {
            Err(response
                .body::<CommandErrorBody>()
                .map(|error_response| error_response.into())
                .unwrap_or_else(|e| {
                    Error::from(ErrorKind::InvalidResponse {
                        message: format!("error deserializing command error: {e}"),
                    })
                }))
        }
    }

    /// Returns the retryability level for the execution of this operation with the given session
    /// and connection stream description.
    fn get_retryability<T: Operation>(
        &self,
        op: &T,
        session: &Option<&mut ClientSession>,
        stream_description: &StreamDescription,
    ) -> Retryability {
        // commitTransaction and abortTransaction are always retried, regardless of the value of
        // retry_writes.
        if op.name() == CommitTransaction::NAME || op.name() == AbortTransaction::NAME {
            return Retryability::Write;
        }

        if session
            .as_ref()
            .is_some_and(|session| session.in_transaction())
        {
            return Retryability::None;
        }

        match op.retryability().with_options(&self.inner.options) {
            Retryability::Write if stream_description.supports_retryable_writes() => {
                Retryability::Write
            }
            Retryability::Read => Retryability::Read,
            _ => Retryability::None,
        }
    }

    /// The write concern sent with an operation: its own, or the client's for operations that
    /// accept one. Statements inside a transaction carry none.
    fn effective_write_concern<T: Operation>(
        &self,
        op: &T,
        in_transaction: bool,
    ) -> Option<WriteConcern> {
        if in_transaction {
            return None;
        }
        match op.write_concern() {
            Feature::Set(write_concern) => Some(write_concern.clone()),
            Feature::Inherit => self.inner.options.write_concern.clone(),
            Feature::NotSupported => None,
        }
        .filter(|write_concern| !write_concern.is_empty())
    }

    fn emit_command_event(&self, generate_event: impl FnOnce() -> CommandEvent) {
        let handler = self.inner.options.command_event_handler.as_ref();
        let tracing_enabled =
            tracing::enabled!(target: COMMAND_TRACING_EVENT_TARGET, tracing::Level::DEBUG);
        if handler.is_none() && !tracing_enabled {
            return;
        }

        let event = generate_event();
        if tracing_enabled {
            self.inner.tracing_emitter.handle(&event);
        }
        if let Some(handler) = handler {
            event.dispatch(handler.as_ref());
        }
    }
}

/// Sends `cmd` and reads the reply, failing with a timeout error once `deadline` passes. A send
/// abandoned mid-exchange leaves the connection broken.
async fn send_bounded(
    connection: &mut Connection,
    cmd: &Command,
    request_id: i32,
    deadline: Option<Instant>,
) -> Result<RawCommandResponse> {
    let send = connection.send_command(cmd, request_id);
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, send)
            .await
            .unwrap_or_else(|_| {
                Err(Error::timeout(
                    "the operation timed out while waiting for a reply",
                ))
            }),
        None => send.await,
    }
}

/// Replaces a command with the output of the encryption hook. Document sequences are folded into
/// the body first so the hook sees the whole command.
async fn encrypt_command(crypt: &dyn super::csfle::Crypt, cmd: Command) -> Result<Command> {
    let document = Message::from_command(&cmd, None)?.get_command_document();
    let raw = crate::bson::RawDocumentBuf::from_document(&document)?;
    let encrypted = crypt
        .encrypt(&cmd.target_db, &raw)
        .await
        .map_err(into_encryption_error)?;

    let mut encrypted_cmd = Command::new(cmd.name, cmd.target_db, encrypted.to_document()?);
    encrypted_cmd.legacy = cmd.legacy;
    Ok(encrypted_cmd)
}

fn into_encryption_error(error: Error) -> Error {
    match *error.kind {
        ErrorKind::Encryption { .. } => error,
        _ => Error::encryption(error.to_string()).with_source(error),
    }
}

/// The command as a single document, for monitoring.
fn command_document(cmd: &Command) -> Document {
    match Message::from_command(cmd, None) {
        Ok(message) => message.get_command_document(),
        Err(error) => doc! { "serialization error": error.to_string() },
    }
}

fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn is_write_failure(error: &Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::BulkWrite(_) | ErrorKind::Write(_)
    )
}

fn has_write_errors(error: &Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| !errors.is_empty()),
        ErrorKind::Write(WriteFailure::WriteError(_)) => true,
        _ => false,
    }
}

fn decide_for(
    attempt: u32,
    retryability: Retryability,
    class: ErrorClass,
    deadline: Option<Instant>,
    acknowledged: bool,
) -> RetryDecision {
    let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
    retry::decide(
        attempt,
        retryability,
        class,
        remaining,
        acknowledged,
        RetryMode::new(retryability, deadline.is_some()),
    )
}

fn final_error(decision: RetryDecision, retry: Option<ExecutionRetry>, latest: Error) -> Error {
    let first = retry.map(|r| r.first_error);
    match decision {
        RetryDecision::SurfaceOriginal => first.unwrap_or(latest),
        RetryDecision::TimedOut => retry::timed_out(latest),
        _ => retry::surfaced_error(first, latest),
    }
}

impl Error {
    /// Adds the necessary labels to this Error, and unpins the session if needed.
    ///
    /// A TransientTransactionError label should be added if a transaction is in progress and the
    /// error is a network or server selection error.
    ///
    /// On a pre-4.4 connection, a RetryableWriteError label should be added to any write-retryable
    /// error. On a 4.4+ connection, a label should only be added to network errors. Regardless of
    /// server version, a label should only be added if the `retry_writes` client option is not set
    /// to `false`, the operation during which the error occured is write-retryable, and a
    /// TransientTransactionError label has not already been added.
    ///
    /// If the TransientTransactionError or UnknownTransactionCommitResult labels are added, the
    /// ClientSession should be unpinned.
    fn add_labels_and_update_pin(
        &mut self,
        stream_description: Option<&StreamDescription>,
        session: &mut Option<&mut ClientSession>,
        retryability: Option<Retryability>,
    ) {
        let transaction_state = session.as_ref().map_or(&TransactionState::None, |session| {
            &session.transaction.state
        });
        let max_wire_version = stream_description.and_then(|sd| sd.max_wire_version);
        let server_type = stream_description.map(|sd| sd.initial_server_type);

        match transaction_state {
            TransactionState::Starting | TransactionState::InProgress => {
                if self.is_network_error() || self.is_server_selection_error() {
                    self.add_label(TRANSIENT_TRANSACTION_ERROR);
                }
            }
            TransactionState::Committed { .. } => {
                if let Some(max_wire_version) = max_wire_version {
                    if self.should_add_retryable_write_label(max_wire_version, server_type) {
                        self.add_label(RETRYABLE_WRITE_ERROR);
                    }
                }
                if self.should_add_unknown_transaction_commit_result_label() {
                    self.add_label(UNKNOWN_TRANSACTION_COMMIT_RESULT);
                }
            }
            TransactionState::Aborted => {
                if let Some(max_wire_version) = max_wire_version {
                    if self.should_add_retryable_write_label(max_wire_version, server_type) {
                        self.add_label(RETRYABLE_WRITE_ERROR);
                    }
                }
            }
            TransactionState::None => {
                if retryability == Some(Retryability::Write) {
                    if let Some(max_wire_version) = max_wire_version {
                        if self.should_add_retryable_write_label(max_wire_version, server_type) {
                            self.add_label(RETRYABLE_WRITE_ERROR);
                        }
                    }
                }
            }
        }

        if let Some(ref mut session) = session {
            if self.contains_label(TRANSIENT_TRANSACTION_ERROR)
                || self.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
            {
                session.transaction.unpin();
            }
        }
    }
}

/// What `execute_operation_on_connection` needs besides the operation and the connection.
struct OnConnection<'a> {
    txn_number: Option<i64>,
    retryability: Retryability,
    criteria: &'a SelectionCriteria,
    write_concern: Option<&'a WriteConcern>,
    deadline: Option<Instant>,
    cancellation: Option<&'a CancellationToken>,
    round_trip_time: Option<Duration>,
}

struct ExecutionDetails<T: Operation> {
    output: T::O,
    implicit_session: Option<ClientSession>,
}

#[derive(Debug)]
struct ExecutionRetry {
    prior_txn_number: Option<i64>,
    first_error: Error,
    first_server: ServerAddress,
}

impl ExecutionRetry {
    /// Records a failed attempt. Under a client timeout an operation can be retried more than
    /// once; the error of the very first attempt is the one kept.
    fn new(
        previous: Option<ExecutionRetry>,
        error: Error,
        server: ServerAddress,
        txn_number: Option<i64>,
    ) -> Self {
        match previous {
            Some(previous) => Self {
                prior_txn_number: previous.prior_txn_number.or(txn_number),
                first_error: previous.first_error,
                first_server: server,
            },
            None => Self {
                prior_txn_number: txn_number,
                first_error: error,
                first_server: server,
            },
        }
    }
}
