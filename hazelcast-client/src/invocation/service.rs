//! Correlation, routing, retry and completion of invocations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use hazelcast_core::protocol::codecs::backup::decode_backup_event;
use hazelcast_core::protocol::codecs::error::decode_error_response;
use hazelcast_core::protocol::constants::{EXCEPTION_MESSAGE_TYPE, IS_BACKUP_AWARE_FLAG};
use hazelcast_core::protocol::ClientMessage;
use hazelcast_core::{HazelcastError, Result};

use super::classifier::{error_from_holders, ErrorClassifier};
use super::invocation::{Invocation, InvocationRecord, InvocationTarget};
use super::schema::SchemaService;
use crate::cluster::{LifecycleService, PartitionOracle};
use crate::config::ClientConfig;
use crate::connection::{ClientState, Connection, ConnectionRegistry};
use crate::runtime::PeriodicTask;

/// Retries issued without pausing before the retry pause applies.
const MAX_FAST_INVOCATION_COUNT: u32 = 5;

/// Response of a submitted invocation.
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: i64,
    receiver: oneshot::Receiver<Result<ClientMessage>>,
}

impl PendingResponse {
    /// Returns the correlation id assigned to the invocation.
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Waits for the invocation to complete.
    pub async fn response(self) -> Result<ClientMessage> {
        self.receiver.await.map_err(|_| {
            HazelcastError::ClientNotActive("invocation was abandoned".to_string())
        })?
    }
}

/// Sends invocations and matches responses to them.
///
/// Every invocation gets a correlation id from a counter starting at 1 and
/// completes exactly once: with its response, with an error, or with
/// `ClientNotActive` when the service shuts down.
#[derive(Debug)]
pub struct InvocationService {
    correlation_counter: AtomicI64,
    pending: Mutex<HashMap<i64, Arc<InvocationRecord>>>,
    event_handlers: Mutex<HashMap<i64, Arc<InvocationRecord>>>,
    registry: Arc<ConnectionRegistry>,
    partitions: Arc<dyn PartitionOracle>,
    lifecycle: Arc<LifecycleService>,
    schemas: Arc<dyn SchemaService>,
    classifier: Arc<dyn ErrorClassifier>,
    smart_routing: bool,
    redo_operation: bool,
    invocation_timeout: Duration,
    retry_pause: Duration,
    backup_acks_enabled: bool,
    backup_timeout: Duration,
    fail_on_indeterminate_state: bool,
    clean_resources_period: Duration,
    sweeper: Mutex<Option<PeriodicTask>>,
    shut_down: AtomicBool,
}

impl InvocationService {
    /// Creates the service. Call [`start`](Self::start) to run the sweep.
    pub fn new(
        config: &ClientConfig,
        registry: Arc<ConnectionRegistry>,
        partitions: Arc<dyn PartitionOracle>,
        lifecycle: Arc<LifecycleService>,
        schemas: Arc<dyn SchemaService>,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Arc<Self> {
        let network = config.network();
        let invocation = config.invocation();
        Arc::new(Self {
            correlation_counter: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(HashMap::new()),
            registry,
            partitions,
            lifecycle,
            schemas,
            classifier,
            smart_routing: network.smart_routing(),
            redo_operation: network.redo_operation(),
            invocation_timeout: invocation.invocation_timeout(),
            retry_pause: invocation.invocation_retry_pause(),
            backup_acks_enabled: network.smart_routing()
                && invocation.backup_ack_to_client_enabled(),
            backup_timeout: invocation.operation_backup_timeout(),
            fail_on_indeterminate_state: invocation.fail_on_indeterminate_operation_state(),
            clean_resources_period: invocation.clean_resources_period(),
            sweeper: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Starts the periodic sweep over pending invocations.
    pub fn start(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = PeriodicTask::spawn("invocation-sweep", self.clean_resources_period, move || {
            let weak = weak.clone();
            async move {
                if let Some(service) = weak.upgrade() {
                    service.clean_resources();
                }
            }
        });
        *self.sweeper.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    /// Returns true if requests ask members for backup acknowledgements.
    pub fn is_backup_ack_enabled(&self) -> bool {
        self.backup_acks_enabled
    }

    /// Returns the number of invocations waiting for completion.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns the number of registered event handlers.
    pub fn event_handler_count(&self) -> usize {
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Submits an invocation without waiting for it.
    pub fn submit(self: &Arc<Self>, invocation: Invocation) -> PendingResponse {
        let correlation_id = self.correlation_counter.fetch_add(1, Ordering::SeqCst);
        let (record, receiver) =
            InvocationRecord::new(invocation, correlation_id, self.invocation_timeout);

        if self.shut_down.load(Ordering::Acquire) {
            record.complete(Err(HazelcastError::ClientNotActive(
                "client is shut down".to_string(),
            )));
            return PendingResponse {
                correlation_id,
                receiver,
            };
        }

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(correlation_id, Arc::clone(&record));
        if record.event_handler().is_some() {
            self.event_handlers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(correlation_id, Arc::clone(&record));
        }

        self.do_invoke(record);
        PendingResponse {
            correlation_id,
            receiver,
        }
    }

    /// Sends an invocation and waits for its response.
    pub async fn invoke(self: &Arc<Self>, invocation: Invocation) -> Result<ClientMessage> {
        self.submit(invocation).response().await
    }

    /// Sends an invocation and decodes its response.
    ///
    /// If decoding needs a schema this client does not know, the schema is
    /// fetched and the response decoded again.
    pub async fn invoke_and_decode<T, F>(
        self: &Arc<Self>,
        invocation: Invocation,
        decode: F,
    ) -> Result<T>
    where
        F: Fn(&ClientMessage) -> Result<T>,
    {
        let response = self.invoke(invocation).await?;
        let mut fetched = HashSet::new();
        loop {
            match decode(&response) {
                Err(HazelcastError::SchemaNotFound { schema_id, message })
                    if fetched.insert(schema_id) =>
                {
                    tracing::debug!(schema_id, reason = %message, "fetching missing schema");
                    self.schemas.fetch_schema(schema_id).await?;
                }
                other => return other,
            }
        }
    }

    /// Stops delivering events to the handler registered under
    /// `correlation_id`. Returns false if no handler was registered.
    pub fn remove_event_handler(&self, correlation_id: i64) -> bool {
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&correlation_id)
            .is_some()
    }

    /// Handles a message read from `connection`.
    pub(crate) fn process_response(self: &Arc<Self>, connection: &Arc<Connection>, message: ClientMessage) {
        let Some(correlation_id) = message.correlation_id() else {
            tracing::warn!(connection = %connection.id(), "dropping message without correlation id");
            return;
        };

        if message.is_event() || message.is_backup_event() {
            let handler = self
                .event_handlers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&correlation_id)
                .and_then(|record| record.event_handler().cloned());
            match handler {
                Some(handler) => handler(message),
                None => tracing::debug!(
                    correlation_id,
                    connection = %connection.id(),
                    "no event handler for event"
                ),
            }
            return;
        }

        let record = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&correlation_id)
            .cloned();
        let Some(record) = record else {
            tracing::warn!(
                correlation_id,
                connection = %connection.id(),
                "no pending invocation for response"
            );
            return;
        };

        if message.message_type() == Some(EXCEPTION_MESSAGE_TYPE) {
            let error = match decode_error_response(&message) {
                Ok(holders) => error_from_holders(&holders),
                Err(e) => e,
            };
            let attempt = record.invoke_count();
            self.notify_error(record, attempt, error);
            return;
        }

        if let Some(response) = record.on_primary_response(message) {
            self.complete(&record, Ok(response));
        }
    }

    /// Handles a backup event payload: one backup of the invocation with
    /// `correlation_id` completed.
    pub fn notify_backup_complete(&self, correlation_id: i64) {
        let record = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&correlation_id)
            .cloned();
        match record {
            Some(record) => {
                if let Some(response) = record.on_backup_ack() {
                    self.complete(&record, Ok(response));
                }
            }
            None => tracing::debug!(correlation_id, "backup ack for unknown invocation"),
        }
    }

    /// Decodes a backup event and counts its acknowledgement.
    pub(crate) fn handle_backup_event(&self, event: &ClientMessage) {
        match decode_backup_event(event) {
            Ok(source) => self.notify_backup_complete(source),
            Err(e) => tracing::warn!(error = %e, "malformed backup event"),
        }
    }

    /// Fails every pending invocation with `ClientNotActive` and stops the
    /// sweep. Later calls have no effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(task) = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.cancel();
        }

        let records: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, record)| record)
            .collect();
        self.event_handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        tracing::debug!(pending = records.len(), "failing pending invocations on shutdown");
        for record in records {
            record.complete(Err(HazelcastError::ClientNotActive(
                "client is shutting down".to_string(),
            )));
        }
    }

    fn do_invoke(self: &Arc<Self>, record: Arc<InvocationRecord>) {
        if record.is_done() {
            return;
        }
        if self.shut_down.load(Ordering::Acquire) {
            self.complete(
                &record,
                Err(HazelcastError::ClientNotActive("client is shut down".to_string())),
            );
            return;
        }

        let attempt = record.begin_attempt();
        let admission = if record.is_urgent() {
            self.check_urgent_invocation_allowed(&record)
        } else {
            self.registry.check_if_invocation_allowed()
        };

        match admission.and_then(|()| self.route(&record)) {
            Ok(connection) => self.send(record, attempt, connection),
            Err(error) => self.notify_error(record, attempt, error),
        }
    }

    fn check_urgent_invocation_allowed(&self, record: &InvocationRecord) -> Result<()> {
        if self.registry.client_state() == ClientState::InitializedOnCluster {
            return Ok(());
        }
        if !self.schemas.has_schemas() {
            return Ok(());
        }
        if record.request().contains_serialized_data() {
            return Err(HazelcastError::InvocationMightContainCompactData(format!(
                "invocation {} might contain data whose schemas the cluster does not know yet",
                record.correlation_id()
            )));
        }
        Ok(())
    }

    fn route(&self, record: &InvocationRecord) -> Result<Arc<Connection>> {
        match record.target() {
            InvocationTarget::Connection(connection) => Ok(Arc::clone(connection)),
            _ if !self.smart_routing => self.random_connection(),
            InvocationTarget::Partition(partition_id) => {
                match self.partitions.partition_owner(*partition_id) {
                    Some(owner) => self.registry.get_connection(owner).ok_or_else(|| {
                        HazelcastError::Connection(format!(
                            "no connection to owner {owner} of partition {partition_id}"
                        ))
                    }),
                    None => {
                        tracing::trace!(partition_id, "partition owner unknown, using any connection");
                        self.random_connection()
                    }
                }
            }
            InvocationTarget::Member(uuid) => self.registry.get_connection(*uuid).ok_or_else(|| {
                HazelcastError::Connection(format!("no connection to member {uuid}"))
            }),
            InvocationTarget::Any => self.random_connection(),
        }
    }

    fn random_connection(&self) -> Result<Arc<Connection>> {
        self.registry
            .get_random_connection()
            .ok_or_else(|| HazelcastError::Connection("no connection found to cluster".to_string()))
    }

    fn send(self: &Arc<Self>, record: Arc<InvocationRecord>, attempt: u32, connection: Arc<Connection>) {
        let mut message = record.request().clone();
        if self.backup_acks_enabled {
            message.add_flags(IS_BACKUP_AWARE_FLAG);
        }

        record.mark_sent(Arc::clone(&connection));
        match connection.enqueue(message) {
            Ok(written) => {
                let service = Arc::clone(self);
                tokio::spawn(async move {
                    match written.await {
                        Ok(Ok(())) => record.mark_written(attempt),
                        Ok(Err(error)) => service.notify_error(record, attempt, error),
                        Err(_) => service.notify_error(
                            record,
                            attempt,
                            HazelcastError::Connection(format!(
                                "{} closed before the request was written",
                                connection.id()
                            )),
                        ),
                    }
                });
            }
            Err(error) => self.notify_error(record, attempt, error),
        }
    }

    fn notify_error(self: &Arc<Self>, record: Arc<InvocationRecord>, attempt: u32, error: HazelcastError) {
        if !record.end_attempt(attempt) {
            return;
        }

        if !self.lifecycle.is_running() {
            self.complete(
                &record,
                Err(HazelcastError::ClientNotActive(format!(
                    "client is shutting down, invocation failed with: {error}"
                ))),
            );
            return;
        }

        if !self.should_retry(&record, &error) {
            tracing::debug!(
                correlation_id = record.correlation_id(),
                error = %error,
                "invocation failed"
            );
            self.complete(&record, Err(error));
            return;
        }

        if Instant::now() > record.deadline() {
            self.complete(
                &record,
                Err(HazelcastError::Timeout(format!(
                    "invocation {} timed out after {:?} and {} attempts, last error: {error}",
                    record.correlation_id(),
                    self.invocation_timeout,
                    record.invoke_count()
                ))),
            );
            return;
        }

        tracing::debug!(
            correlation_id = record.correlation_id(),
            attempt,
            error = %error,
            "retrying invocation"
        );

        if record.invoke_count() < MAX_FAST_INVOCATION_COUNT {
            self.do_invoke(record);
        } else {
            let service = Arc::clone(self);
            let pause = self.retry_pause;
            tokio::spawn(async move {
                tokio::time::sleep(pause).await;
                service.do_invoke(record);
            });
        }
    }

    fn should_retry(&self, record: &InvocationRecord, error: &HazelcastError) -> bool {
        if matches!(error, HazelcastError::InvocationMightContainCompactData(_)) {
            return true;
        }

        let target_disconnected = matches!(error, HazelcastError::TargetDisconnected(_));
        match record.target() {
            InvocationTarget::Connection(_) if error.is_io() || target_disconnected => return false,
            InvocationTarget::Member(_) if matches!(error, HazelcastError::TargetNotMember(_)) => {
                return false
            }
            _ => {}
        }

        if self.classifier.is_retryable(error) {
            return true;
        }
        if target_disconnected {
            return record.request().is_retryable() || self.redo_operation;
        }
        false
    }

    fn complete(&self, record: &InvocationRecord, result: Result<ClientMessage>) {
        let failed = result.is_err();
        if !record.complete(result) {
            return;
        }
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&record.correlation_id());
        if failed {
            self.event_handlers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&record.correlation_id());
        }
    }

    fn clean_resources(self: &Arc<Self>) {
        let records: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        for record in records {
            if record.is_done() {
                continue;
            }

            if let Some(connection) = record.sent_connection() {
                if !connection.is_alive() {
                    let reason = connection
                        .closed_reason()
                        .unwrap_or_else(|| format!("{} is closed", connection.id()));
                    let attempt = record.invoke_count();
                    self.notify_error(record, attempt, HazelcastError::TargetDisconnected(reason));
                    continue;
                }
            }

            if self.backup_acks_enabled {
                if let Some(outcome) =
                    record.check_backup_timeout(self.backup_timeout, self.fail_on_indeterminate_state)
                {
                    tracing::warn!(
                        correlation_id = record.correlation_id(),
                        timeout = ?self.backup_timeout,
                        "backup acknowledgements not received in time"
                    );
                    self.complete(&record, outcome);
                }
            }
        }
    }
}
