//! A single remote call and its completion state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use hazelcast_core::protocol::ClientMessage;
use hazelcast_core::{HazelcastError, Result};

use crate::connection::Connection;

/// Callback receiving the events of a listener registration.
pub type EventHandler = Arc<dyn Fn(ClientMessage) + Send + Sync>;

/// Where an invocation is sent.
#[derive(Clone, Default)]
pub enum InvocationTarget {
    /// Any connection picked by the load balancer.
    #[default]
    Any,
    /// This exact connection; failures on it are not retried elsewhere.
    Connection(Arc<Connection>),
    /// The current owner of this partition.
    Partition(i32),
    /// The member with this uuid.
    Member(Uuid),
}

impl std::fmt::Debug for InvocationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Connection(connection) => write!(f, "Connection({})", connection.id()),
            Self::Partition(id) => write!(f, "Partition({id})"),
            Self::Member(uuid) => write!(f, "Member({uuid})"),
        }
    }
}

/// A request together with how it should be sent.
///
/// ```
/// use hazelcast_client::invocation::Invocation;
/// use hazelcast_core::protocol::ClientMessage;
///
/// let invocation = Invocation::new(ClientMessage::new_request(0x010100)).on_partition(17);
/// assert_eq!(invocation.request().partition_id(), Some(17));
/// ```
pub struct Invocation {
    request: ClientMessage,
    target: InvocationTarget,
    urgent: bool,
    event_handler: Option<EventHandler>,
}

impl Invocation {
    /// Creates an invocation sent to any connection.
    pub fn new(request: ClientMessage) -> Self {
        Self {
            request,
            target: InvocationTarget::Any,
            urgent: false,
            event_handler: None,
        }
    }

    /// Pins the invocation to one connection.
    pub fn on_connection(mut self, connection: Arc<Connection>) -> Self {
        self.target = InvocationTarget::Connection(connection);
        self
    }

    /// Routes the invocation to the owner of `partition_id`.
    pub fn on_partition(mut self, partition_id: i32) -> Self {
        self.request.set_partition_id(partition_id);
        self.target = InvocationTarget::Partition(partition_id);
        self
    }

    /// Routes the invocation to the member with `member_uuid`.
    pub fn on_member(mut self, member_uuid: Uuid) -> Self {
        self.target = InvocationTarget::Member(member_uuid);
        self
    }

    /// Lets the invocation through before the client is initialized on the
    /// cluster. Used for the client's own housekeeping requests.
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Keeps the invocation registered after its response, delivering
    /// every event sent under its correlation id to `handler`.
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ClientMessage) + Send + Sync + 'static,
    {
        self.event_handler = Some(Arc::new(handler));
        self
    }

    /// Returns the request.
    pub fn request(&self) -> &ClientMessage {
        &self.request
    }

    /// Returns the target.
    pub fn target(&self) -> &InvocationTarget {
        &self.target
    }

    /// Returns true if the invocation bypasses admission control.
    pub fn is_urgent(&self) -> bool {
        self.urgent
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("message_type", &self.request.message_type())
            .field("target", &self.target)
            .field("urgent", &self.urgent)
            .field("event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Progress of an invocation through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationState {
    /// Picking a connection for the next attempt.
    Routing,
    /// Queued on a connection.
    Sent,
    /// Written to the socket; waiting for the response.
    AwaitingPrimary,
    /// Primary response received; waiting for backup acknowledgements.
    AwaitingBackups,
    /// Completed with a result or an error.
    Done,
}

#[derive(Debug)]
struct Progress {
    state: InvocationState,
    invoke_count: u32,
    attempt_ended: bool,
    sent_connection: Option<Arc<Connection>>,
    pending_response: Option<ClientMessage>,
    pending_response_received_at: Option<Instant>,
    backup_acks_expected: u8,
    backup_acks_received: u8,
}

/// Engine-side record of a submitted invocation.
pub(crate) struct InvocationRecord {
    correlation_id: i64,
    request: ClientMessage,
    target: InvocationTarget,
    urgent: bool,
    deadline: Instant,
    event_handler: Option<EventHandler>,
    progress: Mutex<Progress>,
    completion: Mutex<Option<oneshot::Sender<Result<ClientMessage>>>>,
}

impl InvocationRecord {
    pub(crate) fn new(
        invocation: Invocation,
        correlation_id: i64,
        timeout: Duration,
    ) -> (Arc<Self>, oneshot::Receiver<Result<ClientMessage>>) {
        let (sender, receiver) = oneshot::channel();
        let Invocation {
            mut request,
            target,
            urgent,
            event_handler,
        } = invocation;
        request.set_correlation_id(correlation_id);

        let record = Arc::new(Self {
            correlation_id,
            request,
            target,
            urgent,
            deadline: Instant::now() + timeout,
            event_handler,
            progress: Mutex::new(Progress {
                state: InvocationState::Routing,
                invoke_count: 0,
                attempt_ended: false,
                sent_connection: None,
                pending_response: None,
                pending_response_received_at: None,
                backup_acks_expected: 0,
                backup_acks_received: 0,
            }),
            completion: Mutex::new(Some(sender)),
        });
        (record, receiver)
    }

    pub(crate) fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    pub(crate) fn request(&self) -> &ClientMessage {
        &self.request
    }

    pub(crate) fn target(&self) -> &InvocationTarget {
        &self.target
    }

    pub(crate) fn is_urgent(&self) -> bool {
        self.urgent
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn event_handler(&self) -> Option<&EventHandler> {
        self.event_handler.as_ref()
    }

    pub(crate) fn state(&self) -> InvocationState {
        self.progress().state
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state() == InvocationState::Done
    }

    pub(crate) fn invoke_count(&self) -> u32 {
        self.progress().invoke_count
    }

    pub(crate) fn sent_connection(&self) -> Option<Arc<Connection>> {
        self.progress().sent_connection.clone()
    }

    /// Starts a new attempt and returns its number.
    pub(crate) fn begin_attempt(&self) -> u32 {
        let mut progress = self.progress();
        progress.invoke_count += 1;
        progress.attempt_ended = false;
        progress.sent_connection = None;
        progress.pending_response = None;
        progress.pending_response_received_at = None;
        progress.backup_acks_expected = 0;
        progress.backup_acks_received = 0;
        if progress.state != InvocationState::Done {
            progress.state = InvocationState::Routing;
        }
        progress.invoke_count
    }

    /// Ends `attempt` after a failure. Returns false if that attempt already
    /// ended, a newer attempt started, or the invocation is done, in which
    /// case the failure must be ignored.
    pub(crate) fn end_attempt(&self, attempt: u32) -> bool {
        let mut progress = self.progress();
        if progress.state == InvocationState::Done
            || progress.invoke_count != attempt
            || progress.attempt_ended
        {
            return false;
        }
        progress.attempt_ended = true;
        progress.sent_connection = None;
        progress.state = InvocationState::Routing;
        true
    }

    pub(crate) fn mark_sent(&self, connection: Arc<Connection>) {
        let mut progress = self.progress();
        if progress.state == InvocationState::Routing {
            progress.state = InvocationState::Sent;
            progress.sent_connection = Some(connection);
        }
    }

    pub(crate) fn mark_written(&self, attempt: u32) {
        let mut progress = self.progress();
        if progress.state == InvocationState::Sent && progress.invoke_count == attempt {
            progress.state = InvocationState::AwaitingPrimary;
        }
    }

    /// Records the primary response. Returns the message to complete with
    /// if no further backup acknowledgements are outstanding.
    pub(crate) fn on_primary_response(&self, response: ClientMessage) -> Option<ClientMessage> {
        let expected = response.number_of_backup_acks();
        let mut progress = self.progress();
        if progress.state == InvocationState::Done {
            return None;
        }
        if expected > progress.backup_acks_received {
            progress.state = InvocationState::AwaitingBackups;
            progress.backup_acks_expected = expected;
            progress.pending_response = Some(response);
            progress.pending_response_received_at = Some(Instant::now());
            return None;
        }
        Some(response)
    }

    /// Counts one backup acknowledgement. Returns the pending response once
    /// every expected acknowledgement arrived.
    pub(crate) fn on_backup_ack(&self) -> Option<ClientMessage> {
        let mut progress = self.progress();
        if progress.state == InvocationState::Done {
            return None;
        }
        progress.backup_acks_received = progress.backup_acks_received.saturating_add(1);
        if progress.pending_response.is_none()
            || progress.backup_acks_received != progress.backup_acks_expected
        {
            return None;
        }
        progress.pending_response.take()
    }

    /// Checks whether the backup acknowledgements are overdue. Returns the
    /// outcome to complete with once `timeout` has passed since the primary
    /// response: the primary response, or an error if indeterminate state
    /// must not be hidden.
    pub(crate) fn check_backup_timeout(
        &self,
        timeout: Duration,
        fail_on_indeterminate_state: bool,
    ) -> Option<Result<ClientMessage>> {
        let mut progress = self.progress();
        let received_at = progress.pending_response_received_at?;
        if progress.pending_response.is_none()
            || progress.backup_acks_expected == progress.backup_acks_received
            || received_at.elapsed() <= timeout
        {
            return None;
        }

        if fail_on_indeterminate_state {
            let expected = progress.backup_acks_expected;
            let received = progress.backup_acks_received;
            progress.pending_response = None;
            return Some(Err(HazelcastError::IndeterminateOperationState(format!(
                "invocation {} received {received} of {expected} backup acknowledgements within {timeout:?}",
                self.correlation_id
            ))));
        }
        progress.pending_response.take().map(Ok)
    }

    /// Completes the invocation. Only the first call has an effect; it
    /// returns true.
    pub(crate) fn complete(&self, result: Result<ClientMessage>) -> bool {
        let sender = self
            .completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(sender) = sender else {
            return false;
        };

        {
            let mut progress = self.progress();
            progress.state = InvocationState::Done;
            progress.sent_connection = None;
            progress.pending_response = None;
        }
        let _ = sender.send(result);
        true
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for InvocationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationRecord")
            .field("correlation_id", &self.correlation_id)
            .field("target", &self.target)
            .field("urgent", &self.urgent)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazelcast_core::protocol::constants::*;

    fn record() -> (Arc<InvocationRecord>, oneshot::Receiver<Result<ClientMessage>>) {
        InvocationRecord::new(
            Invocation::new(ClientMessage::new_request(CLIENT_PING)),
            5,
            Duration::from_secs(120),
        )
    }

    fn response(backup_acks: u8) -> ClientMessage {
        ClientMessage::create_for_response(CLIENT_PING_RESPONSE, 5, backup_acks)
    }

    #[test]
    fn test_record_assigns_correlation_id() {
        let (record, _rx) = record();
        assert_eq!(record.correlation_id(), 5);
        assert_eq!(record.request().correlation_id(), Some(5));
        assert_eq!(record.state(), InvocationState::Routing);
    }

    #[test]
    fn test_on_partition_sets_request_partition() {
        let invocation = Invocation::new(ClientMessage::new_request(CLIENT_PING)).on_partition(3);
        assert_eq!(invocation.request().partition_id(), Some(3));
        assert!(matches!(invocation.target(), InvocationTarget::Partition(3)));
        assert!(!invocation.is_urgent());
    }

    #[tokio::test]
    async fn test_complete_exactly_once() {
        let (record, rx) = record();
        assert!(record.complete(Ok(response(0))));
        assert!(!record.complete(Err(HazelcastError::Timeout("late".into()))));
        assert!(record.is_done());

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result.correlation_id(), Some(5));
    }

    #[test]
    fn test_response_without_backups_completes() {
        let (record, _rx) = record();
        assert!(record.on_primary_response(response(0)).is_some());
    }

    #[test]
    fn test_response_waits_for_backups() {
        let (record, _rx) = record();
        assert!(record.on_primary_response(response(2)).is_none());
        assert_eq!(record.state(), InvocationState::AwaitingBackups);
        assert!(record.on_backup_ack().is_none());
        assert!(record.on_backup_ack().is_some());
    }

    #[test]
    fn test_backups_before_primary() {
        let (record, _rx) = record();
        assert!(record.on_backup_ack().is_none());
        assert!(record.on_backup_ack().is_none());
        assert!(record.on_primary_response(response(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_timeout_completes_with_primary() {
        let (record, _rx) = record();
        record.on_primary_response(response(1));
        assert!(record
            .check_backup_timeout(Duration::from_secs(5), false)
            .is_none());

        tokio::time::advance(Duration::from_secs(6)).await;
        let outcome = record.check_backup_timeout(Duration::from_secs(5), false);
        assert!(matches!(outcome, Some(Ok(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backup_timeout_fails_when_configured() {
        let (record, _rx) = record();
        record.on_primary_response(response(1));

        tokio::time::advance(Duration::from_secs(6)).await;
        let outcome = record.check_backup_timeout(Duration::from_secs(5), true);
        assert!(matches!(
            outcome,
            Some(Err(HazelcastError::IndeterminateOperationState(_)))
        ));
    }

    #[test]
    fn test_attempt_ends_once() {
        let (record, _rx) = record();
        let attempt = record.begin_attempt();
        assert_eq!(attempt, 1);
        assert!(record.end_attempt(attempt));
        assert!(!record.end_attempt(attempt));

        let next = record.begin_attempt();
        assert!(!record.end_attempt(attempt));
        assert!(record.end_attempt(next));
        assert_eq!(record.invoke_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_attempt_forgets_pending_response() {
        let (record, _rx) = record();
        let first = record.begin_attempt();
        assert!(record.on_primary_response(response(1)).is_none());
        assert!(record.end_attempt(first));

        record.begin_attempt();
        assert_eq!(record.state(), InvocationState::Routing);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(record
            .check_backup_timeout(Duration::from_secs(5), false)
            .is_none());

        assert!(record.on_primary_response(response(1)).is_none());
        assert_eq!(record.state(), InvocationState::AwaitingBackups);
        assert!(record.on_backup_ack().is_some());
    }

    #[test]
    fn test_new_attempt_forgets_backup_acks() {
        let (record, _rx) = record();
        let first = record.begin_attempt();
        assert!(record.on_backup_ack().is_none());
        assert!(record.end_attempt(first));

        record.begin_attempt();
        assert!(record.on_primary_response(response(1)).is_none());
        assert!(record.on_backup_ack().is_some());
    }

    #[test]
    fn test_attempt_does_not_end_after_completion() {
        let (record, _rx) = record();
        let attempt = record.begin_attempt();
        record.complete(Ok(response(0)));
        assert!(!record.end_attempt(attempt));
    }
}
