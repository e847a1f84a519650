//! Single connection to a Hazelcast cluster member.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use hazelcast_core::protocol::{ClientMessage, ClientMessageCodec, FragmentAssembler};
use hazelcast_core::{HazelcastError, Result};

/// Identifier of a connection, unique within one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives what a connection reads and learns when it closes.
///
/// Connections only hold a weak reference to their handler.
pub(crate) trait ConnectionHandler: Send + Sync {
    /// Called for every complete message read from the connection.
    fn handle_message(&self, connection: &Arc<Connection>, message: ClientMessage);

    /// Called exactly once, after the connection stopped being alive.
    fn connection_closed(&self, connection: &Arc<Connection>);
}

struct WriteRequest {
    message: ClientMessage,
    ack: oneshot::Sender<Result<()>>,
}

/// An open transport to one cluster member.
///
/// Reading and writing happen on two background tasks; the connection
/// itself is shared by the registry and by the invocations sent over it.
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    member_uuid: OnceLock<Uuid>,
    cluster_id: OnceLock<Uuid>,
    alive: AtomicBool,
    closed_reason: Mutex<Option<String>>,
    created_at: Instant,
    last_read_at: Mutex<Instant>,
    last_write_at: Mutex<Instant>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    writer: mpsc::UnboundedSender<WriteRequest>,
    shutdown: watch::Sender<bool>,
    handler: Weak<dyn ConnectionHandler>,
    self_ref: Weak<Connection>,
}

impl Connection {
    /// Wraps an established stream and starts its reader and writer tasks.
    ///
    /// The protocol preamble must already have been written.
    pub(crate) fn spawn<S>(
        id: ConnectionId,
        address: SocketAddr,
        stream: S,
        handler: Weak<dyn ConnectionHandler>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, write_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let now = Instant::now();

        let connection = Arc::new_cyclic(|self_ref| Self {
            id,
            address,
            member_uuid: OnceLock::new(),
            cluster_id: OnceLock::new(),
            alive: AtomicBool::new(true),
            closed_reason: Mutex::new(None),
            created_at: now,
            last_read_at: Mutex::new(now),
            last_write_at: Mutex::new(now),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            writer,
            shutdown,
            handler,
            self_ref: self_ref.clone(),
        });

        tokio::spawn(run_writer(
            Arc::clone(&connection),
            write_half,
            write_rx,
            connection.shutdown.subscribe(),
        ));
        tokio::spawn(run_reader(
            Arc::clone(&connection),
            read_half,
            connection.shutdown.subscribe(),
        ));

        connection
    }

    /// Returns the connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the address this connection was opened to.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the uuid of the member on the other side, once authenticated.
    pub fn member_uuid(&self) -> Option<Uuid> {
        self.member_uuid.get().copied()
    }

    /// Returns the id of the cluster the member belongs to, once authenticated.
    pub fn cluster_id(&self) -> Option<Uuid> {
        self.cluster_id.get().copied()
    }

    pub(crate) fn set_remote_identity(&self, member_uuid: Uuid, cluster_id: Uuid) {
        let _ = self.member_uuid.set(member_uuid);
        let _ = self.cluster_id.set(cluster_id);
    }

    /// Returns true until the connection is closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns why the connection was closed.
    pub fn closed_reason(&self) -> Option<String> {
        self.closed_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns when the connection was opened.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when a message was last read.
    pub fn last_read_at(&self) -> Instant {
        *self.last_read_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns when a message was last written.
    pub fn last_write_at(&self) -> Instant {
        *self.last_write_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Writes a message and waits until it has been flushed to the socket.
    pub async fn write(&self, message: ClientMessage) -> Result<()> {
        let done = self.enqueue(message)?;
        done.await.map_err(|_| self.closed_error())?
    }

    /// Queues a message for writing and returns the flush acknowledgement.
    ///
    /// Messages are written in the order they were queued.
    pub(crate) fn enqueue(&self, message: ClientMessage) -> Result<oneshot::Receiver<Result<()>>> {
        if !self.is_alive() {
            return Err(self.closed_error());
        }

        let (ack, done) = oneshot::channel();
        self.writer
            .send(WriteRequest { message, ack })
            .map_err(|_| self.closed_error())?;
        Ok(done)
    }

    /// Closes the connection. Only the first call has an effect.
    pub fn close(&self, reason: &str) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        *self.closed_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.to_string());
        let _ = self.shutdown.send(true);

        tracing::info!(
            connection = %self.id,
            address = %self.address,
            member = ?self.member_uuid(),
            reason = reason,
            "connection closed"
        );

        if let (Some(handler), Some(connection)) = (self.handler.upgrade(), self.self_ref.upgrade()) {
            handler.connection_closed(&connection);
        }
    }

    fn closed_error(&self) -> HazelcastError {
        HazelcastError::Connection(format!(
            "{} to {} is closed: {}",
            self.id,
            self.address,
            self.closed_reason().unwrap_or_else(|| "unknown reason".to_string())
        ))
    }

    fn touch_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.last_read_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn touch_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.last_write_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("member_uuid", &self.member_uuid())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection[{}, address={}", self.id, self.address)?;
        if let Some(uuid) = self.member_uuid() {
            write!(f, ", member={uuid}")?;
        }
        write!(f, ", alive={}]", self.is_alive())
    }
}

async fn run_writer<W>(
    connection: Arc<Connection>,
    write_half: W,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Send + Unpin,
{
    let mut sink = FramedWrite::new(write_half, ClientMessageCodec::new());

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(WriteRequest { message, ack }) = request else { break };
                let size = message.wire_size();
                match sink.send(message).await {
                    Ok(()) => {
                        connection.touch_write(size);
                        let _ = ack.send(Ok(()));
                    }
                    Err(e) => {
                        let reason = format!("failed to write to {}: {e}", connection.address);
                        let _ = ack.send(Err(HazelcastError::Connection(reason.clone())));
                        connection.close(&reason);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    requests.close();
    while let Ok(WriteRequest { ack, .. }) = requests.try_recv() {
        let _ = ack.send(Err(connection.closed_error()));
    }
}

async fn run_reader<R>(connection: Arc<Connection>, read_half: R, mut shutdown: watch::Receiver<bool>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut frames = FramedRead::new(read_half, ClientMessageCodec::new());
    let mut assembler = FragmentAssembler::new();

    loop {
        tokio::select! {
            next = frames.next() => match next {
                Some(Ok(message)) => {
                    connection.touch_read(message.wire_size());
                    let Some(message) = assembler.accept(message) else { continue };
                    match connection.handler.upgrade() {
                        Some(handler) => handler.handle_message(&connection, message),
                        None => break,
                    }
                }
                Some(Err(e)) => {
                    connection.close(&format!("failed to read from {}: {e}", connection.address));
                    break;
                }
                None => {
                    connection.close("Connection closed by the other side");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hazelcast_core::protocol::constants::*;
    use tokio::io::DuplexStream;
    use tokio::time::{timeout, Duration};
    use tokio_util::codec::Framed;

    /// Records what connections deliver.
    #[derive(Default)]
    pub(crate) struct RecordingHandler {
        pub(crate) messages: Mutex<Vec<ClientMessage>>,
        pub(crate) closed: Mutex<Vec<ConnectionId>>,
    }

    impl ConnectionHandler for RecordingHandler {
        fn handle_message(&self, _connection: &Arc<Connection>, message: ClientMessage) {
            self.messages.lock().unwrap().push(message);
        }

        fn connection_closed(&self, connection: &Arc<Connection>) {
            self.closed.lock().unwrap().push(connection.id());
        }
    }

    pub(crate) fn test_connection(
        handler: &Arc<RecordingHandler>,
    ) -> (Arc<Connection>, Framed<DuplexStream, ClientMessageCodec>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let weak: Weak<dyn ConnectionHandler> = {
            let dyn_handler: Arc<dyn ConnectionHandler> = handler.clone();
            Arc::downgrade(&dyn_handler)
        };
        let connection = Connection::spawn(
            ConnectionId::new(1),
            "127.0.0.1:5701".parse().unwrap(),
            client,
            weak,
        );
        (connection, Framed::new(server, ClientMessageCodec::new()))
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(42);
        assert_eq!(id.to_string(), "conn-42");
        assert_eq!(id.value(), 42);
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let handler = Arc::new(RecordingHandler::default());
        let (connection, mut peer) = test_connection(&handler);

        let mut request = ClientMessage::new_request(CLIENT_PING);
        request.set_correlation_id(7);
        connection.write(request).await.unwrap();

        let received = peer.next().await.unwrap().unwrap();
        assert_eq!(received.message_type(), Some(CLIENT_PING));
        assert_eq!(received.correlation_id(), Some(7));
        assert!(connection.bytes_written() > 0);
    }

    #[tokio::test]
    async fn test_incoming_messages_are_dispatched() {
        let handler = Arc::new(RecordingHandler::default());
        let (connection, mut peer) = test_connection(&handler);
        let before = connection.last_read_at();

        peer.send(ClientMessage::create_for_response(CLIENT_PING_RESPONSE, 3, 0))
            .await
            .unwrap();

        wait_until(|| handler.messages.lock().unwrap().len() == 1).await;
        let messages = handler.messages.lock().unwrap();
        assert_eq!(messages[0].correlation_id(), Some(3));
        assert!(connection.bytes_read() > 0);
        assert!(connection.last_read_at() >= before);
    }

    #[tokio::test]
    async fn test_peer_close_closes_connection_once() {
        let handler = Arc::new(RecordingHandler::default());
        let (connection, peer) = test_connection(&handler);

        drop(peer);
        wait_until(|| !connection.is_alive()).await;
        wait_until(|| handler.closed.lock().unwrap().len() == 1).await;

        assert_eq!(
            connection.closed_reason().as_deref(),
            Some("Connection closed by the other side")
        );
        connection.close("again");
        assert_eq!(handler.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let handler = Arc::new(RecordingHandler::default());
        let (connection, _peer) = test_connection(&handler);

        connection.close("explicit");
        let err = connection
            .write(ClientMessage::new_request(CLIENT_PING))
            .await
            .unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("explicit"));
    }

    #[tokio::test]
    async fn test_remote_identity_set_once() {
        let handler = Arc::new(RecordingHandler::default());
        let (connection, _peer) = test_connection(&handler);
        let member = Uuid::new_v4();
        let cluster = Uuid::new_v4();

        assert_eq!(connection.member_uuid(), None);
        connection.set_remote_identity(member, cluster);
        connection.set_remote_identity(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(connection.member_uuid(), Some(member));
        assert_eq!(connection.cluster_id(), Some(cluster));
        assert!(connection.to_string().contains(&member.to_string()));
    }

    #[test]
    fn test_connection_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
    }
}
