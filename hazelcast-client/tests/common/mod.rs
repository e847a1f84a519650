//! A scripted cluster member for integration tests.
//!
//! The mock speaks just enough of the client protocol to authenticate a
//! client, answer pings and backup listener registrations, and answer other
//! requests the way the test tells it to.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use uuid::Uuid;

use hazelcast_client::{ClientConfig, ClientConfigBuilder};
use hazelcast_core::protocol::codecs::backup::{
    encode_backup_event, encode_backup_listener_response,
};
use hazelcast_core::protocol::codecs::error::encode_error_response;
use hazelcast_core::protocol::codecs::ping::encode_ping_response;
use hazelcast_core::protocol::codecs::{
    AuthenticationRequest, AuthenticationResponse, AuthenticationStatus, ErrorHolder,
};
use hazelcast_core::protocol::constants::{
    CLIENT_AUTHENTICATION, CLIENT_AUTHENTICATION_CUSTOM, CLIENT_LOCAL_BACKUP_LISTENER, CLIENT_PING,
    PROTOCOL_PREAMBLE,
};
use hazelcast_core::{ClientMessage, ClientMessageCodec};

/// How long tests wait for something the mock should observe.
pub const WAIT: Duration = Duration::from_secs(5);

/// How the mock answers requests other than its housekeeping ones.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with an empty response of the request's type.
    Echo,
    /// Respond, announcing this many backup acks still to come.
    WithBackups(u8),
    /// Respond with this server error.
    Error(ErrorHolder),
    /// Answer with this error for the next `n` requests, then echo.
    ErrorTimes(usize, ErrorHolder),
    /// Record the request without answering it.
    Silent,
}

/// Identity and authentication behaviour of the mock.
#[derive(Debug, Clone)]
pub struct MemberSettings {
    pub status: AuthenticationStatus,
    pub member_uuid: Uuid,
    pub cluster_id: Uuid,
    pub partition_count: i32,
    pub failover_supported: bool,
}

impl Default for MemberSettings {
    fn default() -> Self {
        Self {
            status: AuthenticationStatus::Authenticated,
            member_uuid: Uuid::new_v4(),
            cluster_id: Uuid::new_v4(),
            partition_count: 271,
            failover_supported: false,
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Message(ClientMessage),
    Close,
}

#[derive(Debug)]
struct PeerHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    backup_listener: Arc<Mutex<Option<i64>>>,
}

#[derive(Debug)]
struct Shared {
    member_uuid: Uuid,
    address: SocketAddr,
    settings: Mutex<MemberSettings>,
    reply: Mutex<Reply>,
    peers: Mutex<Vec<PeerHandle>>,
    requests: mpsc::UnboundedSender<ClientMessage>,
    auth_requests: Mutex<Vec<AuthenticationRequest>>,
    pings: AtomicUsize,
}

/// A mock member listening on a loopback port.
#[derive(Debug)]
pub struct MockMember {
    shared: Arc<Shared>,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<ClientMessage>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl MockMember {
    /// Starts a member that authenticates every client.
    pub async fn start() -> Self {
        Self::start_with(MemberSettings::default()).await
    }

    /// Starts a member with the given authentication behaviour.
    pub async fn start_with(settings: MemberSettings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            member_uuid: settings.member_uuid,
            address,
            settings: Mutex::new(settings),
            reply: Mutex::new(Reply::Echo),
            peers: Mutex::new(Vec::new()),
            requests: requests_tx,
            auth_requests: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
        });

        let acceptor = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        Self {
            shared,
            requests: tokio::sync::Mutex::new(requests_rx),
            acceptor: Mutex::new(Some(acceptor)),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.shared.address
    }

    pub fn member_uuid(&self) -> Uuid {
        self.shared.member_uuid
    }

    pub fn cluster_id(&self) -> Uuid {
        self.shared.settings.lock().unwrap().cluster_id
    }

    /// A client configuration pointing at this member only.
    pub fn config(&self) -> ClientConfigBuilder {
        ClientConfig::builder()
            .cluster_name("dev")
            .add_address(self.address())
            .connection_strategy(|s| {
                s.retry(|r| {
                    r.initial_backoff(Duration::from_millis(50))
                        .max_backoff(Duration::from_millis(200))
                        .cluster_connect_timeout(Duration::from_secs(2))
                })
            })
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.shared.reply.lock().unwrap() = reply;
    }

    pub fn set_status(&self, status: AuthenticationStatus) {
        self.shared.settings.lock().unwrap().status = status;
    }

    /// Waits for the next request that is not authentication, ping or
    /// backup listener registration.
    pub async fn next_request(&self) -> ClientMessage {
        let mut requests = self.requests.lock().await;
        tokio::time::timeout(WAIT, requests.recv())
            .await
            .expect("no request reached the member")
            .expect("member stopped")
    }

    pub fn authentications(&self) -> Vec<AuthenticationRequest> {
        self.shared.auth_requests.lock().unwrap().clone()
    }

    pub fn ping_count(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        let mut peers = self.shared.peers.lock().unwrap();
        peers.retain(|peer| !peer.outbound.is_closed());
        peers.len()
    }

    /// Sends a message to every connected client.
    pub fn send(&self, message: ClientMessage) {
        for peer in self.shared.peers.lock().unwrap().iter() {
            let _ = peer.outbound.send(Outbound::Message(message.clone()));
        }
    }

    /// Acknowledges one backup of the invocation with `correlation_id` over
    /// the backup listener of every connection.
    pub fn send_backup_ack(&self, correlation_id: i64) {
        for peer in self.shared.peers.lock().unwrap().iter() {
            if let Some(listener) = *peer.backup_listener.lock().unwrap() {
                let _ = peer
                    .outbound
                    .send(Outbound::Message(encode_backup_event(listener, correlation_id)));
            }
        }
    }

    /// Closes every client connection; new connections are still accepted.
    pub fn drop_connections(&self) {
        for peer in self.shared.peers.lock().unwrap().drain(..) {
            let _ = peer.outbound.send(Outbound::Close);
        }
    }

    /// Stops listening and closes every client connection.
    pub async fn stop(&self) {
        let acceptor = self.acceptor.lock().unwrap().take();
        if let Some(acceptor) = acceptor {
            acceptor.abort();
            let _ = acceptor.await;
        }
        self.drop_connections();
    }

    /// Waits until `condition` holds, polling every few milliseconds.
    pub async fn wait_until(&self, mut condition: impl FnMut(&Self) -> bool) {
        tokio::time::timeout(WAIT, async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }
}

impl Drop for MockMember {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.lock().unwrap().take() {
            acceptor.abort();
        }
        self.drop_connections();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while let Ok((stream, _)) = listener.accept().await {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let backup_listener = Arc::new(Mutex::new(None));
        shared.peers.lock().unwrap().push(PeerHandle {
            outbound,
            backup_listener: Arc::clone(&backup_listener),
        });
        tokio::spawn(serve(stream, Arc::clone(&shared), outbound_rx, backup_listener));
    }
}

async fn serve(
    mut stream: TcpStream,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    backup_listener: Arc<Mutex<Option<i64>>>,
) {
    let mut preamble = [0u8; 3];
    if stream.read_exact(&mut preamble).await.is_err() || &preamble != PROTOCOL_PREAMBLE {
        return;
    }

    let mut framed = Framed::new(stream, ClientMessageCodec::new());
    loop {
        tokio::select! {
            incoming = framed.next() => {
                let Some(Ok(request)) = incoming else { break };
                if let Some(response) = answer(&shared, &backup_listener, request) {
                    if framed.send(response).await.is_err() {
                        break;
                    }
                }
            }
            command = outbound.recv() => match command {
                Some(Outbound::Message(message)) => {
                    if framed.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => break,
            }
        }
    }
}

fn answer(
    shared: &Shared,
    backup_listener: &Mutex<Option<i64>>,
    request: ClientMessage,
) -> Option<ClientMessage> {
    let message_type = request.message_type()?;
    let correlation_id = request.correlation_id()?;

    match message_type {
        CLIENT_AUTHENTICATION | CLIENT_AUTHENTICATION_CUSTOM => {
            if let Ok(decoded) = AuthenticationRequest::decode(&request) {
                shared.auth_requests.lock().unwrap().push(decoded);
            }
            let settings = shared.settings.lock().unwrap().clone();
            let response = AuthenticationResponse {
                status: settings.status,
                address: Some((shared.address.ip().to_string(), shared.address.port())),
                member_uuid: Some(shared.member_uuid),
                serialization_version: 1,
                server_version: "5.3.0".to_string(),
                partition_count: settings.partition_count,
                cluster_id: settings.cluster_id,
                failover_supported: settings.failover_supported,
            };
            Some(response.encode(correlation_id))
        }
        CLIENT_PING => {
            shared.pings.fetch_add(1, Ordering::SeqCst);
            Some(encode_ping_response(correlation_id))
        }
        CLIENT_LOCAL_BACKUP_LISTENER => {
            *backup_listener.lock().unwrap() = Some(correlation_id);
            Some(encode_backup_listener_response(correlation_id, Uuid::new_v4()))
        }
        _ => {
            let _ = shared.requests.send(request);
            let mut reply = shared.reply.lock().unwrap();
            match &mut *reply {
                Reply::Echo => Some(ClientMessage::create_for_response(message_type + 1, correlation_id, 0)),
                Reply::WithBackups(acks) => Some(ClientMessage::create_for_response(
                    message_type + 1,
                    correlation_id,
                    *acks,
                )),
                Reply::Error(holder) => Some(encode_error_response(correlation_id, &[holder.clone()])),
                Reply::ErrorTimes(remaining, holder) => {
                    let response = encode_error_response(correlation_id, &[holder.clone()]);
                    *remaining -= 1;
                    if *remaining == 0 {
                        *reply = Reply::Echo;
                    }
                    Some(response)
                }
                Reply::Silent => None,
            }
        }
    }
}

/// A request of a message type the mock has no special handling for.
pub fn request() -> ClientMessage {
    ClientMessage::new_request(0x010100)
}
