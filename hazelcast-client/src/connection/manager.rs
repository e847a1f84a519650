//! Cluster connection establishment, authentication and reconnection.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use rand::seq::SliceRandom;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::instrument;
use uuid::Uuid;

use hazelcast_core::protocol::codecs::backup::{
    decode_backup_listener_response, encode_backup_listener_request,
};
use hazelcast_core::protocol::codecs::{
    AuthenticationRequest, AuthenticationResponse, AuthenticationStatus,
};
use hazelcast_core::protocol::constants::{
    CLIENT_TYPE, CLIENT_VERSION, PROTOCOL_PREAMBLE, SERIALIZATION_VERSION,
};
use hazelcast_core::{ClientMessage, HazelcastError, Result};

use super::connection::{Connection, ConnectionHandler, ConnectionId};
use super::heartbeat::spawn_heartbeat;
use super::registry::{ClientState, ConnectionRegistry};
use super::wait_strategy::WaitStrategy;
use crate::cluster::{
    CandidateClusterContext, ClusterFailoverService, LifecycleService, MemberDirectory,
    MemberList, PartitionTable,
};
use crate::config::{ClientConfig, ReconnectMode};
use crate::invocation::{ErrorClassifier, Invocation, InvocationService, SchemaService};
use crate::listener::{LifecycleEvent, MemberEventType};
use crate::runtime::PeriodicTask;

/// Period of the task that connects to known members without a connection.
const CONNECT_TO_MEMBERS_PERIOD: Duration = Duration::from_secs(1);

type PendingConnection = Shared<BoxFuture<'static, Result<Arc<Connection>>>>;

/// Events emitted when authenticated connections come and go.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection authenticated and was registered.
    Added {
        /// The connection identifier.
        id: ConnectionId,
        /// The address of the connected member.
        address: SocketAddr,
        /// The identity of the connected member.
        member_uuid: Uuid,
    },
    /// A registered connection was closed.
    Removed {
        /// The connection identifier.
        id: ConnectionId,
        /// The address of the member.
        address: SocketAddr,
        /// The identity of the member.
        member_uuid: Uuid,
        /// Why the connection was closed.
        reason: Option<String>,
    },
}

/// Services the connection manager drives while connecting.
#[derive(Debug, Clone)]
pub struct ClusterServices {
    /// Live connections and the client state.
    pub registry: Arc<ConnectionRegistry>,
    /// Known cluster members.
    pub members: Arc<MemberList>,
    /// Partition ownership.
    pub partitions: Arc<PartitionTable>,
    /// Client lifecycle.
    pub lifecycle: Arc<LifecycleService>,
    /// Invocation engine used for authentication, pings and listeners.
    pub invocations: Arc<InvocationService>,
    /// Schemas pushed to a newly joined cluster.
    pub schemas: Arc<dyn SchemaService>,
    /// Decides which connect failures end the attempt on a cluster.
    pub classifier: Arc<dyn ErrorClassifier>,
}

/// Connects the client to a cluster and keeps it connected.
///
/// The manager is the only component that opens connections and changes
/// the client state. Connections refer back to it through a weak handle.
pub struct ConnectionManager {
    self_ref: Weak<ConnectionManager>,
    client_uuid: Uuid,
    client_name: String,
    labels: Vec<String>,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    smart_routing: bool,
    async_start: bool,
    reconnect_mode: ReconnectMode,
    shuffle_member_list: bool,
    failover_enabled: bool,
    failover: ClusterFailoverService,
    wait_strategy: tokio::sync::Mutex<WaitStrategy>,
    services: ClusterServices,
    connection_ids: AtomicU64,
    pending: Mutex<HashMap<SocketAddr, PendingConnection>>,
    cluster_id: Mutex<Option<Uuid>>,
    backup_listeners: Mutex<HashMap<ConnectionId, i64>>,
    active: AtomicBool,
    switching_cluster: AtomicBool,
    reconnecting: AtomicBool,
    events: broadcast::Sender<ConnectionEvent>,
    tasks: Mutex<Vec<PeriodicTask>>,
    member_watch: Mutex<Option<JoinHandle<()>>>,
    shutdown: OnceCell<()>,
}

impl ConnectionManager {
    /// Creates a connection manager. `config` supplies the settings shared by
    /// every candidate cluster.
    pub fn new(
        config: &ClientConfig,
        client_name: impl Into<String>,
        failover: ClusterFailoverService,
        failover_enabled: bool,
        services: ClusterServices,
    ) -> Arc<Self> {
        let network = config.network();
        let strategy = config.connection_strategy();
        let (events, _) = broadcast::channel(64);

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            client_uuid: Uuid::new_v4(),
            client_name: client_name.into(),
            labels: config.labels().to_vec(),
            connection_timeout: network.connection_timeout(),
            heartbeat_interval: network.heartbeat_interval(),
            heartbeat_timeout: network.heartbeat_timeout(),
            smart_routing: network.smart_routing(),
            async_start: strategy.async_start(),
            reconnect_mode: strategy.reconnect_mode(),
            shuffle_member_list: config.shuffle_member_list(),
            failover_enabled,
            failover,
            wait_strategy: tokio::sync::Mutex::new(WaitStrategy::from_config(
                strategy.retry(),
                failover_enabled,
            )),
            services,
            connection_ids: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            cluster_id: Mutex::new(None),
            backup_listeners: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
            switching_cluster: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            events,
            tasks: Mutex::new(Vec::new()),
            member_watch: Mutex::new(None),
            shutdown: OnceCell::new(),
        })
    }

    /// Returns the identity this client presents to the cluster.
    pub fn client_uuid(&self) -> Uuid {
        self.client_uuid
    }

    /// Returns the display name of this client.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Returns the identity of the cluster the client is connected to.
    pub fn cluster_id(&self) -> Option<Uuid> {
        *self.cluster_id.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns true between start and shutdown.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Subscribes to connection added/removed events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Starts the background tasks and connects to the cluster.
    ///
    /// With async start the cluster connection is made in the background and
    /// this returns immediately.
    #[instrument(
        name = "connection_manager.start",
        skip(self),
        fields(client = %self.client_name)
    )]
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.spawn_member_watch();
        let mut tasks = vec![spawn_heartbeat(
            Arc::clone(&self.services.registry),
            Arc::downgrade(&self.services.invocations),
            self.heartbeat_interval,
            self.heartbeat_timeout,
        )];
        if self.smart_routing {
            let weak = self.self_ref.clone();
            tasks.push(PeriodicTask::spawn(
                "connect-to-members",
                CONNECT_TO_MEMBERS_PERIOD,
                move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(manager) = weak.upgrade() {
                            manager.connect_to_all_members();
                        }
                    }
                },
            ));
        }
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(tasks);

        if self.async_start {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = manager.connect_to_cluster().await {
                    tracing::error!(error = %e, "unable to connect to any cluster, shutting down");
                    manager.shutdown().await;
                }
            });
            return Ok(());
        }

        self.connect_to_cluster().await
    }

    /// Connects to the current candidate cluster, then walks the remaining
    /// candidates until one accepts the client.
    #[instrument(name = "connection_manager.connect_to_cluster", skip(self))]
    pub async fn connect_to_cluster(self: &Arc<Self>) -> Result<()> {
        let current = self.failover.current();
        match self.connect_to_candidate(&current).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(cluster = current.cluster_name(), error = %e, "stopped trying on cluster");
            }
        }

        let connected = self
            .failover
            .try_next_cluster(|candidate| {
                let manager = Arc::clone(self);
                async move { manager.switch_to_candidate(candidate).await }
            })
            .await;

        if connected {
            return Ok(());
        }
        if !self.services.lifecycle.is_running() || !self.is_active() {
            return Err(HazelcastError::ClientNotActive(
                "client is shut down while connecting to the cluster".to_string(),
            ));
        }
        Err(HazelcastError::IllegalState(
            "unable to connect to any cluster".to_string(),
        ))
    }

    async fn switch_to_candidate(self: &Arc<Self>, candidate: CandidateClusterContext) -> bool {
        self.switching_cluster.store(true, Ordering::Release);
        for connection in self.services.registry.get_connections() {
            connection.close("client is switching to the next cluster");
        }
        self.services.members.reset();
        self.services.partitions.reset();

        let result = self.connect_to_candidate(&candidate).await;
        self.switching_cluster.store(false, Ordering::Release);

        match result {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(cluster = candidate.cluster_name(), error = %e, "stopped trying on cluster");
                false
            }
        }
    }

    /// Tries known members and provider addresses until one connects or the
    /// wait strategy gives up. Errors abort the attempt on this cluster.
    async fn connect_to_candidate(
        self: &Arc<Self>,
        candidate: &CandidateClusterContext,
    ) -> Result<bool> {
        let mut wait = self.wait_strategy.lock().await;
        wait.reset();
        tracing::info!(cluster = candidate.cluster_name(), "trying to connect to cluster");

        loop {
            let mut tried = HashSet::new();

            let mut members = self.services.members.members();
            if self.shuffle_member_list {
                members.shuffle(&mut rand::thread_rng());
            }
            for member in members {
                self.check_running()?;
                tried.insert(member.address());
                if self.try_connect(candidate, member.address()).await? {
                    return Ok(true);
                }
            }

            let addresses = self.load_addresses(candidate).await;
            for address in addresses {
                if !tried.insert(address) {
                    continue;
                }
                self.check_running()?;
                if self.try_connect(candidate, address).await? {
                    return Ok(true);
                }
            }

            self.check_running()?;
            if !wait.sleep().await {
                tracing::warn!(
                    cluster = candidate.cluster_name(),
                    tried = ?tried,
                    "unable to connect to any address of cluster"
                );
                return Ok(false);
            }
        }
    }

    async fn load_addresses(&self, candidate: &CandidateClusterContext) -> Vec<SocketAddr> {
        match candidate.address_provider().load_addresses().await {
            Ok(addresses) => addresses.into_ordered(self.shuffle_member_list),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load cluster addresses");
                Vec::new()
            }
        }
    }

    /// Returns `Ok(false)` if the address failed but the cluster may still
    /// accept the client on another one.
    async fn try_connect(
        self: &Arc<Self>,
        candidate: &CandidateClusterContext,
        address: SocketAddr,
    ) -> Result<bool> {
        match self.get_or_connect(candidate, address).await {
            Ok(_) => Ok(true),
            Err(e) if self.services.classifier.is_fatal_for_cluster(&e) => Err(e),
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "failed to connect to address");
                Ok(false)
            }
        }
    }

    fn check_running(&self) -> Result<()> {
        if self.is_active() && self.services.lifecycle.is_running() {
            return Ok(());
        }
        Err(HazelcastError::ClientNotActive(
            "client is not active, giving up on connecting".to_string(),
        ))
    }

    /// Returns the connection to `address`, joining an in-flight attempt to
    /// the same address if there is one.
    async fn get_or_connect(
        self: &Arc<Self>,
        candidate: &CandidateClusterContext,
        address: SocketAddr,
    ) -> Result<Arc<Connection>> {
        let translated = candidate
            .address_provider()
            .translate(address)
            .await?
            .ok_or_else(|| {
                HazelcastError::Connection(format!(
                    "address provider could not translate address {address}"
                ))
            })?;

        if let Some(existing) = self
            .services
            .registry
            .get_connections()
            .into_iter()
            .find(|c| c.address() == translated && c.is_alive())
        {
            return Ok(existing);
        }

        let attempt = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending
                .entry(translated)
                .or_insert_with(|| {
                    let manager = Arc::clone(self);
                    async move {
                        let result = Arc::clone(&manager).connect(translated).await;
                        manager
                            .pending
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .remove(&translated);
                        result
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };
        attempt.await
    }

    #[instrument(
        name = "connection_manager.connect",
        skip(self),
        fields(address = %address)
    )]
    async fn connect(self: Arc<Self>, address: SocketAddr) -> Result<Arc<Connection>> {
        tracing::debug!(timeout = ?self.connection_timeout, "opening connection");
        let mut stream = timeout(self.connection_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                HazelcastError::Timeout(format!(
                    "connection to {address} timed out after {:?}",
                    self.connection_timeout
                ))
            })??;
        stream.set_nodelay(true)?;
        stream.write_all(PROTOCOL_PREAMBLE).await?;

        let id = ConnectionId::new(self.connection_ids.fetch_add(1, Ordering::Relaxed) + 1);
        let handler: Weak<dyn ConnectionHandler> = self.self_ref.clone();
        let connection = Connection::spawn(id, address, stream, handler);

        let outcome = match self.authenticate(&connection).await {
            Ok(response) => self.on_authenticated(&connection, response),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Registered::Existing(existing)) => Ok(existing),
            Ok(Registered::New { initialize }) => {
                if let Some(cluster_id) = initialize {
                    self.initialize_on_cluster(cluster_id).await;
                }
                Ok(connection)
            }
            Err(e) => {
                connection.close(&format!("failed to authenticate: {e}"));
                Err(e)
            }
        }
    }

    async fn authenticate(&self, connection: &Arc<Connection>) -> Result<AuthenticationResponse> {
        let candidate = self.failover.current();
        let request = AuthenticationRequest {
            cluster_name: candidate.cluster_name().to_string(),
            credentials: candidate.credentials(),
            client_uuid: self.client_uuid,
            client_type: CLIENT_TYPE.to_string(),
            serialization_version: SERIALIZATION_VERSION,
            client_version: CLIENT_VERSION.to_string(),
            client_name: self.client_name.clone(),
            labels: self.labels.clone(),
        };
        let invocation = Invocation::new(request.encode())
            .on_connection(Arc::clone(connection))
            .urgent();

        let response = timeout(
            self.heartbeat_timeout,
            self.services.invocations.invoke(invocation),
        )
        .await
        .map_err(|_| {
            HazelcastError::Timeout(format!(
                "authentication at {} timed out after {:?}",
                connection.address(),
                self.heartbeat_timeout
            ))
        })??;

        let response = AuthenticationResponse::decode(&response)?;
        check_authentication_status(&response, self.failover_enabled)?;
        Ok(response)
    }

    fn on_authenticated(
        &self,
        connection: &Arc<Connection>,
        response: AuthenticationResponse,
    ) -> Result<Registered> {
        if !self.is_active() {
            return Err(HazelcastError::ClientNotActive(
                "client is shutting down".to_string(),
            ));
        }

        let member_uuid = response.member_uuid.ok_or_else(|| {
            HazelcastError::Protocol("authentication response has no member uuid".to_string())
        })?;
        self.services
            .partitions
            .check_partition_count(response.partition_count)?;
        connection.set_remote_identity(member_uuid, response.cluster_id);

        let registry = &self.services.registry;
        let mut cluster_id = self.cluster_id.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = registry.get_connection(member_uuid).filter(|c| c.is_alive()) {
            connection.close(&format!(
                "duplicate connection to same member with uuid {member_uuid}"
            ));
            return Ok(Registered::Existing(existing));
        }

        let cluster_id_changed = cluster_id.is_some_and(|id| id != response.cluster_id);
        if cluster_id_changed {
            if !registry.is_empty() {
                return Err(HazelcastError::IllegalState(format!(
                    "connection to {} does not belong to cluster {:?}",
                    connection.address(),
                    *cluster_id
                )));
            }
            tracing::warn!(
                from = ?*cluster_id,
                to = %response.cluster_id,
                "switching to a new cluster"
            );
            self.services.members.reset();
            self.services.partitions.reset();
        }

        let first_connection = registry.is_empty();
        registry.set_connection(member_uuid, Arc::clone(connection));

        let mut initialize = None;
        if first_connection {
            *cluster_id = Some(response.cluster_id);
            registry.set_client_state(ClientState::ConnectedToCluster);
            if cluster_id_changed {
                self.services
                    .lifecycle
                    .emit(LifecycleEvent::ClientChangedCluster);
            }
            initialize = Some(response.cluster_id);
        }
        drop(cluster_id);

        tracing::info!(
            connection = %connection.id(),
            address = %connection.address(),
            member = %member_uuid,
            cluster = %response.cluster_id,
            server_version = %response.server_version,
            "authenticated with cluster member"
        );
        let _ = self.events.send(ConnectionEvent::Added {
            id: connection.id(),
            address: connection.address(),
            member_uuid,
        });
        if self.services.invocations.is_backup_ack_enabled() {
            self.register_backup_listener(connection);
        }

        Ok(Registered::New { initialize })
    }

    /// Pushes local state to a newly joined cluster, then marks the client
    /// initialized on it.
    async fn initialize_on_cluster(&self, target_cluster_id: Uuid) {
        match self.services.schemas.send_all_schemas().await {
            Ok(()) => {
                if self.cluster_id() == Some(target_cluster_id) && self.is_active() {
                    self.services
                        .registry
                        .set_client_state(ClientState::InitializedOnCluster);
                    self.services
                        .lifecycle
                        .emit(LifecycleEvent::ClientConnected);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, cluster = %target_cluster_id, "failed to send state to cluster");
                if self.cluster_id() == Some(target_cluster_id) {
                    for connection in self.services.registry.get_connections() {
                        connection.close("failed to send state to the cluster");
                    }
                }
            }
        }
    }

    fn register_backup_listener(&self, connection: &Arc<Connection>) {
        let invocations = Arc::downgrade(&self.services.invocations);
        let invocation = Invocation::new(encode_backup_listener_request())
            .on_connection(Arc::clone(connection))
            .urgent()
            .with_event_handler(move |event: ClientMessage| {
                if let Some(invocations) = invocations.upgrade() {
                    invocations.handle_backup_event(&event);
                }
            });

        let pending = self.services.invocations.submit(invocation);
        self.backup_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection.id(), pending.correlation_id());

        let id = connection.id();
        tokio::spawn(async move {
            match pending.response().await {
                Ok(response) => match decode_backup_listener_response(&response) {
                    Ok(registration) => tracing::debug!(
                        connection = %id,
                        registration = ?registration,
                        "registered backup listener"
                    ),
                    Err(e) => tracing::warn!(connection = %id, error = %e, "malformed backup listener response"),
                },
                Err(e) => {
                    tracing::warn!(connection = %id, error = %e, "failed to register backup listener")
                }
            }
        });
    }

    /// Opens connections to known members that have none.
    fn connect_to_all_members(self: &Arc<Self>) {
        if !self.is_active() {
            return;
        }
        if self.services.registry.client_state() != ClientState::InitializedOnCluster {
            return;
        }

        let candidate = self.failover.current();
        for member in self.services.members.members() {
            if self.services.registry.get_connection(member.uuid()).is_some() {
                continue;
            }
            let manager = Arc::clone(self);
            let candidate = candidate.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.get_or_connect(&candidate, member.address()).await {
                    tracing::debug!(member = %member, error = %e, "could not connect to member");
                }
            });
        }
    }

    fn spawn_member_watch(&self) {
        let mut events = self.services.members.subscribe();
        let registry = Arc::clone(&self.services.registry);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.event_type == MemberEventType::Removed => {
                        if let Some(connection) = registry.get_connection(event.member.uuid()) {
                            connection.close(&format!("{} left the cluster", event.member));
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "member event watcher lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.member_watch.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    fn trigger_cluster_reconnection(&self) {
        if !self.is_active() || self.switching_cluster.load(Ordering::Acquire) {
            return;
        }
        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };

        if self.reconnect_mode == ReconnectMode::Off {
            tracing::info!("reconnect mode is off, shutting down the client");
            tokio::spawn(async move { manager.shutdown().await });
            return;
        }

        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(async move {
            let result = manager.connect_to_cluster().await;
            manager.reconnecting.store(false, Ordering::Release);
            if let Err(e) = result {
                tracing::error!(error = %e, "unable to reconnect to any cluster, shutting down");
                manager.shutdown().await;
            }
        });
    }

    /// Shuts the client core down: fails pending invocations, stops the
    /// background tasks and closes every connection. Later calls wait for the
    /// first one and have no further effect.
    #[instrument(name = "connection_manager.shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown
            .get_or_init(|| async { self.shutdown_now() })
            .await;
    }

    fn shutdown_now(&self) {
        let lifecycle = &self.services.lifecycle;
        lifecycle.emit(LifecycleEvent::ShuttingDown);
        self.active.store(false, Ordering::Release);
        lifecycle.stop();

        self.services.invocations.shutdown();

        for task in self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            task.cancel();
        }
        if let Some(handle) = self.member_watch.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let registry = &self.services.registry;
        if registry.client_state() == ClientState::InitializedOnCluster && !registry.is_empty() {
            lifecycle.emit(LifecycleEvent::ClientDisconnected);
        }
        registry.set_client_state(ClientState::DisconnectedFromCluster);
        for connection in registry.get_connections() {
            connection.close("client is shutting down");
        }
        lifecycle.emit(LifecycleEvent::Shutdown);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("client_uuid", &self.client_uuid)
            .field("client_name", &self.client_name)
            .field("cluster_id", &self.cluster_id())
            .field("active", &self.is_active())
            .field("connections", &self.services.registry.len())
            .finish_non_exhaustive()
    }
}

/// Result of registering an authenticated connection.
enum Registered {
    /// The member already had a live connection; the new one was closed.
    Existing(Arc<Connection>),
    /// The connection was registered. Carries the cluster to initialize on
    /// when it is the first connection to that cluster.
    New { initialize: Option<Uuid> },
}

/// Maps a non-successful authentication status onto an error.
fn check_authentication_status(
    response: &AuthenticationResponse,
    failover_enabled: bool,
) -> Result<()> {
    match response.status {
        AuthenticationStatus::Authenticated if failover_enabled && !response.failover_supported => {
            Err(HazelcastError::ClientNotAllowedInCluster(
                "cluster does not support client failover".to_string(),
            ))
        }
        AuthenticationStatus::Authenticated => Ok(()),
        AuthenticationStatus::CredentialsFailed => Err(HazelcastError::Authentication(
            "the cluster name or the credentials of the client were rejected".to_string(),
        )),
        AuthenticationStatus::SerializationVersionMismatch => Err(HazelcastError::Authentication(
            format!(
                "client serialization version {SERIALIZATION_VERSION} does not match the member's {}",
                response.serialization_version
            ),
        )),
        AuthenticationStatus::NotAllowedInCluster => Err(HazelcastError::ClientNotAllowedInCluster(
            "client is not allowed in the cluster".to_string(),
        )),
    }
}

impl ConnectionHandler for ConnectionManager {
    fn handle_message(&self, connection: &Arc<Connection>, message: ClientMessage) {
        self.services.invocations.process_response(connection, message);
    }

    fn connection_closed(&self, connection: &Arc<Connection>) {
        if let Some(correlation_id) = self
            .backup_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&connection.id())
        {
            self.services.invocations.remove_event_handler(correlation_id);
        }

        let Some(member_uuid) = connection.member_uuid() else {
            tracing::debug!(connection = %connection.id(), "unauthenticated connection closed");
            return;
        };

        let registry = &self.services.registry;
        if !registry.delete_connection(member_uuid, connection) {
            return;
        }

        let reason = connection.closed_reason();
        tracing::info!(
            connection = %connection.id(),
            address = %connection.address(),
            member = %member_uuid,
            reason = ?reason,
            "removed connection to member"
        );
        let _ = self.events.send(ConnectionEvent::Removed {
            id: connection.id(),
            address: connection.address(),
            member_uuid,
            reason,
        });

        if registry.is_empty() {
            if registry.client_state() == ClientState::InitializedOnCluster {
                self.services
                    .lifecycle
                    .emit(LifecycleEvent::ClientDisconnected);
            }
            registry.set_client_state(ClientState::DisconnectedFromCluster);
            self.trigger_cluster_reconnection();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: AuthenticationStatus, failover_supported: bool) -> AuthenticationResponse {
        AuthenticationResponse {
            status,
            address: Some(("127.0.0.1".to_string(), 5701)),
            member_uuid: Some(Uuid::new_v4()),
            serialization_version: 1,
            server_version: "5.3.0".to_string(),
            partition_count: 271,
            cluster_id: Uuid::new_v4(),
            failover_supported,
        }
    }

    #[test]
    fn test_authenticated_status_is_accepted() {
        assert!(check_authentication_status(&response(AuthenticationStatus::Authenticated, false), false).is_ok());
        assert!(check_authentication_status(&response(AuthenticationStatus::Authenticated, true), true).is_ok());
    }

    #[test]
    fn test_failure_statuses_map_to_errors() {
        assert!(matches!(
            check_authentication_status(&response(AuthenticationStatus::CredentialsFailed, false), false),
            Err(HazelcastError::Authentication(_))
        ));
        assert!(matches!(
            check_authentication_status(
                &response(AuthenticationStatus::SerializationVersionMismatch, false),
                false
            ),
            Err(HazelcastError::Authentication(_))
        ));
        assert!(matches!(
            check_authentication_status(&response(AuthenticationStatus::NotAllowedInCluster, false), false),
            Err(HazelcastError::ClientNotAllowedInCluster(_))
        ));
    }

    #[test]
    fn test_failover_requires_cluster_support() {
        assert!(matches!(
            check_authentication_status(&response(AuthenticationStatus::Authenticated, false), true),
            Err(HazelcastError::ClientNotAllowedInCluster(_))
        ));
    }

    #[test]
    fn test_manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionManager>();
        assert_send_sync::<ConnectionEvent>();
    }
}
