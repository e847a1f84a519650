//! Hazelcast client entry point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use hazelcast_core::{ClientMessage, Result};

use crate::cluster::{
    CandidateClusterContext, ClusterFailoverService, LifecycleService, MemberList, PartitionTable,
};
use crate::config::{ClientConfig, ClientFailoverConfig};
use crate::connection::{
    load_balancer_for, ClusterServices, Connection, ConnectionEvent, ConnectionManager,
    ConnectionRegistry,
};
use crate::invocation::{
    DefaultErrorClassifier, ErrorClassifier, Invocation, InvocationService, NoopSchemaService,
    PendingResponse, SchemaService,
};
use crate::listener::LifecycleEvent;

/// Numbers clients that were not given an instance name.
static CLIENT_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The main entry point for connecting to a Hazelcast cluster.
///
/// The client owns the connection manager and the invocation engine. Every
/// request goes through [`invoke`](Self::invoke) or one of its targeted
/// variants and completes exactly once, with the response, with an error, or
/// with `ClientNotActive` after [`shutdown`](Self::shutdown).
///
/// # Example
///
/// ```no_run
/// use hazelcast_client::{ClientConfig, HazelcastClient};
/// use hazelcast_client::core::protocol::codecs::ping::encode_ping_request;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .cluster_name("dev")
///         .add_address("127.0.0.1:5701".parse()?)
///         .build()?;
///
///     let client = HazelcastClient::new(config).await?;
///     let response = client.invoke(encode_ping_request()).await?;
///     println!("ping answered with correlation id {:?}", response.correlation_id());
///
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct HazelcastClient {
    name: String,
    config: Arc<ClientConfig>,
    manager: Arc<ConnectionManager>,
    invocations: Arc<InvocationService>,
    registry: Arc<ConnectionRegistry>,
    lifecycle: Arc<LifecycleService>,
    members: Arc<MemberList>,
    partitions: Arc<PartitionTable>,
}

impl HazelcastClient {
    /// Creates a client and connects it to the configured cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if no address of the cluster accepts the client
    /// before the cluster connect timeout. With async start the connection
    /// is made in the background and only configuration errors are returned.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::new_with_schema_service(config, Arc::new(NoopSchemaService)).await
    }

    /// Creates a client whose compact schemas are managed by `schemas`.
    pub async fn new_with_schema_service(
        config: ClientConfig,
        schemas: Arc<dyn SchemaService>,
    ) -> Result<Self> {
        let candidate = CandidateClusterContext::from_config(&config)?;
        Self::start(config, vec![candidate], 1, false, schemas).await
    }

    /// Creates a client that fails over between the clusters of `config`.
    ///
    /// Settings other than the cluster identity are taken from the first
    /// client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no candidate cluster accepts the client within the
    /// configured try count.
    pub async fn new_with_failover(config: ClientFailoverConfig) -> Result<Self> {
        let candidates = config
            .client_configs()
            .iter()
            .map(CandidateClusterContext::from_config)
            .collect::<Result<Vec<_>>>()?;
        Self::start(
            config.primary().clone(),
            candidates,
            config.try_count(),
            true,
            Arc::new(NoopSchemaService),
        )
        .await
    }

    async fn start(
        config: ClientConfig,
        candidates: Vec<CandidateClusterContext>,
        try_count: u32,
        failover_enabled: bool,
        schemas: Arc<dyn SchemaService>,
    ) -> Result<Self> {
        let name = config.instance_name().map(str::to_string).unwrap_or_else(|| {
            format!(
                "hz.client_{}",
                CLIENT_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
            )
        });

        let network = config.network();
        let strategy = config.connection_strategy();
        let members = Arc::new(MemberList::new());
        let partitions = Arc::new(PartitionTable::new());
        let lifecycle = Arc::new(LifecycleService::new());
        let classifier: Arc<dyn ErrorClassifier> = Arc::new(DefaultErrorClassifier);
        let registry = Arc::new(ConnectionRegistry::new(
            network.smart_routing(),
            strategy.async_start(),
            strategy.reconnect_mode(),
            load_balancer_for(config.load_balancer()),
            members.clone(),
        ));
        let invocations = InvocationService::new(
            &config,
            Arc::clone(&registry),
            partitions.clone(),
            Arc::clone(&lifecycle),
            Arc::clone(&schemas),
            Arc::clone(&classifier),
        );

        let failover =
            ClusterFailoverService::new(candidates, try_count, Arc::clone(&lifecycle))?;
        let manager = ConnectionManager::new(
            &config,
            name.clone(),
            failover,
            failover_enabled,
            ClusterServices {
                registry: Arc::clone(&registry),
                members: Arc::clone(&members),
                partitions: Arc::clone(&partitions),
                lifecycle: Arc::clone(&lifecycle),
                invocations: Arc::clone(&invocations),
                schemas,
                classifier,
            },
        );

        lifecycle.start();
        invocations.start();
        if let Err(e) = manager.start().await {
            tracing::error!(client = %name, error = %e, "client failed to start");
            manager.shutdown().await;
            return Err(e);
        }
        lifecycle.emit(LifecycleEvent::Started);

        tracing::info!(
            client = %name,
            cluster = %config.cluster_name(),
            "Hazelcast client started"
        );

        Ok(Self {
            name,
            config: Arc::new(config),
            manager,
            invocations,
            registry,
            lifecycle,
            members,
            partitions,
        })
    }

    /// Returns the instance name of this client.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identity this client presents to the cluster.
    pub fn client_uuid(&self) -> Uuid {
        self.manager.client_uuid()
    }

    /// Returns the configuration the client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the lifecycle service.
    pub fn lifecycle(&self) -> &Arc<LifecycleService> {
        &self.lifecycle
    }

    /// Returns the member view used for routing and reconnection.
    pub fn members(&self) -> &Arc<MemberList> {
        &self.members
    }

    /// Returns the partition table used for routing.
    pub fn partitions(&self) -> &Arc<PartitionTable> {
        &self.partitions
    }

    /// Returns the table of live connections.
    pub fn connection_registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns the invocation engine.
    pub fn invocation_service(&self) -> &Arc<InvocationService> {
        &self.invocations
    }

    /// Subscribes to connection added/removed events.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.manager.subscribe()
    }

    /// Sends a request to any member.
    pub async fn invoke(&self, request: ClientMessage) -> Result<ClientMessage> {
        self.invocations.invoke(Invocation::new(request)).await
    }

    /// Sends a request over one specific connection. I/O failures of that
    /// connection are not retried.
    pub async fn invoke_on_connection(
        &self,
        request: ClientMessage,
        connection: Arc<Connection>,
    ) -> Result<ClientMessage> {
        self.invocations
            .invoke(Invocation::new(request).on_connection(connection))
            .await
    }

    /// Sends a request to the owner of a partition.
    pub async fn invoke_on_partition(
        &self,
        request: ClientMessage,
        partition_id: i32,
    ) -> Result<ClientMessage> {
        self.invocations
            .invoke(Invocation::new(request).on_partition(partition_id))
            .await
    }

    /// Sends a request to one member.
    pub async fn invoke_on_member(
        &self,
        request: ClientMessage,
        member_uuid: Uuid,
    ) -> Result<ClientMessage> {
        self.invocations
            .invoke(Invocation::new(request).on_member(member_uuid))
            .await
    }

    /// Submits an invocation without waiting for it. Invocations carrying an
    /// event handler keep receiving events until
    /// [`remove_event_handler`](Self::remove_event_handler) is called.
    pub fn submit(&self, invocation: Invocation) -> PendingResponse {
        self.invocations.submit(invocation)
    }

    /// Stops delivering events to the handler of the invocation with the
    /// given correlation id.
    pub fn remove_event_handler(&self, correlation_id: i64) -> bool {
        self.invocations.remove_event_handler(correlation_id)
    }

    /// Picks a connection for a cluster-wide query. This is a best-effort
    /// hint; `None` means the client has no connection.
    pub fn connection_for_sql(&self) -> Result<Option<Arc<Connection>>> {
        self.registry.connection_for_sql()
    }

    /// Shuts the client down. Pending invocations fail with
    /// `ClientNotActive`. Repeated calls wait for the first shutdown and do
    /// nothing else.
    pub async fn shutdown(&self) {
        tracing::info!(client = %self.name, "shutting down Hazelcast client");
        self.manager.shutdown().await;
    }
}
