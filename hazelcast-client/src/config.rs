//! Client configuration types and builders.

use std::net::SocketAddr;
use std::time::Duration;

use hazelcast_core::HazelcastError;

/// Default cluster name.
const DEFAULT_CLUSTER_NAME: &str = "dev";
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default heartbeat interval.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Default heartbeat timeout.
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default initial reconnect backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
/// Default maximum reconnect backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default reconnect backoff multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 1.05;
/// Default reconnect backoff jitter.
const DEFAULT_JITTER: f64 = 0.0;
/// Cluster connect timeout used when a failover configuration is in effect.
pub(crate) const FAILOVER_CLUSTER_CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default invocation timeout.
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default pause between slow invocation retries.
const DEFAULT_INVOCATION_RETRY_PAUSE: Duration = Duration::from_millis(1000);
/// Default grace period for backup acknowledgements.
const DEFAULT_OPERATION_BACKUP_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default period of the pending-invocation sweep.
const DEFAULT_CLEAN_RESOURCES_PERIOD: Duration = Duration::from_millis(100);
/// Default failover try count.
const DEFAULT_FAILOVER_TRY_COUNT: u32 = 3;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for HazelcastError {
    fn from(err: ConfigError) -> Self {
        HazelcastError::Configuration(err.message)
    }
}

/// What the client does after losing every connection to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReconnectMode {
    /// Reconnect, blocking invocations until connected.
    #[default]
    On,
    /// Shut the client down.
    Off,
    /// Reconnect in the background; invocations fail fast with `ClientOffline`.
    Async,
}

impl ReconnectMode {
    /// Returns true if the client reconnects at all.
    pub fn is_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Returns true if reconnection happens in the background.
    pub fn is_async(self) -> bool {
        matches!(self, Self::Async)
    }
}

/// Load balancing strategy used to pick a connection for untargeted invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadBalancerType {
    /// Cycle through members.
    #[default]
    RoundRobin,
    /// Pick a random member.
    Random,
}

/// Network configuration for cluster connections.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    addresses: Vec<SocketAddr>,
    cloud_discovery_token: Option<String>,
    cloud_coordinator_url: Option<String>,
    connection_timeout: Duration,
    smart_routing: bool,
    redo_operation: bool,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
}

impl NetworkConfig {
    /// Returns the configured cluster member addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Returns the cloud discovery token, if any.
    pub fn cloud_discovery_token(&self) -> Option<&str> {
        self.cloud_discovery_token.as_deref()
    }

    /// Returns the cloud coordinator base URL override, if any.
    pub fn cloud_coordinator_url(&self) -> Option<&str> {
        self.cloud_coordinator_url.as_deref()
    }

    /// Returns the connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns true if the client connects to every member and routes
    /// requests to their owners.
    pub fn smart_routing(&self) -> bool {
        self.smart_routing
    }

    /// Returns true if non-retryable requests are retried after their
    /// target disconnects.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }

    /// Returns the heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns the heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            cloud_discovery_token: None,
            cloud_coordinator_url: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            smart_routing: true,
            redo_operation: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    addresses: Vec<SocketAddr>,
    cloud_discovery_token: Option<String>,
    cloud_coordinator_url: Option<String>,
    connection_timeout: Option<Duration>,
    smart_routing: Option<bool>,
    redo_operation: Option<bool>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Option<Duration>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.addresses.push(address);
        self
    }

    /// Sets the cluster member addresses.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Discovers members through Hazelcast Cloud with the given token.
    pub fn cloud_discovery_token(mut self, token: impl Into<String>) -> Self {
        self.cloud_discovery_token = Some(token.into());
        self
    }

    /// Overrides the cloud coordinator base URL.
    pub fn cloud_coordinator_url(mut self, url: impl Into<String>) -> Self {
        self.cloud_coordinator_url = Some(url.into());
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Enables or disables smart routing.
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.smart_routing = Some(enabled);
        self
    }

    /// Enables or disables redo of non-retryable operations.
    pub fn redo_operation(mut self, enabled: bool) -> Self {
        self.redo_operation = Some(enabled);
        self
    }

    /// Sets the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the heartbeat timeout.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Builds the network configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - both addresses and a cloud discovery token are set
    /// - the heartbeat interval is zero
    /// - the heartbeat timeout does not exceed the heartbeat interval
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        if self.cloud_discovery_token.is_some() && !self.addresses.is_empty() {
            return Err(ConfigError::new(
                "cloud discovery token and member addresses are mutually exclusive",
            ));
        }

        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        let heartbeat_timeout = self.heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        if heartbeat_interval.is_zero() {
            return Err(ConfigError::new("heartbeat_interval must be positive"));
        }
        if heartbeat_timeout <= heartbeat_interval {
            return Err(ConfigError::new(
                "heartbeat_timeout must exceed heartbeat_interval",
            ));
        }

        Ok(NetworkConfig {
            addresses: self.addresses,
            cloud_discovery_token: self.cloud_discovery_token,
            cloud_coordinator_url: self.cloud_coordinator_url,
            connection_timeout: self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            smart_routing: self.smart_routing.unwrap_or(true),
            redo_operation: self.redo_operation.unwrap_or(false),
            heartbeat_interval,
            heartbeat_timeout,
        })
    }
}

/// Backoff configuration for cluster connection attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Option<Duration>,
}

impl ConnectionRetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter fraction in `[0, 1]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns the total time budget for connecting to one cluster, or
    /// `None` when unbounded.
    pub fn cluster_connect_timeout(&self) -> Option<Duration> {
        self.cluster_connect_timeout
    }
}

impl Default for ConnectionRetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_JITTER,
            cluster_connect_timeout: None,
        }
    }
}

/// Builder for `ConnectionRetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    cluster_connect_timeout: Option<Duration>,
}

impl ConnectionRetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter fraction.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Bounds the total time spent connecting to one cluster.
    pub fn cluster_connect_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_connect_timeout = Some(timeout);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside `[0, 1]`
    pub fn build(self) -> Result<ConnectionRetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let jitter = self.jitter.unwrap_or(DEFAULT_JITTER);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be between 0.0 and 1.0"));
        }

        Ok(ConnectionRetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            cluster_connect_timeout: self.cluster_connect_timeout,
        })
    }
}

/// How the client connects at start and after losing the cluster.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionStrategyConfig {
    async_start: bool,
    reconnect_mode: ReconnectMode,
    retry: ConnectionRetryConfig,
}

impl ConnectionStrategyConfig {
    /// Returns true if `start()` returns before the cluster is connected.
    pub fn async_start(&self) -> bool {
        self.async_start
    }

    /// Returns the reconnect mode.
    pub fn reconnect_mode(&self) -> ReconnectMode {
        self.reconnect_mode
    }

    /// Returns the connection retry configuration.
    pub fn retry(&self) -> &ConnectionRetryConfig {
        &self.retry
    }
}

/// Builder for `ConnectionStrategyConfig`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStrategyConfigBuilder {
    async_start: Option<bool>,
    reconnect_mode: Option<ReconnectMode>,
    retry: ConnectionRetryConfigBuilder,
}

impl ConnectionStrategyConfigBuilder {
    /// Creates a new connection strategy builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the client starts asynchronously.
    pub fn async_start(mut self, async_start: bool) -> Self {
        self.async_start = Some(async_start);
        self
    }

    /// Sets the reconnect mode.
    pub fn reconnect_mode(mut self, mode: ReconnectMode) -> Self {
        self.reconnect_mode = Some(mode);
        self
    }

    /// Configures connection retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ConnectionRetryConfigBuilder) -> ConnectionRetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Builds the connection strategy configuration.
    pub fn build(self) -> Result<ConnectionStrategyConfig, ConfigError> {
        Ok(ConnectionStrategyConfig {
            async_start: self.async_start.unwrap_or(false),
            reconnect_mode: self.reconnect_mode.unwrap_or_default(),
            retry: self.retry.build()?,
        })
    }
}

/// Invocation timing and backup acknowledgement settings.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationConfig {
    invocation_timeout: Duration,
    invocation_retry_pause: Duration,
    backup_ack_to_client_enabled: bool,
    operation_backup_timeout: Duration,
    fail_on_indeterminate_operation_state: bool,
    clean_resources_period: Duration,
}

impl InvocationConfig {
    /// Returns how long an invocation may keep retrying.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Returns the pause between retries once the fast retries are used up.
    pub fn invocation_retry_pause(&self) -> Duration {
        self.invocation_retry_pause
    }

    /// Returns true if backups acknowledge directly to the client.
    pub fn backup_ack_to_client_enabled(&self) -> bool {
        self.backup_ack_to_client_enabled
    }

    /// Returns the grace period for backup acknowledgements.
    pub fn operation_backup_timeout(&self) -> Duration {
        self.operation_backup_timeout
    }

    /// Returns true if a backup-ack timeout fails the invocation instead of
    /// completing it with the primary response.
    pub fn fail_on_indeterminate_operation_state(&self) -> bool {
        self.fail_on_indeterminate_operation_state
    }

    /// Returns the period of the pending-invocation sweep.
    pub fn clean_resources_period(&self) -> Duration {
        self.clean_resources_period
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            invocation_retry_pause: DEFAULT_INVOCATION_RETRY_PAUSE,
            backup_ack_to_client_enabled: true,
            operation_backup_timeout: DEFAULT_OPERATION_BACKUP_TIMEOUT,
            fail_on_indeterminate_operation_state: false,
            clean_resources_period: DEFAULT_CLEAN_RESOURCES_PERIOD,
        }
    }
}

/// Builder for `InvocationConfig`.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfigBuilder {
    invocation_timeout: Option<Duration>,
    invocation_retry_pause: Option<Duration>,
    backup_ack_to_client_enabled: Option<bool>,
    operation_backup_timeout: Option<Duration>,
    fail_on_indeterminate_operation_state: Option<bool>,
    clean_resources_period: Option<Duration>,
}

impl InvocationConfigBuilder {
    /// Creates a new invocation configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the invocation timeout.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Sets the pause between slow retries.
    pub fn invocation_retry_pause(mut self, pause: Duration) -> Self {
        self.invocation_retry_pause = Some(pause);
        self
    }

    /// Enables or disables backup acknowledgements to the client.
    pub fn backup_ack_to_client_enabled(mut self, enabled: bool) -> Self {
        self.backup_ack_to_client_enabled = Some(enabled);
        self
    }

    /// Sets the backup acknowledgement grace period.
    pub fn operation_backup_timeout(mut self, timeout: Duration) -> Self {
        self.operation_backup_timeout = Some(timeout);
        self
    }

    /// Fails invocations whose backups do not acknowledge in time.
    pub fn fail_on_indeterminate_operation_state(mut self, fail: bool) -> Self {
        self.fail_on_indeterminate_operation_state = Some(fail);
        self
    }

    /// Sets the period of the pending-invocation sweep.
    pub fn clean_resources_period(mut self, period: Duration) -> Self {
        self.clean_resources_period = Some(period);
        self
    }

    /// Builds the invocation configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the sweep period is zero.
    pub fn build(self) -> Result<InvocationConfig, ConfigError> {
        let clean_resources_period = self
            .clean_resources_period
            .unwrap_or(DEFAULT_CLEAN_RESOURCES_PERIOD);
        if clean_resources_period.is_zero() {
            return Err(ConfigError::new("clean_resources_period must be positive"));
        }

        Ok(InvocationConfig {
            invocation_timeout: self.invocation_timeout.unwrap_or(DEFAULT_INVOCATION_TIMEOUT),
            invocation_retry_pause: self
                .invocation_retry_pause
                .unwrap_or(DEFAULT_INVOCATION_RETRY_PAUSE),
            backup_ack_to_client_enabled: self.backup_ack_to_client_enabled.unwrap_or(true),
            operation_backup_timeout: self
                .operation_backup_timeout
                .unwrap_or(DEFAULT_OPERATION_BACKUP_TIMEOUT),
            fail_on_indeterminate_operation_state: self
                .fail_on_indeterminate_operation_state
                .unwrap_or(false),
            clean_resources_period,
        })
    }
}

/// Security configuration for authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityConfig {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    custom_credentials: Option<Vec<u8>>,
}

impl SecurityConfig {
    /// Returns the configured username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the configured password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the configured authentication token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the configured opaque credentials.
    pub fn custom_credentials(&self) -> Option<&[u8]> {
        self.custom_credentials.as_deref()
    }

    /// Returns true if username/password credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Builder for `SecurityConfig`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    custom_credentials: Option<Vec<u8>>,
}

impl SecurityConfigBuilder {
    /// Creates a new security configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both username and password for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets a bearer token for token-based authentication.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets opaque credentials understood by a custom login module.
    pub fn custom_credentials(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.custom_credentials = Some(bytes.into());
        self
    }

    /// Builds the security configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if more than one kind of credentials is set.
    pub fn build(self) -> Result<SecurityConfig, ConfigError> {
        let kinds = [
            self.username.is_some(),
            self.token.is_some(),
            self.custom_credentials.is_some(),
        ];
        if kinds.iter().filter(|set| **set).count() > 1 {
            return Err(ConfigError::new(
                "username/password, token and custom credentials are mutually exclusive",
            ));
        }

        Ok(SecurityConfig {
            username: self.username,
            password: self.password,
            token: self.token,
            custom_credentials: self.custom_credentials,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    cluster_name: String,
    instance_name: Option<String>,
    labels: Vec<String>,
    shuffle_member_list: bool,
    load_balancer: LoadBalancerType,
    network: NetworkConfig,
    connection_strategy: ConnectionStrategyConfig,
    invocation: InvocationConfig,
    security: SecurityConfig,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the configured instance name, if any.
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    /// Returns the client labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns true if known members are tried in random order.
    pub fn shuffle_member_list(&self) -> bool {
        self.shuffle_member_list
    }

    /// Returns the load balancer type.
    pub fn load_balancer(&self) -> LoadBalancerType {
        self.load_balancer
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the connection strategy configuration.
    pub fn connection_strategy(&self) -> &ConnectionStrategyConfig {
        &self.connection_strategy
    }

    /// Returns the invocation configuration.
    pub fn invocation(&self) -> &InvocationConfig {
        &self.invocation
    }

    /// Returns the security configuration.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    fn same_except_cluster_identity(&self, other: &ClientConfig) -> bool {
        self.labels == other.labels
            && self.instance_name == other.instance_name
            && self.shuffle_member_list == other.shuffle_member_list
            && self.load_balancer == other.load_balancer
            && self.network.smart_routing == other.network.smart_routing
            && self.network.redo_operation == other.network.redo_operation
            && self.network.connection_timeout == other.network.connection_timeout
            && self.network.heartbeat_interval == other.network.heartbeat_interval
            && self.network.heartbeat_timeout == other.network.heartbeat_timeout
            && self.connection_strategy == other.connection_strategy
            && self.invocation == other.invocation
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            instance_name: None,
            labels: Vec::new(),
            shuffle_member_list: true,
            load_balancer: LoadBalancerType::default(),
            network: NetworkConfig::default(),
            connection_strategy: ConnectionStrategyConfig::default(),
            invocation: InvocationConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    instance_name: Option<String>,
    labels: Vec<String>,
    shuffle_member_list: Option<bool>,
    load_balancer: Option<LoadBalancerType>,
    network: NetworkConfigBuilder,
    connection_strategy: ConnectionStrategyConfigBuilder,
    invocation: InvocationConfigBuilder,
    security: SecurityConfigBuilder,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Sets the instance name reported to the cluster.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Adds a label reported to the cluster.
    pub fn add_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Sets whether known members are tried in random order.
    pub fn shuffle_member_list(mut self, shuffle: bool) -> Self {
        self.shuffle_member_list = Some(shuffle);
        self
    }

    /// Sets the load balancer type.
    pub fn load_balancer(mut self, load_balancer: LoadBalancerType) -> Self {
        self.load_balancer = Some(load_balancer);
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures the connection strategy using a builder function.
    pub fn connection_strategy<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ConnectionStrategyConfigBuilder) -> ConnectionStrategyConfigBuilder,
    {
        self.connection_strategy = f(self.connection_strategy);
        self
    }

    /// Configures invocation settings using a builder function.
    pub fn invocation<F>(mut self, f: F) -> Self
    where
        F: FnOnce(InvocationConfigBuilder) -> InvocationConfigBuilder,
    {
        self.invocation = f(self.invocation);
        self
    }

    /// Configures security settings using a builder function.
    pub fn security<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SecurityConfigBuilder) -> SecurityConfigBuilder,
    {
        self.security = f(self.security);
        self
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.network = self.network.add_address(address);
        self
    }

    /// Sets the cluster member addresses.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.network = self.network.addresses(addresses);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Sets credentials for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.security = self.security.credentials(username, password);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let cluster_name = self
            .cluster_name
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        if cluster_name.is_empty() {
            return Err(ConfigError::new("cluster_name must not be empty"));
        }

        Ok(ClientConfig {
            cluster_name,
            instance_name: self.instance_name,
            labels: self.labels,
            shuffle_member_list: self.shuffle_member_list.unwrap_or(true),
            load_balancer: self.load_balancer.unwrap_or_default(),
            network: self.network.build()?,
            connection_strategy: self.connection_strategy.build()?,
            invocation: self.invocation.build()?,
            security: self.security.build()?,
        })
    }
}

/// Ordered list of alternative cluster configurations tried on failover.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFailoverConfig {
    client_configs: Vec<ClientConfig>,
    try_count: u32,
}

impl ClientFailoverConfig {
    /// Creates a new failover configuration builder.
    pub fn builder() -> ClientFailoverConfigBuilder {
        ClientFailoverConfigBuilder::new()
    }

    /// Returns the client configurations in failover order.
    pub fn client_configs(&self) -> &[ClientConfig] {
        &self.client_configs
    }

    /// Returns the number of alternative clusters.
    pub fn cluster_count(&self) -> usize {
        self.client_configs.len()
    }

    /// Returns how many times the whole list is tried.
    pub fn try_count(&self) -> u32 {
        self.try_count
    }

    /// Returns the configuration that drives settings shared by all clusters.
    pub fn primary(&self) -> &ClientConfig {
        // build() guarantees at least one entry
        &self.client_configs[0]
    }
}

/// Builder for `ClientFailoverConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientFailoverConfigBuilder {
    client_configs: Vec<ClientConfig>,
    try_count: Option<u32>,
}

impl ClientFailoverConfigBuilder {
    /// Creates a new failover configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cluster configuration.
    pub fn add_client_config(mut self, config: ClientConfig) -> Self {
        self.client_configs.push(config);
        self
    }

    /// Sets how many times the whole list is tried.
    pub fn try_count(mut self, try_count: u32) -> Self {
        self.try_count = Some(try_count);
        self
    }

    /// Builds the failover configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - no client configuration was added
    /// - `try_count` is zero
    /// - the configurations differ in anything but cluster name, addresses,
    ///   cloud discovery and security
    pub fn build(self) -> Result<ClientFailoverConfig, ConfigError> {
        let Some(first) = self.client_configs.first() else {
            return Err(ConfigError::new(
                "failover requires at least one client configuration",
            ));
        };

        let try_count = self.try_count.unwrap_or(DEFAULT_FAILOVER_TRY_COUNT);
        if try_count == 0 {
            return Err(ConfigError::new("try_count must be at least 1"));
        }

        if let Some(other) = self
            .client_configs
            .iter()
            .skip(1)
            .find(|c| !first.same_except_cluster_identity(c))
        {
            return Err(ConfigError::new(format!(
                "client configuration for cluster '{}' differs from '{}' in settings other than \
                 cluster name, addresses and security",
                other.cluster_name(),
                first.cluster_name()
            )));
        }

        Ok(ClientFailoverConfig {
            client_configs: self.client_configs,
            try_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.cluster_name(), "dev");
        assert!(config.network().addresses().is_empty());
        assert!(config.network().smart_routing());
        assert!(!config.network().redo_operation());
        assert!(config.shuffle_member_list());
        assert_eq!(config.network().heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.network().heartbeat_timeout(), Duration::from_secs(60));
        assert_eq!(ClientConfig::builder().build().unwrap(), config);
    }

    #[test]
    fn test_default_invocation_config() {
        let invocation = InvocationConfig::default();
        assert_eq!(invocation.invocation_timeout(), Duration::from_secs(120));
        assert_eq!(invocation.invocation_retry_pause(), Duration::from_secs(1));
        assert_eq!(invocation.operation_backup_timeout(), Duration::from_secs(5));
        assert_eq!(invocation.clean_resources_period(), Duration::from_millis(100));
        assert!(invocation.backup_ack_to_client_enabled());
        assert!(!invocation.fail_on_indeterminate_operation_state());
    }

    #[test]
    fn test_default_connection_strategy() {
        let strategy = ConnectionStrategyConfig::default();
        assert!(!strategy.async_start());
        assert_eq!(strategy.reconnect_mode(), ReconnectMode::On);
        assert_eq!(strategy.retry().initial_backoff(), Duration::from_secs(1));
        assert_eq!(strategy.retry().max_backoff(), Duration::from_secs(30));
        assert_eq!(strategy.retry().multiplier(), 1.05);
        assert_eq!(strategy.retry().jitter(), 0.0);
        assert_eq!(strategy.retry().cluster_connect_timeout(), None);
    }

    #[test]
    fn test_reconnect_mode_predicates() {
        assert!(ReconnectMode::On.is_enabled());
        assert!(!ReconnectMode::On.is_async());
        assert!(ReconnectMode::Async.is_enabled());
        assert!(ReconnectMode::Async.is_async());
        assert!(!ReconnectMode::Off.is_enabled());
    }

    #[test]
    fn test_builder_empty_cluster_name_fails() {
        let result = ClientConfig::builder().cluster_name("").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cluster_name must not be empty"));
    }

    #[test]
    fn test_nested_builders() {
        let config = ClientConfig::builder()
            .cluster_name("production")
            .add_label("blue")
            .network(|n| n.smart_routing(false).redo_operation(true))
            .connection_strategy(|s| {
                s.async_start(true)
                    .reconnect_mode(ReconnectMode::Async)
                    .retry(|r| r.jitter(0.2).cluster_connect_timeout(Duration::from_secs(10)))
            })
            .invocation(|i| i.fail_on_indeterminate_operation_state(true))
            .build()
            .unwrap();

        assert_eq!(config.cluster_name(), "production");
        assert_eq!(config.labels(), ["blue".to_string()]);
        assert!(!config.network().smart_routing());
        assert!(config.network().redo_operation());
        assert!(config.connection_strategy().async_start());
        assert_eq!(
            config.connection_strategy().reconnect_mode(),
            ReconnectMode::Async
        );
        assert_eq!(config.connection_strategy().retry().jitter(), 0.2);
        assert_eq!(
            config.connection_strategy().retry().cluster_connect_timeout(),
            Some(Duration::from_secs(10))
        );
        assert!(config.invocation().fail_on_indeterminate_operation_state());
    }

    #[test]
    fn test_retry_validation() {
        let err = ConnectionRetryConfigBuilder::new()
            .initial_backoff(Duration::from_secs(10))
            .max_backoff(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("initial_backoff must not exceed max_backoff"));

        let err = ConnectionRetryConfigBuilder::new()
            .multiplier(0.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("multiplier must be at least 1.0"));

        let err = ConnectionRetryConfigBuilder::new()
            .jitter(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("jitter"));
    }

    #[test]
    fn test_heartbeat_validation() {
        let err = NetworkConfigBuilder::new()
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_timeout(Duration::from_secs(5))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("heartbeat_timeout must exceed"));
    }

    #[test]
    fn test_cloud_token_excludes_addresses() {
        let err = NetworkConfigBuilder::new()
            .add_address("127.0.0.1:5701".parse().unwrap())
            .cloud_discovery_token("abc")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_security_kinds_are_exclusive() {
        let err = SecurityConfigBuilder::new()
            .credentials("admin", "secret")
            .token("jwt")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        let security = SecurityConfigBuilder::new()
            .custom_credentials(b"opaque".to_vec())
            .build()
            .unwrap();
        assert_eq!(security.custom_credentials(), Some(&b"opaque"[..]));
        assert!(!security.has_credentials());
    }

    #[test]
    fn test_config_error_into_hazelcast_error() {
        let err: HazelcastError = ConfigError::new("bad").into();
        assert!(matches!(err, HazelcastError::Configuration(m) if m == "bad"));
    }

    #[test]
    fn test_failover_config_builder() {
        let primary = ClientConfig::builder().cluster_name("primary").build().unwrap();
        let backup = ClientConfig::builder()
            .cluster_name("backup")
            .add_address("10.0.0.1:5701".parse().unwrap())
            .credentials("dr", "secret")
            .build()
            .unwrap();

        let failover = ClientFailoverConfig::builder()
            .add_client_config(primary)
            .add_client_config(backup)
            .try_count(5)
            .build()
            .unwrap();

        assert_eq!(failover.cluster_count(), 2);
        assert_eq!(failover.try_count(), 5);
        assert_eq!(failover.primary().cluster_name(), "primary");
    }

    #[test]
    fn test_failover_config_default_try_count() {
        let failover = ClientFailoverConfig::builder()
            .add_client_config(ClientConfig::default())
            .build()
            .unwrap();
        assert_eq!(failover.try_count(), 3);
    }

    #[test]
    fn test_failover_config_validation() {
        let err = ClientFailoverConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("at least one client configuration"));

        let err = ClientFailoverConfig::builder()
            .add_client_config(ClientConfig::default())
            .try_count(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("try_count"));

        let unisocket = ClientConfig::builder()
            .cluster_name("other")
            .network(|n| n.smart_routing(false))
            .build()
            .unwrap();
        let err = ClientFailoverConfig::builder()
            .add_client_config(ClientConfig::default())
            .add_client_config(unisocket)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("differs"));
    }
}
