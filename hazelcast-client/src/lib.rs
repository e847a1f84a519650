//! Async Rust client core for [Hazelcast](https://hazelcast.com/).
//!
//! This crate connects to a Hazelcast 5.x cluster over the
//! [Hazelcast Open Binary Protocol](https://github.com/hazelcast/hazelcast-client-protocol)
//! and carries requests to the right member. It is built on
//! [Tokio](https://tokio.rs/) and exposes every request as an `async fn`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hazelcast_client::{ClientConfig, HazelcastClient};
//! use hazelcast_client::core::protocol::codecs::ping::encode_ping_request;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .cluster_name("dev")
//!         .build()?;
//!     let client = HazelcastClient::new(config).await?;
//!
//!     let response = client.invoke(encode_ping_request()).await?;
//!     println!("{:?}", response.message_type());
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Invocations
//!
//! An [`Invocation`] wraps one request and the target it should reach: any
//! member, the owner of a partition, a specific member, or a specific
//! connection. The [`InvocationService`] assigns a correlation id, picks a
//! connection, and retries retryable failures with backoff until the
//! invocation timeout. Responses that need backup acknowledgements complete
//! only once every backup has reported, or when the backup timeout expires.
//!
//! # Connections
//!
//! The [`ConnectionManager`] opens and authenticates connections, keeps one
//! connection per member in smart routing mode, pings idle connections, and
//! reconnects (or fails over to another cluster) when the last connection is
//! lost.
//!
//! # Configuration
//!
//! ```rust,no_run
//! use hazelcast_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .cluster_name("production")
//!     .add_address("10.0.0.1:5701".parse().unwrap())
//!     .connection_timeout(Duration::from_secs(10))
//!     .credentials("admin", "secret")
//!     .invocation(|i| i.invocation_timeout(Duration::from_secs(60)))
//!     .build()
//!     .expect("invalid config");
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Purpose |
//! |------|---------|
//! | `cloud` | Hazelcast Cloud discovery |

#![warn(missing_docs)]

mod client;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod invocation;
pub mod listener;
mod runtime;

pub use client::HazelcastClient;
pub use cluster::{
    CandidateClusterContext, ClusterFailoverService, LifecycleService, MemberList,
    PartitionTable,
};
pub use config::{
    ClientConfig, ClientConfigBuilder, ClientFailoverConfig, ClientFailoverConfigBuilder,
    ConfigError, ConnectionRetryConfig, ConnectionRetryConfigBuilder, ConnectionStrategyConfig,
    ConnectionStrategyConfigBuilder, InvocationConfig, InvocationConfigBuilder, LoadBalancerType,
    NetworkConfig, NetworkConfigBuilder, ReconnectMode, SecurityConfig, SecurityConfigBuilder,
};
pub use connection::{
    ClientState, Connection, ConnectionEvent, ConnectionId, ConnectionManager, ConnectionRegistry,
    LoadBalancer,
};
pub use hazelcast_core as core;
pub use invocation::{
    Invocation, InvocationService, InvocationTarget, PendingResponse, SchemaService,
};
pub use listener::{LifecycleEvent, Member, MemberEvent, MemberEventType};
