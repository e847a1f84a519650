//! Connections to cluster members and their management.

#[cfg(feature = "cloud")]
mod cloud;
mod connection;
mod discovery;
mod heartbeat;
mod load_balancer;
mod manager;
mod registry;
mod wait_strategy;

#[cfg(feature = "cloud")]
pub use cloud::CloudAddressProvider;
pub use connection::{Connection, ConnectionId};
pub(crate) use connection::ConnectionHandler;
pub use discovery::{AddressProvider, Addresses, StaticAddressProvider, DEFAULT_PORT};
pub use load_balancer::{load_balancer_for, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer};
pub use manager::{ClusterServices, ConnectionEvent, ConnectionManager};
pub use registry::{member_of_larger_same_version_group, ClientState, ConnectionRegistry};
pub use wait_strategy::WaitStrategy;

#[cfg(test)]
pub(crate) use connection::tests as test_support;
