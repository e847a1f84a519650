//! Cluster view, partition ownership, lifecycle and failover.

mod cluster_service;
mod failover;
mod lifecycle_service;
mod partition_service;

pub use cluster_service::{MemberDirectory, MemberList};
pub use failover::{CandidateClusterContext, ClusterFailoverService};
pub use lifecycle_service::{LifecycleListenerRegistration, LifecycleService};
pub use partition_service::{PartitionOracle, PartitionTable};
