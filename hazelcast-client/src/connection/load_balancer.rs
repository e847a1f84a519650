//! Load balancing strategies for untargeted invocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::LoadBalancerType;
use crate::listener::Member;

/// Picks the member an untargeted invocation is sent to.
///
/// The caller passes the current member view on every call, so balancers
/// always see membership changes without a separate subscription.
pub trait LoadBalancer: Send + Sync {
    /// Returns the next member to use, or `None` if `members` is empty.
    fn next(&self, members: &[Member]) -> Option<Member>;
}

impl std::fmt::Debug for dyn LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoadBalancer")
    }
}

/// Cycles through members in order.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    index: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    /// Creates a new round-robin load balancer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn next(&self, members: &[Member]) -> Option<Member> {
        if members.is_empty() {
            return None;
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % members.len();
        Some(members[idx].clone())
    }
}

/// Picks a uniformly random member.
#[derive(Debug, Default)]
pub struct RandomLoadBalancer;

impl RandomLoadBalancer {
    /// Creates a new random load balancer.
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn next(&self, members: &[Member]) -> Option<Member> {
        members.choose(&mut rand::thread_rng()).cloned()
    }
}

/// Creates the load balancer selected by configuration.
pub fn load_balancer_for(kind: LoadBalancerType) -> Arc<dyn LoadBalancer> {
    match kind {
        LoadBalancerType::RoundRobin => Arc::new(RoundRobinLoadBalancer::new()),
        LoadBalancerType::Random => Arc::new(RandomLoadBalancer::new()),
    }
}
