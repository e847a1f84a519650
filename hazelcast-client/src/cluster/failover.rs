//! Candidate clusters and the order they are tried in.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hazelcast_core::protocol::codecs::AuthCredentials;
use hazelcast_core::{HazelcastError, Result};

use super::LifecycleService;
use crate::config::{ClientConfig, SecurityConfig};
use crate::connection::{AddressProvider, StaticAddressProvider};

/// One independently configured cluster the client may connect to.
#[derive(Debug, Clone)]
pub struct CandidateClusterContext {
    cluster_name: String,
    address_provider: Arc<dyn AddressProvider>,
    security: SecurityConfig,
}

impl CandidateClusterContext {
    /// Creates a candidate cluster context.
    pub fn new(
        cluster_name: impl Into<String>,
        address_provider: Arc<dyn AddressProvider>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            address_provider,
            security,
        }
    }

    /// Creates the context described by a client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let network = config.network();
        let address_provider: Arc<dyn AddressProvider> = match network.cloud_discovery_token() {
            #[cfg(feature = "cloud")]
            Some(token) => Arc::new(crate::connection::CloudAddressProvider::new(
                token,
                network.cloud_coordinator_url(),
                network.connection_timeout(),
            )),
            #[cfg(not(feature = "cloud"))]
            Some(_) => {
                return Err(HazelcastError::Configuration(
                    "cloud discovery requires the `cloud` feature".to_string(),
                ))
            }
            None => Arc::new(StaticAddressProvider::new(network.addresses().to_vec())),
        };

        Ok(Self::new(
            config.cluster_name(),
            address_provider,
            config.security().clone(),
        ))
    }

    /// Returns the cluster name sent during authentication.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the provider of this cluster's member addresses.
    pub fn address_provider(&self) -> &Arc<dyn AddressProvider> {
        &self.address_provider
    }

    /// Returns the security configuration for this cluster.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Returns the credentials presented to this cluster.
    pub fn credentials(&self) -> AuthCredentials {
        if let Some(bytes) = self.security.custom_credentials() {
            return AuthCredentials::Custom(bytes.to_vec());
        }
        if let Some(token) = self.security.token() {
            return AuthCredentials::Custom(token.as_bytes().to_vec());
        }
        AuthCredentials::UsernamePassword {
            username: self.security.username().map(str::to_string),
            password: self.security.password().map(str::to_string),
        }
    }
}

/// Walks the ordered list of candidate clusters.
#[derive(Debug)]
pub struct ClusterFailoverService {
    candidates: Vec<CandidateClusterContext>,
    max_try_count: u32,
    index: AtomicUsize,
    lifecycle: Arc<LifecycleService>,
}

impl ClusterFailoverService {
    /// Creates a failover service over `candidates`, tried at most
    /// `max_try_count` times each.
    pub fn new(
        candidates: Vec<CandidateClusterContext>,
        max_try_count: u32,
        lifecycle: Arc<LifecycleService>,
    ) -> Result<Self> {
        if candidates.is_empty() {
            return Err(HazelcastError::Configuration(
                "at least one candidate cluster is required".to_string(),
            ));
        }
        Ok(Self {
            candidates,
            max_try_count,
            index: AtomicUsize::new(0),
            lifecycle,
        })
    }

    /// Returns the number of candidate clusters.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Returns the active candidate cluster.
    pub fn current(&self) -> CandidateClusterContext {
        let index = self.index.load(Ordering::Acquire) % self.candidates.len();
        self.candidates[index].clone()
    }

    /// Advances to the next candidate cluster and returns it.
    pub fn next(&self) -> CandidateClusterContext {
        let index = self.index.fetch_add(1, Ordering::AcqRel).wrapping_add(1) % self.candidates.len();
        self.candidates[index].clone()
    }

    /// Calls `connect` with successive candidates until it reports success,
    /// the client stops running, or every candidate was tried
    /// `max_try_count` times. Returns whether a cluster was connected.
    pub async fn try_next_cluster<F, Fut>(&self, mut connect: F) -> bool
    where
        F: FnMut(CandidateClusterContext) -> Fut,
        Fut: Future<Output = bool>,
    {
        let max_attempts = self.max_try_count as usize * self.candidates.len();
        let mut attempts = 0;

        while attempts < max_attempts && self.lifecycle.is_running() {
            attempts += 1;
            let candidate = self.next();
            tracing::info!(
                cluster = candidate.cluster_name(),
                attempt = attempts,
                max_attempts = max_attempts,
                "trying next candidate cluster"
            );
            if connect(candidate).await {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn candidate(name: &str) -> CandidateClusterContext {
        CandidateClusterContext::new(
            name,
            Arc::new(StaticAddressProvider::default()),
            SecurityConfig::default(),
        )
    }

    fn running_lifecycle() -> Arc<LifecycleService> {
        let lifecycle = Arc::new(LifecycleService::new());
        lifecycle.start();
        lifecycle
    }

    #[test]
    fn test_current_and_next_wrap_around() {
        let service = ClusterFailoverService::new(
            vec![candidate("a"), candidate("b")],
            1,
            running_lifecycle(),
        )
        .unwrap();

        assert_eq!(service.current().cluster_name(), "a");
        assert_eq!(service.next().cluster_name(), "b");
        assert_eq!(service.current().cluster_name(), "b");
        assert_eq!(service.next().cluster_name(), "a");
    }

    #[test]
    fn test_empty_candidates_rejected() {
        assert!(ClusterFailoverService::new(Vec::new(), 1, running_lifecycle()).is_err());
    }

    #[tokio::test]
    async fn test_try_next_cluster_exhausts_attempts() {
        let service = ClusterFailoverService::new(
            vec![candidate("a"), candidate("b")],
            2,
            running_lifecycle(),
        )
        .unwrap();

        let calls = AtomicU32::new(0);
        let connected = service
            .try_next_cluster(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { false }
            })
            .await;

        assert!(!connected);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_try_next_cluster_stops_on_success() {
        let service = ClusterFailoverService::new(
            vec![candidate("a"), candidate("b")],
            3,
            running_lifecycle(),
        )
        .unwrap();

        let mut seen = Vec::new();
        let connected = service
            .try_next_cluster(|ctx| {
                seen.push(ctx.cluster_name().to_string());
                let ok = ctx.cluster_name() == "a";
                async move { ok }
            })
            .await;

        assert!(connected);
        assert_eq!(seen, vec!["b", "a"]);
        assert_eq!(service.current().cluster_name(), "a");
    }

    #[tokio::test]
    async fn test_try_next_cluster_stops_when_not_running() {
        let lifecycle = Arc::new(LifecycleService::new());
        let service =
            ClusterFailoverService::new(vec![candidate("a")], 5, lifecycle).unwrap();

        let calls = AtomicU32::new(0);
        let connected = service
            .try_next_cluster(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { false }
            })
            .await;
        assert!(!connected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_credentials_selection() {
        let security = crate::config::SecurityConfigBuilder::new()
            .token("jwt")
            .build()
            .unwrap();
        let ctx = CandidateClusterContext::new(
            "dev",
            Arc::new(StaticAddressProvider::default()),
            security,
        );
        assert_eq!(ctx.credentials(), AuthCredentials::Custom(b"jwt".to_vec()));

        let ctx = CandidateClusterContext::from_config(
            &ClientConfig::builder().credentials("admin", "pw").build().unwrap(),
        )
        .unwrap();
        assert_eq!(
            ctx.credentials(),
            AuthCredentials::UsernamePassword {
                username: Some("admin".into()),
                password: Some("pw".into())
            }
        );
    }
}
