//! Hazelcast Cloud address provider.
//!
//! Members of a cloud cluster report their private addresses; the
//! coordinator API maps them to public addresses reachable by the client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use hazelcast_core::{HazelcastError, Result};

use super::discovery::{AddressProvider, Addresses};

const DEFAULT_COORDINATOR_URL: &str = "https://coordinator.hazelcast.cloud";

#[derive(Debug, Deserialize)]
struct DiscoveredMember {
    #[serde(rename = "private-address")]
    private_address: String,
    #[serde(rename = "public-address")]
    public_address: String,
}

/// Address provider that discovers members through the cloud coordinator.
#[derive(Debug)]
pub struct CloudAddressProvider {
    discovery_token: String,
    coordinator_url: String,
    request_timeout: Duration,
    private_to_public: RwLock<HashMap<SocketAddr, SocketAddr>>,
}

impl CloudAddressProvider {
    /// Creates a provider for the given discovery token. `coordinator_url`
    /// overrides the public coordinator.
    pub fn new(
        discovery_token: impl Into<String>,
        coordinator_url: Option<&str>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            discovery_token: discovery_token.into(),
            coordinator_url: coordinator_url
                .unwrap_or(DEFAULT_COORDINATOR_URL)
                .trim_end_matches('/')
                .to_string(),
            request_timeout,
            private_to_public: RwLock::new(HashMap::new()),
        }
    }

    fn discovery_url(&self) -> String {
        format!(
            "{}/cluster/discovery?token={}",
            self.coordinator_url, self.discovery_token
        )
    }

    async fn refresh(&self) -> Result<HashMap<SocketAddr, SocketAddr>> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| HazelcastError::Connection(format!("failed to create HTTP client: {e}")))?;

        let response = client
            .get(self.discovery_url())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| HazelcastError::Connection(format!("cloud coordinator request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(HazelcastError::Connection(format!(
                "cloud coordinator returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HazelcastError::Connection(format!("failed to read coordinator response: {e}")))?;

        let map = parse_response(&body)?;
        tracing::debug!(members = map.len(), "cloud discovery refreshed");
        *self
            .private_to_public
            .write()
            .unwrap_or_else(|e| e.into_inner()) = map.clone();
        Ok(map)
    }

    fn cached(&self, address: SocketAddr) -> Option<SocketAddr> {
        self.private_to_public
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&address)
            .copied()
    }
}

fn parse_response(body: &str) -> Result<HashMap<SocketAddr, SocketAddr>> {
    let members: Vec<DiscoveredMember> = serde_json::from_str(body)
        .map_err(|e| HazelcastError::Protocol(format!("invalid cloud discovery response: {e}")))?;

    let mut map = HashMap::with_capacity(members.len());
    for member in members {
        match (
            member.private_address.parse::<SocketAddr>(),
            member.public_address.parse::<SocketAddr>(),
        ) {
            (Ok(private), Ok(public)) => {
                map.insert(private, public);
            }
            _ => tracing::warn!(
                private = %member.private_address,
                public = %member.public_address,
                "skipping unparseable cloud member address"
            ),
        }
    }
    Ok(map)
}

#[async_trait]
impl AddressProvider for CloudAddressProvider {
    async fn load_addresses(&self) -> Result<Addresses> {
        let map = self.refresh().await?;
        if map.is_empty() {
            tracing::warn!("cloud discovery found no members");
        }
        Ok(Addresses::primary(map.into_values().collect()))
    }

    async fn translate(&self, address: SocketAddr) -> Result<Option<SocketAddr>> {
        if let Some(public) = self.cached(address) {
            return Ok(Some(public));
        }
        Ok(self.refresh().await?.get(&address).copied())
    }
}
