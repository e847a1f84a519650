//! Sources of candidate member addresses.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use hazelcast_core::Result;

/// Port a member listens on when no address is configured.
pub const DEFAULT_PORT: u16 = 5701;
/// Number of ports after [`DEFAULT_PORT`] probed as secondary addresses.
const DEFAULT_SECONDARY_PORT_COUNT: u16 = 2;

/// Candidate addresses of one cluster, split by preference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addresses {
    /// Addresses tried first.
    pub primary: Vec<SocketAddr>,
    /// Addresses tried after every primary address failed.
    pub secondary: Vec<SocketAddr>,
}

impl Addresses {
    /// Creates an address set with primary addresses only.
    pub fn primary(addresses: Vec<SocketAddr>) -> Self {
        Self {
            primary: addresses,
            secondary: Vec::new(),
        }
    }

    /// Returns true if neither list holds an address.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Returns every address in the order to try them: primaries before
    /// secondaries, each list shuffled on its own if `shuffle` is set.
    pub fn into_ordered(mut self, shuffle: bool) -> Vec<SocketAddr> {
        if shuffle {
            let mut rng = rand::thread_rng();
            self.primary.shuffle(&mut rng);
            self.secondary.shuffle(&mut rng);
        }
        self.primary.into_iter().chain(self.secondary).collect()
    }
}

/// Supplies the addresses the connection manager tries for one cluster.
#[async_trait]
pub trait AddressProvider: Send + Sync + std::fmt::Debug {
    /// Loads the current candidate addresses.
    async fn load_addresses(&self) -> Result<Addresses>;

    /// Translates a member-reported address into one reachable from the
    /// client, or `None` if the address is unknown to this provider.
    async fn translate(&self, address: SocketAddr) -> Result<Option<SocketAddr>>;
}

/// Address provider backed by a configured address list.
#[derive(Debug, Clone)]
pub struct StaticAddressProvider {
    addresses: Vec<SocketAddr>,
}

impl StaticAddressProvider {
    /// Creates a provider for the given addresses.
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self { addresses }
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }
}

impl Default for StaticAddressProvider {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> From<T> for StaticAddressProvider
where
    T: IntoIterator<Item = SocketAddr>,
{
    fn from(addresses: T) -> Self {
        Self::new(addresses.into_iter().collect())
    }
}

#[async_trait]
impl AddressProvider for StaticAddressProvider {
    async fn load_addresses(&self) -> Result<Addresses> {
        if !self.addresses.is_empty() {
            return Ok(Addresses::primary(self.addresses.clone()));
        }

        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Ok(Addresses {
            primary: vec![SocketAddr::new(localhost, DEFAULT_PORT)],
            secondary: (1..=DEFAULT_SECONDARY_PORT_COUNT)
                .map(|offset| SocketAddr::new(localhost, DEFAULT_PORT + offset))
                .collect(),
        })
    }

    async fn translate(&self, address: SocketAddr) -> Result<Option<SocketAddr>> {
        Ok(Some(address))
    }
}
