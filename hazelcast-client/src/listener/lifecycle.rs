//! Client lifecycle events.

use std::fmt;

/// Events emitted during client lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The client is starting.
    Starting,
    /// The client has started; with async start the cluster may not be
    /// connected yet.
    Started,
    /// The client is shutting down.
    ShuttingDown,
    /// The client has completed shutdown.
    Shutdown,
    /// The client is initialized on a cluster.
    ClientConnected,
    /// The client lost its last connection to the cluster.
    ClientDisconnected,
    /// The client connected to a cluster with a different cluster id.
    ClientChangedCluster,
}

impl LifecycleEvent {
    /// Returns the event name as reported in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
            Self::ClientConnected => "CLIENT_CONNECTED",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
            Self::ClientChangedCluster => "CLIENT_CHANGED_CLUSTER",
        }
    }

    /// Returns true for events describing cluster connectivity.
    pub fn is_connectivity_change(&self) -> bool {
        matches!(
            self,
            Self::ClientConnected | Self::ClientDisconnected | Self::ClientChangedCluster
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
