//! Keeps idle connections alive and closes unresponsive ones.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::Instant;

use hazelcast_core::protocol::codecs::ping::encode_ping_request;

use super::registry::ConnectionRegistry;
use crate::invocation::{Invocation, InvocationService};
use crate::runtime::PeriodicTask;

/// Spawns the heartbeat task: every `interval`, each live connection that
/// has read nothing within `timeout` is closed and each connection that has
/// written nothing within `interval` is pinged.
pub(crate) fn spawn_heartbeat(
    registry: Arc<ConnectionRegistry>,
    invocations: Weak<InvocationService>,
    interval: Duration,
    timeout: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("heartbeat", interval, move || {
        let registry = Arc::clone(&registry);
        let invocations = invocations.clone();
        async move {
            if let Some(invocations) = invocations.upgrade() {
                check_connections(&registry, &invocations, interval, timeout);
            }
        }
    })
}

fn check_connections(
    registry: &ConnectionRegistry,
    invocations: &Arc<InvocationService>,
    interval: Duration,
    timeout: Duration,
) {
    let now = Instant::now();
    for connection in registry.get_connections() {
        if !connection.is_alive() {
            continue;
        }

        let idle_read = now.saturating_duration_since(connection.last_read_at());
        if idle_read > timeout {
            tracing::warn!(
                connection = %connection.id(),
                address = %connection.address(),
                idle = ?idle_read,
                timeout = ?timeout,
                "heartbeat timed out"
            );
            connection.close(&format!(
                "Heartbeat timed out to {} at {}",
                connection.id(),
                connection.address()
            ));
            continue;
        }

        if now.saturating_duration_since(connection.last_write_at()) > interval {
            let ping = Invocation::new(encode_ping_request())
                .on_connection(Arc::clone(&connection))
                .urgent();
            let pending = invocations.submit(ping);
            let id = connection.id();
            tokio::spawn(async move {
                if let Err(e) = pending.response().await {
                    tracing::debug!(connection = %id, error = %e, "heartbeat ping failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{LifecycleService, MemberList, PartitionTable};
    use crate::config::{ClientConfig, ReconnectMode};
    use crate::connection::test_support::{test_connection, RecordingHandler};
    use crate::connection::{ClientState, RoundRobinLoadBalancer};
    use crate::invocation::{DefaultErrorClassifier, NoopSchemaService};
    use futures::StreamExt;
    use hazelcast_core::protocol::constants::CLIENT_PING;
    use uuid::Uuid;

    fn services() -> (Arc<ConnectionRegistry>, Arc<InvocationService>) {
        let config = ClientConfig::builder().build().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(
            true,
            false,
            ReconnectMode::On,
            Arc::new(RoundRobinLoadBalancer::new()),
            Arc::new(MemberList::new()),
        ));
        registry.set_client_state(ClientState::InitializedOnCluster);
        let lifecycle = Arc::new(LifecycleService::new());
        lifecycle.start();
        let invocations = InvocationService::new(
            &config,
            Arc::clone(&registry),
            Arc::new(PartitionTable::new()),
            lifecycle,
            Arc::new(NoopSchemaService),
            Arc::new(DefaultErrorClassifier),
        );
        (registry, invocations)
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_writer_is_pinged() {
        let (registry, invocations) = services();
        let handler = Arc::new(RecordingHandler::default());
        let (connection, mut peer) = test_connection(&handler);
        registry.set_connection(Uuid::new_v4(), Arc::clone(&connection));

        let _task = spawn_heartbeat(
            Arc::clone(&registry),
            Arc::downgrade(&invocations),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        let ping = peer.next().await.unwrap().unwrap();
        assert_eq!(ping.message_type(), Some(CLIENT_PING));
        assert!(connection.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_is_closed() {
        let (registry, invocations) = services();
        let handler = Arc::new(RecordingHandler::default());
        let (connection, _peer) = test_connection(&handler);
        registry.set_connection(Uuid::new_v4(), Arc::clone(&connection));

        let _task = spawn_heartbeat(
            Arc::clone(&registry),
            Arc::downgrade(&invocations),
            Duration::from_secs(1),
            Duration::from_secs(3),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!connection.is_alive());
        assert!(connection
            .closed_reason()
            .is_some_and(|reason| reason.starts_with("Heartbeat timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_heartbeat_stops_checking() {
        let (registry, invocations) = services();
        let handler = Arc::new(RecordingHandler::default());
        let (connection, _peer) = test_connection(&handler);
        registry.set_connection(Uuid::new_v4(), Arc::clone(&connection));

        let task = spawn_heartbeat(
            Arc::clone(&registry),
            Arc::downgrade(&invocations),
            Duration::from_secs(1),
            Duration::from_secs(3),
        );
        assert!(task.cancel());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(connection.is_alive());
    }
}
