//! Live connection table and client state.

use std::sync::{Arc, RwLock};

use rand::Rng;
use uuid::Uuid;

use hazelcast_core::{HazelcastError, Result};

use super::connection::Connection;
use super::load_balancer::LoadBalancer;
use crate::cluster::MemberDirectory;
use crate::config::ReconnectMode;
use crate::listener::{Member, MemberVersion};

const SQL_CONNECTION_RANDOM_ATTEMPTS: usize = 10;

/// Connection state of the client as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// No cluster connection was ever established.
    Initial,
    /// The first connection to a cluster is authenticated.
    ConnectedToCluster,
    /// Local state has been sent to the cluster; invocations are allowed.
    InitializedOnCluster,
    /// Every connection was lost after being initialized.
    DisconnectedFromCluster,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initial => "INITIAL",
            Self::ConnectedToCluster => "CONNECTED_TO_CLUSTER",
            Self::InitializedOnCluster => "INITIALIZED_ON_CLUSTER",
            Self::DisconnectedFromCluster => "DISCONNECTED_FROM_CLUSTER",
        };
        f.write_str(name)
    }
}

/// Authenticated connections keyed by member uuid, plus the client state.
///
/// Only the connection manager changes the table and the state; everyone
/// else reads.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<(Uuid, Arc<Connection>)>>,
    state: RwLock<ClientState>,
    smart_routing: bool,
    async_start: bool,
    reconnect_mode: ReconnectMode,
    load_balancer: Arc<dyn LoadBalancer>,
    members: Arc<dyn MemberDirectory>,
}

impl ConnectionRegistry {
    /// Creates an empty registry in the `Initial` state.
    pub fn new(
        smart_routing: bool,
        async_start: bool,
        reconnect_mode: ReconnectMode,
        load_balancer: Arc<dyn LoadBalancer>,
        members: Arc<dyn MemberDirectory>,
    ) -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            state: RwLock::new(ClientState::Initial),
            smart_routing,
            async_start,
            reconnect_mode,
            load_balancer,
            members,
        }
    }

    /// Returns true if the client routes requests to their owners.
    pub fn is_smart_routing(&self) -> bool {
        self.smart_routing
    }

    /// Returns the connection to the given member.
    pub fn get_connection(&self, member_uuid: Uuid) -> Option<Arc<Connection>> {
        self.read()
            .iter()
            .find(|(uuid, _)| *uuid == member_uuid)
            .map(|(_, connection)| Arc::clone(connection))
    }

    /// Returns a connection for an untargeted invocation.
    ///
    /// With smart routing the load balancer picks the member; otherwise, or
    /// if the picked member has no connection, the first connection is used.
    pub fn get_random_connection(&self) -> Option<Arc<Connection>> {
        if self.smart_routing {
            let members = self.members.members();
            if let Some(member) = self.load_balancer.next(&members) {
                if let Some(connection) = self.get_connection(member.uuid()) {
                    return Some(connection);
                }
            }
        }
        self.read().first().map(|(_, connection)| Arc::clone(connection))
    }

    /// Returns every registered connection in registration order.
    pub fn get_connections(&self) -> Vec<Arc<Connection>> {
        self.read().iter().map(|(_, c)| Arc::clone(c)).collect()
    }

    /// Registers the connection to a member, replacing any previous one.
    pub fn set_connection(&self, member_uuid: Uuid, connection: Arc<Connection>) {
        let mut connections = self.write();
        match connections.iter_mut().find(|(uuid, _)| *uuid == member_uuid) {
            Some(entry) => entry.1 = connection,
            None => connections.push((member_uuid, connection)),
        }
    }

    /// Removes the member's entry if it still refers to `connection`.
    /// Returns true if an entry was removed.
    pub fn delete_connection(&self, member_uuid: Uuid, connection: &Connection) -> bool {
        let mut connections = self.write();
        let before = connections.len();
        connections.retain(|(uuid, c)| !(*uuid == member_uuid && c.id() == connection.id()));
        connections.len() != before
    }

    /// Returns true if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns the number of registered connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns the client state.
    pub fn client_state(&self) -> ClientState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the client state.
    pub fn set_client_state(&self, state: ClientState) {
        let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *current != state {
            tracing::debug!(from = %*current, to = %state, "client state changed");
            *current = state;
        }
    }

    /// Decides whether a non-urgent invocation may be sent now.
    pub fn check_if_invocation_allowed(&self) -> Result<()> {
        let state = self.client_state();
        if state == ClientState::InitializedOnCluster && !self.is_empty() {
            return Ok(());
        }

        if state == ClientState::Initial {
            if self.async_start {
                return Err(HazelcastError::ClientOffline(
                    "client is not connected to the cluster yet".to_string(),
                ));
            }
            return Err(HazelcastError::Connection(
                "no connection found to cluster since the client is starting".to_string(),
            ));
        }

        if self.reconnect_mode.is_async() {
            return Err(HazelcastError::ClientOffline(
                "client is reconnecting to the cluster".to_string(),
            ));
        }
        Err(HazelcastError::Connection(
            "no connection found to cluster".to_string(),
        ))
    }

    /// Picks a connection for a cluster-wide query.
    ///
    /// Prefers a random data member of the larger same-version group, then
    /// the first connection to a data member, then any connection. This is a
    /// best-effort hint.
    pub fn connection_for_sql(&self) -> Result<Option<Arc<Connection>>> {
        if self.smart_routing {
            let members = self.members.members();
            for _ in 0..SQL_CONNECTION_RANDOM_ATTEMPTS {
                let Some(member) = member_of_larger_same_version_group(&members)? else {
                    break;
                };
                if let Some(connection) = self.get_connection(member.uuid()) {
                    return Ok(Some(connection));
                }
            }
        }

        let connections = self.get_connections();
        let data_member_connection = connections.iter().find(|c| {
            c.member_uuid()
                .and_then(|uuid| self.members.member(uuid))
                .is_some_and(|m| !m.is_lite_member())
        });
        Ok(data_member_connection
            .or_else(|| connections.first())
            .cloned())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(Uuid, Arc<Connection>)>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(Uuid, Arc<Connection>)>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Returns a random data member of the larger group of members sharing a
/// major.minor version; on a tie the newer version wins.
///
/// More than two distinct versions only occur mid rolling-upgrade and are
/// reported as an error.
pub fn member_of_larger_same_version_group(members: &[Member]) -> Result<Option<Member>> {
    let mut groups: [(Option<MemberVersion>, usize); 2] = [(None, 0), (None, 0)];

    for member in members.iter().filter(|m| !m.is_lite_member()) {
        let version = member.version().without_patch();
        match groups.iter_mut().find(|(v, _)| v.is_none() || *v == Some(version)) {
            Some(group) => {
                group.0 = Some(version);
                group.1 += 1;
            }
            None => {
                return Err(HazelcastError::IllegalState(format!(
                    "more than 2 distinct member versions found: {}, {}, {}",
                    groups[0].0.unwrap_or_default(),
                    groups[1].0.unwrap_or_default(),
                    version
                )));
            }
        }
    }

    let [(v0, c0), (v1, c1)] = groups;
    let (version, count) = if c0 > c1 || (c0 == c1 && v0 > v1) {
        (v0, c0)
    } else {
        (v1, c1)
    };
    let Some(version) = version else {
        return Ok(None);
    };

    let pick = rand::thread_rng().gen_range(0..count);
    Ok(members
        .iter()
        .filter(|m| !m.is_lite_member() && m.version().without_patch() == version)
        .nth(pick)
        .cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemberList;
    use crate::connection::connection::tests::{test_connection, RecordingHandler};
    use crate::connection::load_balancer::RoundRobinLoadBalancer;

    fn member(port: u16, version: (u8, u8, u8)) -> Member {
        Member::new(Uuid::new_v4(), format!("127.0.0.1:{port}").parse().unwrap())
            .with_version(MemberVersion::new(version.0, version.1, version.2))
    }

    fn new_registry(
        smart_routing: bool,
        async_start: bool,
        reconnect_mode: ReconnectMode,
    ) -> (ConnectionRegistry, Arc<MemberList>) {
        let members = Arc::new(MemberList::new());
        let registry = ConnectionRegistry::new(
            smart_routing,
            async_start,
            reconnect_mode,
            Arc::new(RoundRobinLoadBalancer::new()),
            members.clone(),
        );
        (registry, members)
    }

    #[tokio::test]
    async fn test_initialized_with_connection_allows_invocations() {
        let (registry, _) = new_registry(true, false, ReconnectMode::On);
        let handler = Arc::new(RecordingHandler::default());
        let (connection, _peer) = test_connection(&handler);

        registry.set_connection(Uuid::new_v4(), connection);
        registry.set_client_state(ClientState::InitializedOnCluster);
        assert!(registry.check_if_invocation_allowed().is_ok());
    }

    #[test]
    fn test_initial_state_admission() {
        let (registry, _) = new_registry(true, true, ReconnectMode::On);
        assert!(matches!(
            registry.check_if_invocation_allowed(),
            Err(HazelcastError::ClientOffline(_))
        ));

        let (registry, _) = new_registry(true, false, ReconnectMode::On);
        let err = registry.check_if_invocation_allowed().unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("starting"));
    }

    #[test]
    fn test_disconnected_state_admission() {
        let (registry, _) = new_registry(true, false, ReconnectMode::Async);
        registry.set_client_state(ClientState::DisconnectedFromCluster);
        assert!(matches!(
            registry.check_if_invocation_allowed(),
            Err(HazelcastError::ClientOffline(_))
        ));

        let (registry, _) = new_registry(true, false, ReconnectMode::On);
        registry.set_client_state(ClientState::DisconnectedFromCluster);
        assert!(registry.check_if_invocation_allowed().unwrap_err().is_io());

        // initialized but empty is not enough
        registry.set_client_state(ClientState::InitializedOnCluster);
        assert!(registry.check_if_invocation_allowed().is_err());
    }

    #[tokio::test]
    async fn test_set_get_delete_connection() {
        let (registry, _) = new_registry(true, false, ReconnectMode::On);
        let handler = Arc::new(RecordingHandler::default());
        let (first, _p1) = test_connection(&handler);
        let (second, _p2) = test_connection(&handler);
        let uuid = Uuid::new_v4();

        registry.set_connection(uuid, first.clone());
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get_connection(uuid).unwrap(), &first));

        assert!(!registry.delete_connection(Uuid::new_v4(), &first));
        assert!(registry.delete_connection(uuid, &first));
        assert!(registry.is_empty());
        assert!(!registry.delete_connection(uuid, &second));
    }

    #[tokio::test]
    async fn test_random_connection_uses_load_balancer() {
        let (registry, members) = new_registry(true, false, ReconnectMode::On);
        let handler = Arc::new(RecordingHandler::default());
        let a = member(5701, (5, 3, 0));
        let b = member(5702, (5, 3, 0));
        members.set_members(vec![a.clone(), b.clone()]);

        let (conn_b, _p) = test_connection(&handler);
        registry.set_connection(b.uuid(), conn_b.clone());

        // a has no connection, so the first connection is the fallback
        let first = registry.get_random_connection().unwrap();
        let second = registry.get_random_connection().unwrap();
        assert!(Arc::ptr_eq(&first, &conn_b));
        assert!(Arc::ptr_eq(&second, &conn_b));
    }

    #[tokio::test]
    async fn test_random_connection_without_smart_routing_is_first() {
        let (registry, _) = new_registry(false, false, ReconnectMode::On);
        assert!(registry.get_random_connection().is_none());

        let handler = Arc::new(RecordingHandler::default());
        let (first, _p1) = test_connection(&handler);
        let (second, _p2) = test_connection(&handler);
        registry.set_connection(Uuid::new_v4(), first.clone());
        registry.set_connection(Uuid::new_v4(), second);
        assert!(Arc::ptr_eq(&registry.get_random_connection().unwrap(), &first));
    }

    #[test]
    fn test_larger_same_version_group_wins() {
        let members = vec![
            member(5701, (5, 2, 0)),
            member(5702, (5, 3, 0)),
            member(5703, (5, 3, 1)),
        ];
        for _ in 0..10 {
            let picked = member_of_larger_same_version_group(&members).unwrap().unwrap();
            assert_eq!(picked.version().without_patch(), MemberVersion::new(5, 3, 0));
        }
    }

    #[test]
    fn test_equal_groups_prefer_newer_version() {
        let members = vec![member(5701, (5, 4, 0)), member(5702, (5, 3, 0))];
        let picked = member_of_larger_same_version_group(&members).unwrap().unwrap();
        assert_eq!(picked.version(), MemberVersion::new(5, 4, 0));

        let members = vec![member(5701, (5, 3, 0)), member(5702, (5, 4, 0))];
        let picked = member_of_larger_same_version_group(&members).unwrap().unwrap();
        assert_eq!(picked.version(), MemberVersion::new(5, 4, 0));
    }

    #[test]
    fn test_lite_members_are_ignored() {
        let members = vec![member(5701, (5, 3, 0)).with_lite_member(true)];
        assert!(member_of_larger_same_version_group(&members).unwrap().is_none());
        assert!(member_of_larger_same_version_group(&[]).unwrap().is_none());
    }

    #[test]
    fn test_three_versions_is_an_error() {
        let members = vec![
            member(5701, (5, 1, 0)),
            member(5702, (5, 2, 0)),
            member(5703, (5, 3, 0)),
        ];
        assert!(matches!(
            member_of_larger_same_version_group(&members),
            Err(HazelcastError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_for_sql_prefers_data_members() {
        let (registry, members) = new_registry(false, false, ReconnectMode::On);
        let handler = Arc::new(RecordingHandler::default());
        let lite = member(5701, (5, 3, 0)).with_lite_member(true);
        let data = member(5702, (5, 3, 0));
        members.set_members(vec![lite.clone(), data.clone()]);

        let (lite_conn, _p1) = test_connection(&handler);
        lite_conn.set_remote_identity(lite.uuid(), Uuid::new_v4());
        let (data_conn, _p2) = test_connection(&handler);
        data_conn.set_remote_identity(data.uuid(), Uuid::new_v4());
        registry.set_connection(lite.uuid(), lite_conn);
        registry.set_connection(data.uuid(), data_conn.clone());

        let picked = registry.connection_for_sql().unwrap().unwrap();
        assert!(Arc::ptr_eq(&picked, &data_conn));
    }

    #[test]
    fn test_client_state_display() {
        assert_eq!(ClientState::InitializedOnCluster.to_string(), "INITIALIZED_ON_CLUSTER");
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionRegistry>();
    }
}
