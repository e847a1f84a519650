//! Local view of cluster membership.

use std::collections::HashSet;
use std::sync::RwLock;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::listener::{Member, MemberEvent};

/// Read access to the members the client currently knows about.
pub trait MemberDirectory: Send + Sync {
    /// Returns the known members in cluster order.
    fn members(&self) -> Vec<Member>;

    /// Returns the member with the given uuid.
    fn member(&self, uuid: Uuid) -> Option<Member>;
}

impl std::fmt::Debug for dyn MemberDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MemberDirectory")
    }
}

/// In-memory member list fed by whatever tracks the cluster's member view.
///
/// Replacing the list publishes one [`MemberEvent`] per joined or departed
/// member; the connection manager closes connections to departed members.
#[derive(Debug)]
pub struct MemberList {
    members: RwLock<Vec<Member>>,
    events: broadcast::Sender<MemberEvent>,
}

impl MemberList {
    /// Creates an empty member list.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            members: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Subscribes to membership changes.
    pub fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }

    /// Replaces the member view and publishes the differences.
    pub fn set_members(&self, members: Vec<Member>) {
        let previous = {
            let mut guard = self.members.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, members.clone())
        };

        let old: HashSet<Uuid> = previous.iter().map(Member::uuid).collect();
        let new: HashSet<Uuid> = members.iter().map(Member::uuid).collect();

        for member in previous.into_iter().filter(|m| !new.contains(&m.uuid())) {
            tracing::info!(member = %member, "member removed");
            let _ = self.events.send(MemberEvent::member_removed(member));
        }
        for member in members.into_iter().filter(|m| !old.contains(&m.uuid())) {
            tracing::info!(member = %member, "member added");
            let _ = self.events.send(MemberEvent::member_added(member));
        }
    }

    /// Forgets every member without publishing events; used when the client
    /// switches to another cluster.
    pub fn reset(&self) {
        self.members
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Returns the number of known members.
    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if no member is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemberList {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberDirectory for MemberList {
    fn members(&self) -> Vec<Member> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn member(&self, uuid: Uuid) -> Option<Member> {
        self.members
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|m| m.uuid() == uuid)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::MemberEventType;

    fn member(port: u16) -> Member {
        Member::new(Uuid::new_v4(), format!("127.0.0.1:{port}").parse().unwrap())
    }

    #[test]
    fn test_lookup() {
        let list = MemberList::new();
        let a = member(5701);
        list.set_members(vec![a.clone(), member(5702)]);

        assert_eq!(list.len(), 2);
        assert_eq!(list.member(a.uuid()), Some(a));
        assert!(list.member(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_set_members_publishes_differences() {
        let list = MemberList::new();
        let a = member(5701);
        let b = member(5702);
        let c = member(5703);
        list.set_members(vec![a.clone(), b.clone()]);

        let mut events = list.subscribe();
        list.set_members(vec![a, c.clone()]);

        let first = events.recv().await.unwrap();
        assert_eq!(first.event_type, MemberEventType::Removed);
        assert_eq!(first.member, b);

        let second = events.recv().await.unwrap();
        assert_eq!(second.event_type, MemberEventType::Added);
        assert_eq!(second.member, c);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_reset_is_silent() {
        let list = MemberList::new();
        list.set_members(vec![member(5701)]);
        let mut events = list.subscribe();

        list.reset();
        assert!(list.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_member_list_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemberList>();
    }
}
