//! Cluster member descriptors and membership change events.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

/// Codebase version of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MemberVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u8,
}

impl MemberVersion {
    /// Creates a new member version.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns this version with the patch component dropped.
    pub fn without_patch(self) -> Self {
        Self::new(self.major, self.minor, 0)
    }
}

impl fmt::Display for MemberVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Represents a member of the Hazelcast cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    uuid: Uuid,
    address: SocketAddr,
    lite_member: bool,
    version: MemberVersion,
}

impl Member {
    /// Creates a new data member.
    pub fn new(uuid: Uuid, address: SocketAddr) -> Self {
        Self {
            uuid,
            address,
            lite_member: false,
            version: MemberVersion::default(),
        }
    }

    /// Marks the member as a lite member.
    pub fn with_lite_member(mut self, lite_member: bool) -> Self {
        self.lite_member = lite_member;
        self
    }

    /// Sets the member's codebase version.
    pub fn with_version(mut self, version: MemberVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns the member's UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the member's network address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns whether this is a lite member (holds no partitions).
    pub fn is_lite_member(&self) -> bool {
        self.lite_member
    }

    /// Returns the member's codebase version.
    pub fn version(&self) -> MemberVersion {
        self.version
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member[uuid={}, address={}]", self.uuid, self.address)?;
        if self.lite_member {
            f.write_str(" lite")?;
        }
        Ok(())
    }
}

/// Type of membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberEventType {
    /// A new member joined the cluster.
    Added,
    /// A member left the cluster.
    Removed,
}

impl fmt::Display for MemberEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Removed => write!(f, "REMOVED"),
        }
    }
}

/// An event fired when a cluster member joins or leaves.
#[derive(Debug, Clone)]
pub struct MemberEvent {
    /// The member that triggered the event.
    pub member: Member,
    /// The type of membership change.
    pub event_type: MemberEventType,
}

impl MemberEvent {
    /// Creates an event for a member that joined the cluster.
    pub fn member_added(member: Member) -> Self {
        Self {
            member,
            event_type: MemberEventType::Added,
        }
    }

    /// Creates an event for a member that left the cluster.
    pub fn member_removed(member: Member) -> Self {
        Self {
            member,
            event_type: MemberEventType::Removed,
        }
    }
}

impl fmt::Display for MemberEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberEvent[{} {}]", self.member, self.event_type)
    }
}
