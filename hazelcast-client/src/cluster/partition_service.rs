//! Partition ownership table.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use hazelcast_core::{HazelcastError, Result};

/// Resolves the member that owns a partition.
pub trait PartitionOracle: Send + Sync {
    /// Returns the owner of `partition_id`, or `None` if unknown.
    fn partition_owner(&self, partition_id: i32) -> Option<Uuid>;

    /// Returns the partition count, or 0 before the first authentication.
    fn partition_count(&self) -> i32;
}

impl std::fmt::Debug for dyn PartitionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PartitionOracle")
    }
}

#[derive(Debug, Default)]
struct TableState {
    partition_count: i32,
    owners: HashMap<i32, Uuid>,
}

/// In-memory partition table fed by whatever tracks partition ownership.
#[derive(Debug, Default)]
pub struct PartitionTable {
    state: RwLock<TableState>,
}

impl PartitionTable {
    /// Creates an empty partition table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the partition count reported by a member.
    ///
    /// The first count sticks for the lifetime of the client; a member
    /// reporting a different one belongs to a cluster this client cannot
    /// work with.
    pub fn check_partition_count(&self, count: i32) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.partition_count == 0 {
            state.partition_count = count;
            return Ok(());
        }
        if state.partition_count != count {
            return Err(HazelcastError::ClientNotAllowedInCluster(format!(
                "client can not work with this cluster because it has a different partition \
                 count; expected {}, member reported {count}",
                state.partition_count
            )));
        }
        Ok(())
    }

    /// Replaces the ownership table.
    pub fn apply(&self, owners: HashMap<i32, Uuid>) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).owners = owners;
    }

    /// Sets the owner of one partition.
    pub fn set_owner(&self, partition_id: i32, owner: Uuid) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .owners
            .insert(partition_id, owner);
    }

    /// Forgets ownership; the partition count is kept.
    pub fn reset(&self) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .owners
            .clear();
    }
}

impl PartitionOracle for PartitionTable {
    fn partition_owner(&self, partition_id: i32) -> Option<Uuid> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .owners
            .get(&partition_id)
            .copied()
    }

    fn partition_count(&self) -> i32 {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .partition_count
    }
}
