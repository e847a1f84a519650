//! Schema metadata capability.
//!
//! Payloads in the compact format reference schemas by id. The client keeps
//! the schemas it has registered and must make sure the cluster knows them
//! before sending data that depends on them.

use async_trait::async_trait;

use hazelcast_core::Result;

/// Access to the schemas known to this client.
#[async_trait]
pub trait SchemaService: Send + Sync + std::fmt::Debug {
    /// Returns true if this client has registered any schema.
    fn has_schemas(&self) -> bool;

    /// Fetches a schema this client does not know yet from the cluster.
    async fn fetch_schema(&self, schema_id: i64) -> Result<()>;

    /// Sends every locally registered schema to the connected cluster.
    async fn send_all_schemas(&self) -> Result<()>;
}

/// Schema service for clients that never use the compact format.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSchemaService;

#[async_trait]
impl SchemaService for NoopSchemaService {
    fn has_schemas(&self) -> bool {
        false
    }

    async fn fetch_schema(&self, schema_id: i64) -> Result<()> {
        Err(hazelcast_core::HazelcastError::SchemaNotFound {
            schema_id,
            message: "no schema service is configured".to_string(),
        })
    }

    async fn send_all_schemas(&self) -> Result<()> {
        Ok(())
    }
}
