//! Error types for Hazelcast operations.

use std::io;
use thiserror::Error;

/// The main error type for Hazelcast operations.
#[derive(Debug, Error)]
pub enum HazelcastError {
    /// Transport-level failure (socket closed, write failed, no connection to target).
    #[error("connection error: {0}")]
    Connection(String),

    /// The member the request was sent to went away before answering.
    #[error("target disconnected: {0}")]
    TargetDisconnected(String),

    /// The targeted member is no longer part of the cluster.
    #[error("target not member: {0}")]
    TargetNotMember(String),

    /// Protocol-related errors (invalid messages, unsupported versions).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timeout errors.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Authentication errors (invalid credentials, serialization version mismatch).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The cluster refused this client (not allowed, partition count mismatch).
    #[error("client not allowed in cluster: {0}")]
    ClientNotAllowedInCluster(String),

    /// The operation may or may not have been applied on all replicas.
    #[error("indeterminate operation state: {0}")]
    IndeterminateOperationState(String),

    /// The client has been shut down.
    #[error("client not active: {0}")]
    ClientNotActive(String),

    /// The client is not connected to the cluster and cannot accept invocations.
    #[error("client offline: {0}")]
    ClientOffline(String),

    /// The remote member is shutting down or not yet started.
    #[error("instance not active: {0}")]
    InstanceNotActive(String),

    /// A transient server-side condition; the operation may be retried.
    #[error("retryable error: {0}")]
    Retryable(String),

    /// The request may reference schemas the cluster does not know yet.
    #[error("invocation might contain compact data: {0}")]
    InvocationMightContainCompactData(String),

    /// A response referenced a schema that is not known locally.
    #[error("schema {schema_id} not found: {message}")]
    SchemaNotFound {
        /// Identifier of the missing schema.
        schema_id: i64,
        /// Description of where the schema was needed.
        message: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A server-side error without a dedicated variant.
    #[error("remote error {code} ({class_name}): {message}")]
    Remote {
        /// Protocol error code.
        code: i32,
        /// Server-side exception class name.
        class_name: String,
        /// Server-side message.
        message: String,
    },

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HazelcastError {
    /// Returns true for transport failures of the I/O kind.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }

    /// Returns true for errors the server marks as safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Retryable(_)
                | Self::TargetNotMember(_)
                | Self::InstanceNotActive(_)
                | Self::InvocationMightContainCompactData(_)
        ) || self.is_io()
    }
}

impl Clone for HazelcastError {
    fn clone(&self) -> Self {
        match self {
            Self::Connection(m) => Self::Connection(m.clone()),
            Self::TargetDisconnected(m) => Self::TargetDisconnected(m.clone()),
            Self::TargetNotMember(m) => Self::TargetNotMember(m.clone()),
            Self::Protocol(m) => Self::Protocol(m.clone()),
            Self::Timeout(m) => Self::Timeout(m.clone()),
            Self::Authentication(m) => Self::Authentication(m.clone()),
            Self::ClientNotAllowedInCluster(m) => Self::ClientNotAllowedInCluster(m.clone()),
            Self::IndeterminateOperationState(m) => Self::IndeterminateOperationState(m.clone()),
            Self::ClientNotActive(m) => Self::ClientNotActive(m.clone()),
            Self::ClientOffline(m) => Self::ClientOffline(m.clone()),
            Self::InstanceNotActive(m) => Self::InstanceNotActive(m.clone()),
            Self::Retryable(m) => Self::Retryable(m.clone()),
            Self::InvocationMightContainCompactData(m) => {
                Self::InvocationMightContainCompactData(m.clone())
            }
            Self::SchemaNotFound { schema_id, message } => Self::SchemaNotFound {
                schema_id: *schema_id,
                message: message.clone(),
            },
            Self::IllegalState(m) => Self::IllegalState(m.clone()),
            Self::Configuration(m) => Self::Configuration(m.clone()),
            Self::Remote {
                code,
                class_name,
                message,
            } => Self::Remote {
                code: *code,
                class_name: class_name.clone(),
                message: message.clone(),
            },
            // io::Error is not Clone; keep its kind and text
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// A specialized `Result` type for Hazelcast operations.
pub type Result<T> = std::result::Result<T, HazelcastError>;
