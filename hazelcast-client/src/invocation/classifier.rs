//! Error classification for retry and failover decisions.

use hazelcast_core::protocol::codecs::{error_codes, ErrorHolder};
use hazelcast_core::HazelcastError;

/// Decides how the client reacts to a failure.
pub trait ErrorClassifier: Send + Sync + std::fmt::Debug {
    /// Returns true if an invocation that failed with `error` may be sent again.
    fn is_retryable(&self, error: &HazelcastError) -> bool;

    /// Returns true if `error` rules out the whole candidate cluster, so the
    /// remaining addresses of that cluster are not tried.
    fn is_fatal_for_cluster(&self, error: &HazelcastError) -> bool;
}

/// Classifier used unless the client is given another one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorClassifier;

impl ErrorClassifier for DefaultErrorClassifier {
    fn is_retryable(&self, error: &HazelcastError) -> bool {
        matches!(
            error,
            HazelcastError::Connection(_)
                | HazelcastError::Io(_)
                | HazelcastError::Retryable(_)
                | HazelcastError::TargetNotMember(_)
                | HazelcastError::InstanceNotActive(_)
        )
    }

    fn is_fatal_for_cluster(&self, error: &HazelcastError) -> bool {
        matches!(
            error,
            HazelcastError::ClientNotAllowedInCluster(_) | HazelcastError::Configuration(_)
        )
    }
}

/// Converts a server-side cause chain into a client error, based on the
/// outermost cause.
pub fn error_from_holders(holders: &[ErrorHolder]) -> HazelcastError {
    let Some(holder) = holders.first() else {
        return HazelcastError::Protocol("error response without causes".to_string());
    };

    let message = match &holder.message {
        Some(message) => format!("{}: {}", holder.class_name, message),
        None => holder.class_name.clone(),
    };

    match holder.error_code {
        error_codes::IO | error_codes::RETRYABLE_IO => HazelcastError::Connection(message),
        error_codes::RETRYABLE_HAZELCAST
        | error_codes::MEMBER_LEFT
        | error_codes::PARTITION_MIGRATING
        | error_codes::CALLER_NOT_MEMBER
        | error_codes::WRONG_TARGET
        | error_codes::CANNOT_REPLICATE => HazelcastError::Retryable(message),
        error_codes::TARGET_NOT_MEMBER => HazelcastError::TargetNotMember(message),
        error_codes::TARGET_DISCONNECTED => HazelcastError::TargetDisconnected(message),
        error_codes::HAZELCAST_INSTANCE_NOT_ACTIVE => HazelcastError::InstanceNotActive(message),
        error_codes::AUTHENTICATION => HazelcastError::Authentication(message),
        error_codes::OPERATION_TIMEOUT => HazelcastError::Timeout(message),
        error_codes::INDETERMINATE_OPERATION_STATE => {
            HazelcastError::IndeterminateOperationState(message)
        }
        error_codes::ILLEGAL_STATE => HazelcastError::IllegalState(message),
        error_codes::INVALID_CONFIGURATION => HazelcastError::Configuration(message),
        code => HazelcastError::Remote {
            code,
            class_name: holder.class_name.clone(),
            message: holder.message.clone().unwrap_or_default(),
        },
    }
}
