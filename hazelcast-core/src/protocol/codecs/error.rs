//! Error response codec.
//!
//! A failed request is answered with a message of type
//! [`EXCEPTION_MESSAGE_TYPE`] holding the server-side cause chain, outermost
//! first.

use bytes::BufMut;

use super::builtin::*;
use crate::error::{HazelcastError, Result};
use crate::protocol::constants::*;
use crate::protocol::{ClientMessage, Frame};

/// Protocol error codes the client core reacts to.
pub mod error_codes {
    /// Authentication failure.
    pub const AUTHENTICATION: i32 = 3;
    /// Caller is not a member.
    pub const CALLER_NOT_MEMBER: i32 = 8;
    /// Member not active (starting or shutting down).
    pub const HAZELCAST_INSTANCE_NOT_ACTIVE: i32 = 19;
    /// I/O failure.
    pub const IO: i32 = 22;
    /// Illegal state.
    pub const ILLEGAL_STATE: i32 = 27;
    /// Invalid configuration.
    pub const INVALID_CONFIGURATION: i32 = 32;
    /// Member left the cluster during the operation.
    pub const MEMBER_LEFT: i32 = 33;
    /// Operation timed out on the member.
    pub const OPERATION_TIMEOUT: i32 = 38;
    /// Partition is migrating.
    pub const PARTITION_MIGRATING: i32 = 39;
    /// Generic retryable failure.
    pub const RETRYABLE_HAZELCAST: i32 = 46;
    /// Retryable I/O failure.
    pub const RETRYABLE_IO: i32 = 47;
    /// Target member disconnected.
    pub const TARGET_DISCONNECTED: i32 = 52;
    /// Target is not a member.
    pub const TARGET_NOT_MEMBER: i32 = 53;
    /// Request reached the wrong member.
    pub const WRONG_TARGET: i32 = 62;
    /// Operation state is indeterminate.
    pub const INDETERMINATE_OPERATION_STATE: i32 = 80;
    /// Replication could not be performed.
    pub const CANNOT_REPLICATE: i32 = 90;
}

/// One element of the server-side cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorHolder {
    /// Protocol error code.
    pub error_code: i32,
    /// Server-side exception class name.
    pub class_name: String,
    /// Server-side message.
    pub message: Option<String>,
}

impl ErrorHolder {
    /// Creates an error holder.
    pub fn new(error_code: i32, class_name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            error_code,
            class_name: class_name.into(),
            message,
        }
    }
}

/// Builds an error response; used by member-side test doubles.
pub fn encode_error_response(correlation_id: i64, holders: &[ErrorHolder]) -> ClientMessage {
    let mut message = ClientMessage::create_for_response(EXCEPTION_MESSAGE_TYPE, correlation_id, 0);
    message.add_frame(Frame::begin_frame());
    for holder in holders {
        message.add_frame(Frame::begin_frame());
        let mut fixed = Frame::default();
        fixed.content.put_i32_le(holder.error_code);
        message.add_frame(fixed);
        encode_string(&mut message, &holder.class_name);
        encode_nullable_string(&mut message, holder.message.as_deref());
        // empty stack trace
        encode_string_list(&mut message, &[]);
        message.add_frame(Frame::end_frame());
    }
    message.add_frame(Frame::end_frame());
    message
}

/// Decodes the cause chain from an error response.
pub fn decode_error_response(message: &ClientMessage) -> Result<Vec<ErrorHolder>> {
    let mut iter = message.frame_iter();
    initial_content(&mut iter)?;

    let expect_begin = |frame: Option<&Frame>| {
        if frame.map(|f| f.is_begin_data_structure()).unwrap_or(false) {
            Ok(())
        } else {
            Err(HazelcastError::Protocol("malformed error response".into()))
        }
    };

    expect_begin(iter.next())?;
    let mut holders = Vec::new();
    while let Some(frame) = iter.peek() {
        if frame.is_end_data_structure() {
            iter.next();
            return Ok(holders);
        }
        expect_begin(iter.next())?;
        let error_code = decode_i32(initial_content(&mut iter)?, 0)?;
        let class_name = decode_string(&mut iter)?;
        let message = decode_nullable_string(&mut iter)?;
        iter.skip_to_struct_end();
        holders.push(ErrorHolder {
            error_code,
            class_name,
            message,
        });
    }
    Err(HazelcastError::Protocol("unterminated error response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_chain_survives_encoding() {
        let holders = vec![
            ErrorHolder::new(
                error_codes::TARGET_NOT_MEMBER,
                "com.hazelcast.spi.exception.TargetNotMemberException",
                Some("Not Member! target: 10.0.0.2:5701".to_string()),
            ),
            ErrorHolder::new(error_codes::IO, "java.io.IOException", None),
        ];
        let message = encode_error_response(12, &holders);
        assert_eq!(message.message_type(), Some(EXCEPTION_MESSAGE_TYPE));
        assert_eq!(message.correlation_id(), Some(12));
        assert_eq!(decode_error_response(&message).unwrap(), holders);
    }

    #[test]
    fn test_empty_chain() {
        let message = encode_error_response(1, &[]);
        assert!(decode_error_response(&message).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_response_is_rejected() {
        let message = ClientMessage::create_for_response(EXCEPTION_MESSAGE_TYPE, 1, 0);
        assert!(decode_error_response(&message).is_err());
    }
}
