//! Local backup listener codec.
//!
//! Smart clients register this listener on every connection; members then
//! send one backup event per completed backup of a backup-aware request,
//! carrying the correlation id of that request.

use bytes::BufMut;
use uuid::Uuid;

use super::builtin::*;
use crate::error::{HazelcastError, Result};
use crate::protocol::constants::*;
use crate::protocol::ClientMessage;

const EVENT_SOURCE_CORRELATION_ID_OFFSET: usize = EVENT_HEADER_SIZE;

/// Builds the listener registration request.
pub fn encode_backup_listener_request() -> ClientMessage {
    ClientMessage::new_request(CLIENT_LOCAL_BACKUP_LISTENER)
}

/// Builds the registration response; used by member-side test doubles.
pub fn encode_backup_listener_response(correlation_id: i64, registration_id: Uuid) -> ClientMessage {
    let mut message =
        ClientMessage::create_for_response(CLIENT_LOCAL_BACKUP_LISTENER_RESPONSE, correlation_id, 0);
    if let Some(initial) = message.initial_frame_mut() {
        encode_uuid(&mut initial.content, Some(registration_id));
    }
    message
}

/// Decodes the registration id from the registration response.
pub fn decode_backup_listener_response(message: &ClientMessage) -> Result<Option<Uuid>> {
    let mut iter = message.frame_iter();
    decode_uuid(initial_content(&mut iter)?, RESPONSE_HEADER_SIZE)
}

/// Builds a backup event for the listener registered under
/// `listener_correlation_id`, acknowledging `source_correlation_id`.
pub fn encode_backup_event(listener_correlation_id: i64, source_correlation_id: i64) -> ClientMessage {
    let mut message = ClientMessage::create_for_event(
        CLIENT_BACKUP_EVENT,
        listener_correlation_id,
        IS_EVENT_FLAG | IS_BACKUP_EVENT_FLAG,
    );
    if let Some(initial) = message.initial_frame_mut() {
        initial.content.put_i64_le(source_correlation_id);
    }
    message
}

/// Decodes the acknowledged request's correlation id from a backup event.
pub fn decode_backup_event(message: &ClientMessage) -> Result<i64> {
    if message.message_type() != Some(CLIENT_BACKUP_EVENT) {
        return Err(HazelcastError::Protocol(format!(
            "unexpected backup event type {:?}",
            message.message_type()
        )));
    }
    let mut iter = message.frame_iter();
    decode_i64(initial_content(&mut iter)?, EVENT_SOURCE_CORRELATION_ID_OFFSET)
}
