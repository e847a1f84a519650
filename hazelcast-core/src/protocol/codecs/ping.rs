//! Heartbeat ping codec.

use crate::protocol::constants::*;
use crate::protocol::ClientMessage;

/// Builds the heartbeat ping request. The response carries no payload.
pub fn encode_ping_request() -> ClientMessage {
    let mut message = ClientMessage::new_request(CLIENT_PING);
    message.set_retryable(true);
    message
}

/// Builds the ping response; used by member-side test doubles.
pub fn encode_ping_response(correlation_id: i64) -> ClientMessage {
    ClientMessage::create_for_response(CLIENT_PING_RESPONSE, correlation_id, 0)
}
