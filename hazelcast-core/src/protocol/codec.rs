//! Codec implementation for encoding/decoding Hazelcast protocol messages.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::Frame;
use super::ClientMessage;
use crate::error::{HazelcastError, Result};

/// Codec for encoding and decoding Hazelcast client messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. Decoding yields one message per IS_FINAL frame;
/// fragmented messages come out fragment by fragment and are stitched
/// together by [`FragmentAssembler`](super::FragmentAssembler).
#[derive(Debug, Default)]
pub struct ClientMessageCodec {
    /// Frames accumulated while decoding a multi-frame message.
    pending_frames: Vec<Frame>,
}

impl ClientMessageCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder<ClientMessage> for ClientMessageCodec {
    type Error = HazelcastError;

    fn encode(&mut self, item: ClientMessage, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(HazelcastError::Protocol(
                "cannot encode empty message".to_string(),
            ));
        }

        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientMessageCodec {
    type Item = ClientMessage;
    type Error = HazelcastError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let frame = match Frame::read_from(src) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(e) => return Err(HazelcastError::Protocol(e.to_string())),
            };

            let is_final = frame.is_final_frame();
            self.pending_frames.push(frame);

            if is_final {
                let frames = std::mem::take(&mut self.pending_frames);
                return Ok(Some(ClientMessage::from_frames(frames)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    #[test]
    fn test_encode_decode_preserves_header() {
        let mut codec = ClientMessageCodec::new();
        let mut original = ClientMessage::create_for_encode(CLIENT_PING, 9);
        original.set_correlation_id(1234);

        let mut buf = BytesMut::new();
        codec.encode(original, &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), Some(CLIENT_PING));
        assert_eq!(decoded.correlation_id(), Some(1234));
        assert_eq!(decoded.partition_id(), Some(9));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_empty_message_fails() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::new();

        let result = codec.encode(ClientMessage::new(), &mut buf);
        assert!(matches!(result, Err(HazelcastError::Protocol(_))));
    }

    #[test]
    fn test_decode_waits_for_final_frame() {
        let mut codec = ClientMessageCodec::new();
        let mut msg = ClientMessage::new_request(CLIENT_AUTHENTICATION);
        msg.add_frame(Frame::from_slice(b"dev"));
        msg.add_frame(Frame::from_slice(b"admin"));

        let mut encoded = BytesMut::new();
        codec.encode(msg, &mut encoded).unwrap();

        let first_frame_len = REQUEST_HEADER_SIZE + FRAME_HEADER_SIZE;
        let mut buf = encoded.split_to(first_frame_len);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.unsplit(encoded);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.frame_count(), 3);
        assert_eq!(&decoded.frames()[1].content[..], b"dev");
    }

    #[test]
    fn test_decode_multiple_messages() {
        let mut codec = ClientMessageCodec::new();

        let mut buf = BytesMut::new();
        codec
            .encode(ClientMessage::new_request(CLIENT_PING), &mut buf)
            .unwrap();
        codec
            .encode(ClientMessage::create_for_response(CLIENT_PING_RESPONSE, 7, 0), &mut buf)
            .unwrap();

        let decoded1 = codec.decode(&mut buf).unwrap().unwrap();
        let decoded2 = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded1.message_type(), Some(CLIENT_PING));
        assert_eq!(decoded2.message_type(), Some(CLIENT_PING_RESPONSE));
        assert_eq!(decoded2.correlation_id(), Some(7));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_rejects_corrupt_length() {
        let mut codec = ClientMessageCodec::new();
        let mut buf = BytesMut::from(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x20][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(HazelcastError::Protocol(_))
        ));
    }

    #[test]
    fn test_partial_then_complete_decode() {
        let mut codec = ClientMessageCodec::new();

        let mut full_buf = BytesMut::new();
        codec
            .encode(ClientMessage::new_request(CLIENT_PING), &mut full_buf)
            .unwrap();

        let split_point = full_buf.len() / 2;
        let mut partial_buf = full_buf.split_to(split_point);
        assert!(codec.decode(&mut partial_buf).unwrap().is_none());

        partial_buf.unsplit(full_buf);
        let decoded = codec.decode(&mut partial_buf).unwrap().unwrap();
        assert_eq!(decoded.message_type(), Some(CLIENT_PING));
    }
}
