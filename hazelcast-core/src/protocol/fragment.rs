//! Reassembly of fragmented client messages.

use std::collections::HashMap;

use super::ClientMessage;

/// Stitches fragments back into whole messages, keyed by fragmentation id.
///
/// A fragment's first frame carries the fragmentation id and the
/// BEGIN/END fragment flags; that frame is dropped and the remaining frames
/// are appended to the message started by the BEGIN fragment.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    in_progress: HashMap<i64, ClientMessage>,
}

impl FragmentAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one decoded message and returns a complete message if one is ready.
    ///
    /// Unfragmented messages are returned unchanged.
    pub fn accept(&mut self, mut message: ClientMessage) -> Option<ClientMessage> {
        if message.is_unfragmented() {
            return Some(message);
        }

        let fragmentation_id = message.fragmentation_id()?;
        let fragmentation_frame = message.drop_fragmentation_frame()?;

        if fragmentation_frame.is_begin_fragment() {
            self.in_progress.insert(fragmentation_id, message);
            return None;
        }

        // a fragment without its BEGIN part is dropped
        let existing = self.in_progress.get_mut(&fragmentation_id)?;
        existing.merge(message);

        if fragmentation_frame.is_end_fragment() {
            return self.in_progress.remove(&fragmentation_id);
        }
        None
    }

    /// Returns the number of messages still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.in_progress.len()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::protocol::constants::*;
    use crate::protocol::Frame;

    fn fragment(id: i64, flags: u16, payload: &[u8]) -> ClientMessage {
        let mut header = Frame::with_flags(flags);
        header.content.put_i64_le(id);
        let mut message = ClientMessage::from_frames(vec![header]);
        message.add_frame(Frame::from_slice(payload));
        message
    }

    #[test]
    fn test_unfragmented_passes_through() {
        let mut assembler = FragmentAssembler::new();
        let message = ClientMessage::new_request(CLIENT_PING);
        assert_eq!(assembler.accept(message.clone()), Some(message));
    }

    #[test]
    fn test_reassembles_three_fragments() {
        let mut assembler = FragmentAssembler::new();
        assert!(assembler
            .accept(fragment(1, BEGIN_FRAGMENT_FLAG, b"a"))
            .is_none());
        assert!(assembler.accept(fragment(1, DEFAULT_FLAGS, b"b")).is_none());
        assert_eq!(assembler.pending(), 1);

        let whole = assembler
            .accept(fragment(1, END_FRAGMENT_FLAG, b"c"))
            .unwrap();
        let payloads: Vec<&[u8]> = whole.frames().iter().map(|f| &f.content[..]).collect();
        assert_eq!(payloads, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_orphan_fragment_is_dropped() {
        let mut assembler = FragmentAssembler::new();
        assert!(assembler
            .accept(fragment(8, END_FRAGMENT_FLAG, b"z"))
            .is_none());
        assert_eq!(assembler.pending(), 0);
    }
}
