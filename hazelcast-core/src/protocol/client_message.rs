//! ClientMessage type for multi-frame Hazelcast protocol messages.

use bytes::{BufMut, BytesMut};

use super::constants::*;
use super::frame::Frame;

/// A client message composed of one or more frames.
///
/// The first frame is the "initial frame" containing the message header
/// (type, correlation ID, and either the partition ID for requests and
/// events or the backup acknowledgement count for responses). Additional
/// frames contain the message payload.
///
/// Besides the frames, a message carries two local attributes that are
/// never written to the wire: whether the request is safe to retry, and
/// whether its payload holds serialized data that may reference schemas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientMessage {
    frames: Vec<Frame>,
    retryable: bool,
    contains_serialized_data: bool,
}

impl ClientMessage {
    /// Creates a new empty client message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request message with the given type and partition ID.
    ///
    /// The correlation ID is left at zero; the invocation service assigns it.
    pub fn create_for_encode(message_type: i32, partition_id: i32) -> Self {
        let mut initial_frame = Frame::with_capacity(REQUEST_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(0);
        initial_frame.content.put_i32_le(partition_id);
        Self::from_frames(vec![initial_frame])
    }

    /// Creates a request message targeting any partition.
    pub fn new_request(message_type: i32) -> Self {
        Self::create_for_encode(message_type, PARTITION_ID_ANY)
    }

    /// Creates a response message answering `correlation_id`.
    pub fn create_for_response(message_type: i32, correlation_id: i64, backup_acks: u8) -> Self {
        let mut initial_frame = Frame::with_capacity(RESPONSE_HEADER_SIZE, UNFRAGMENTED_MESSAGE);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(correlation_id);
        initial_frame.content.put_u8(backup_acks);
        Self::from_frames(vec![initial_frame])
    }

    /// Creates an event message delivered to the listener registered with
    /// `correlation_id`.
    pub fn create_for_event(message_type: i32, correlation_id: i64, flags: u16) -> Self {
        let mut initial_frame =
            Frame::with_capacity(EVENT_HEADER_SIZE, UNFRAGMENTED_MESSAGE | flags);
        initial_frame.content.put_i32_le(message_type);
        initial_frame.content.put_i64_le(correlation_id);
        initial_frame.content.put_i32_le(PARTITION_ID_ANY);
        Self::from_frames(vec![initial_frame])
    }

    /// Creates a client message from received frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            retryable: false,
            contains_serialized_data: false,
        }
    }

    fn read_header<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let content = &self.frames.first()?.content;
        content.get(offset..offset + N)?.try_into().ok()
    }

    fn write_header(&mut self, offset: usize, bytes: &[u8]) {
        if let Some(frame) = self.frames.first_mut() {
            if let Some(slot) = frame.content.get_mut(offset..offset + bytes.len()) {
                slot.copy_from_slice(bytes);
            }
        }
    }

    /// Returns the message type from the initial frame.
    ///
    /// Returns `None` if there is no initial frame or if the frame content
    /// is too short to contain a message type field.
    pub fn message_type(&self) -> Option<i32> {
        self.read_header(TYPE_FIELD_OFFSET).map(i32::from_le_bytes)
    }

    /// Returns the correlation ID from the initial frame.
    pub fn correlation_id(&self) -> Option<i64> {
        self.read_header(CORRELATION_ID_OFFSET).map(i64::from_le_bytes)
    }

    /// Sets the correlation ID in the initial frame.
    pub fn set_correlation_id(&mut self, correlation_id: i64) {
        self.write_header(CORRELATION_ID_OFFSET, &correlation_id.to_le_bytes());
    }

    /// Returns the partition ID from the initial frame (requests and events).
    pub fn partition_id(&self) -> Option<i32> {
        self.read_header(PARTITION_ID_OFFSET).map(i32::from_le_bytes)
    }

    /// Sets the partition ID in the initial frame.
    pub fn set_partition_id(&mut self, partition_id: i32) {
        self.write_header(PARTITION_ID_OFFSET, &partition_id.to_le_bytes());
    }

    /// Returns how many backup acknowledgements the primary replica expects
    /// to be sent to the client (responses only).
    pub fn number_of_backup_acks(&self) -> u8 {
        self.read_header::<1>(RESPONSE_BACKUP_ACKS_OFFSET)
            .map(|b| b[0])
            .unwrap_or(0)
    }

    /// Ors `flags` into the initial frame's flags.
    pub fn add_flags(&mut self, flags: u16) {
        if let Some(frame) = self.frames.first_mut() {
            frame.flags |= flags;
        }
    }

    fn start_frame_has(&self, check: fn(&Frame) -> bool) -> bool {
        self.frames.first().map(check).unwrap_or(false)
    }

    /// Returns true if this message is flagged as an event.
    pub fn is_event(&self) -> bool {
        self.start_frame_has(Frame::is_event_frame)
    }

    /// Returns true if this message is a backup acknowledgement event.
    pub fn is_backup_event(&self) -> bool {
        self.start_frame_has(Frame::is_backup_event_frame)
    }

    /// Returns true if the request asks for backup acknowledgements.
    pub fn is_backup_aware(&self) -> bool {
        self.start_frame_has(Frame::is_backup_aware)
    }

    /// Returns true if the start frame marks a complete, unfragmented message.
    pub fn is_unfragmented(&self) -> bool {
        self.start_frame_has(Frame::is_unfragmented)
    }

    /// Returns the fragmentation ID carried by a fragment's first frame.
    pub fn fragmentation_id(&self) -> Option<i64> {
        self.read_header(FRAGMENTATION_ID_OFFSET).map(i64::from_le_bytes)
    }

    /// Removes the fragmentation frame, returning it.
    pub fn drop_fragmentation_frame(&mut self) -> Option<Frame> {
        if self.frames.is_empty() {
            None
        } else {
            Some(self.frames.remove(0))
        }
    }

    /// Appends the frames of another fragment to this message.
    pub fn merge(&mut self, fragment: ClientMessage) {
        self.frames.extend(fragment.frames);
    }

    /// Returns true if the request can be retried after the target disconnected.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Marks the request as safe to retry after the target disconnected.
    pub fn set_retryable(&mut self, retryable: bool) {
        self.retryable = retryable;
    }

    /// Returns true if the request payload contains serialized user data.
    pub fn contains_serialized_data(&self) -> bool {
        self.contains_serialized_data
    }

    /// Records whether the request payload contains serialized user data.
    pub fn set_contains_serialized_data(&mut self, contains: bool) {
        self.contains_serialized_data = contains;
    }

    /// Adds a frame to the message.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Returns a reference to the initial (first) frame, if present.
    pub fn initial_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Returns a mutable reference to the initial frame, if present.
    pub fn initial_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.first_mut()
    }

    /// Returns a reference to all frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns an iterator over the frames, used by the decoders.
    pub fn frame_iter(&self) -> FrameIterator<'_> {
        FrameIterator {
            frames: &self.frames,
            position: 0,
        }
    }

    /// Returns the number of frames in the message.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if the message has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Calculates the total size of the message on the wire.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(Frame::frame_length).sum()
    }

    /// Writes all frames to the destination buffer, marking the last one final.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        let last = self.frames.len().saturating_sub(1);
        for (i, frame) in self.frames.iter().enumerate() {
            let extra = if i == last { IS_FINAL_FLAG } else { DEFAULT_FLAGS };
            frame.write_to(dst, extra);
        }
    }
}

/// Forward-only cursor over the frames of a message.
#[derive(Debug, Clone)]
pub struct FrameIterator<'a> {
    frames: &'a [Frame],
    position: usize,
}

impl<'a> FrameIterator<'a> {
    /// Returns the next frame without consuming it.
    pub fn peek(&self) -> Option<&'a Frame> {
        self.frames.get(self.position)
    }

    /// Returns true if frames remain.
    pub fn has_next(&self) -> bool {
        self.position < self.frames.len()
    }

    /// Skips frames up to and including the end of the current data structure.
    pub fn skip_to_struct_end(&mut self) {
        let mut depth = 1usize;
        while let Some(frame) = self.next() {
            if frame.is_end_data_structure() {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            } else if frame.is_begin_data_structure() {
                depth += 1;
            }
        }
    }
}

impl<'a> Iterator for FrameIterator<'a> {
    type Item = &'a Frame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.frames.get(self.position)?;
        self.position += 1;
        Some(frame)
    }
}
