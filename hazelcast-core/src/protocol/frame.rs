//! Frame type for the Hazelcast Open Binary Protocol.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;

/// A single frame in the Hazelcast protocol.
///
/// Each frame consists of:
/// - A 4-byte length field (little-endian), counting the whole frame
/// - A 2-byte flags field (little-endian)
/// - Variable-length content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame type and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new frame with content and default flags.
    pub fn with_content(content: BytesMut) -> Self {
        Self::new(content, DEFAULT_FLAGS)
    }

    /// Creates a new empty frame with the given flags.
    pub fn with_flags(flags: u16) -> Self {
        Self::new(BytesMut::new(), flags)
    }

    /// Creates a new frame with the given capacity and flags.
    pub fn with_capacity(capacity: usize, flags: u16) -> Self {
        Self::new(BytesMut::with_capacity(capacity), flags)
    }

    /// Creates a frame holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::with_content(BytesMut::from(data))
    }

    /// Creates a null frame (represents a null value).
    pub fn null_frame() -> Self {
        Self::with_flags(IS_NULL_FLAG)
    }

    /// Creates a frame opening a nested data structure.
    pub fn begin_frame() -> Self {
        Self::with_flags(BEGIN_DATA_STRUCTURE_FLAG)
    }

    /// Creates a frame closing a nested data structure.
    pub fn end_frame() -> Self {
        Self::with_flags(END_DATA_STRUCTURE_FLAG)
    }

    fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag == flag
    }

    /// Returns true if this frame starts a fragment.
    pub fn is_begin_fragment(&self) -> bool {
        self.has_flag(BEGIN_FRAGMENT_FLAG)
    }

    /// Returns true if this frame ends a fragment.
    pub fn is_end_fragment(&self) -> bool {
        self.has_flag(END_FRAGMENT_FLAG)
    }

    /// Returns true if this frame starts a message that is not fragmented.
    pub fn is_unfragmented(&self) -> bool {
        self.has_flag(UNFRAGMENTED_MESSAGE)
    }

    /// Returns true if this frame opens a nested data structure.
    pub fn is_begin_data_structure(&self) -> bool {
        self.has_flag(BEGIN_DATA_STRUCTURE_FLAG)
    }

    /// Returns true if this frame closes a nested data structure.
    pub fn is_end_data_structure(&self) -> bool {
        self.has_flag(END_DATA_STRUCTURE_FLAG)
    }

    /// Returns true if this frame has the NULL flag set.
    pub fn is_null_frame(&self) -> bool {
        self.has_flag(IS_NULL_FLAG)
    }

    /// Returns true if this frame has the FINAL flag set.
    pub fn is_final_frame(&self) -> bool {
        self.has_flag(IS_FINAL_FLAG)
    }

    /// Returns true if this frame has the EVENT flag set.
    pub fn is_event_frame(&self) -> bool {
        self.has_flag(IS_EVENT_FLAG)
    }

    /// Returns true if this frame has the BACKUP_EVENT flag set.
    pub fn is_backup_event_frame(&self) -> bool {
        self.has_flag(IS_BACKUP_EVENT_FLAG)
    }

    /// Returns true if this frame has the BACKUP_AWARE flag set.
    pub fn is_backup_aware(&self) -> bool {
        self.has_flag(IS_BACKUP_AWARE_FLAG)
    }

    /// Returns the size of this frame on the wire, which is also the value
    /// of its length field.
    pub fn frame_length(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }

    /// Writes this frame to the given buffer with `extra_flags` or-ed in.
    pub fn write_to(&self, dst: &mut BytesMut, extra_flags: u16) {
        dst.reserve(self.frame_length());
        dst.put_i32_le(self.frame_length() as i32);
        dst.put_u16_le(self.flags | extra_flags);
        dst.put_slice(&self.content);
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `Ok(None)` if there isn't enough data to read a complete frame,
    /// and an error if the length field is smaller than the frame header.
    pub fn read_from(src: &mut BytesMut) -> Result<Option<Self>, InvalidFrameLength> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let frame_length = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if frame_length < FRAME_HEADER_SIZE as i32 {
            return Err(InvalidFrameLength(frame_length));
        }
        let frame_length = frame_length as usize;
        if src.len() < frame_length {
            src.reserve(frame_length - src.len());
            return Ok(None);
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content = src.split_to(frame_length - FRAME_HEADER_SIZE);

        Ok(Some(Self::new(content, flags)))
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_flags(DEFAULT_FLAGS)
    }
}

/// A frame length field that cannot describe a valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFrameLength(pub i32);

impl std::fmt::Display for InvalidFrameLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid frame length {}", self.0)
    }
}
