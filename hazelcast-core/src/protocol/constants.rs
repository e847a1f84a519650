//! Protocol constants for the Hazelcast Open Binary Protocol.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags). The length field counts it.
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// First fragment of a (possibly fragmented) message.
pub const BEGIN_FRAGMENT_FLAG: u16 = 1 << 15;

/// Last fragment of a (possibly fragmented) message.
pub const END_FRAGMENT_FLAG: u16 = 1 << 14;

/// Marks the last frame of a message.
pub const IS_FINAL_FLAG: u16 = 1 << 13;

/// Opens a nested data structure.
pub const BEGIN_DATA_STRUCTURE_FLAG: u16 = 1 << 12;

/// Closes a nested data structure.
pub const END_DATA_STRUCTURE_FLAG: u16 = 1 << 11;

/// Null frame flag - indicates a null value.
pub const IS_NULL_FLAG: u16 = 1 << 10;

/// Event flag - indicates this is an event message.
pub const IS_EVENT_FLAG: u16 = 1 << 9;

/// Request opts into backup acknowledgements being sent to the client.
pub const IS_BACKUP_AWARE_FLAG: u16 = 1 << 8;

/// Backup acknowledgement event.
pub const IS_BACKUP_EVENT_FLAG: u16 = 1 << 7;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Flags of the initial frame of a message that is not fragmented.
pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT_FLAG | END_FRAGMENT_FLAG;

/// Offset of message type in initial frame content.
pub const TYPE_FIELD_OFFSET: usize = 0;

/// Offset of correlation ID in initial frame content.
pub const CORRELATION_ID_OFFSET: usize = TYPE_FIELD_OFFSET + 4;

/// Offset of partition ID in request and event initial frames.
pub const PARTITION_ID_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the request initial frame header.
pub const REQUEST_HEADER_SIZE: usize = PARTITION_ID_OFFSET + 4;

/// Size of the event initial frame header.
pub const EVENT_HEADER_SIZE: usize = REQUEST_HEADER_SIZE;

/// Offset of backup acks count in response initial frame.
pub const RESPONSE_BACKUP_ACKS_OFFSET: usize = CORRELATION_ID_OFFSET + 8;

/// Size of the response initial frame header.
pub const RESPONSE_HEADER_SIZE: usize = RESPONSE_BACKUP_ACKS_OFFSET + 1;

/// Offset of the fragmentation id in the first frame of a fragment.
pub const FRAGMENTATION_ID_OFFSET: usize = 0;

/// Partition ID indicating no specific partition (-1).
pub const PARTITION_ID_ANY: i32 = -1;

/// Bytes written once on every new connection before any message.
pub const PROTOCOL_PREAMBLE: &[u8; 3] = b"CP2";

/// Serialization version announced during authentication.
pub const SERIALIZATION_VERSION: u8 = 1;

/// Client type tag announced during authentication.
pub const CLIENT_TYPE: &str = "RST";

/// Client version announced during authentication.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

// Message types used by the connection core.

/// Message type of error responses.
pub const EXCEPTION_MESSAGE_TYPE: i32 = 0;

/// Client authentication request.
pub const CLIENT_AUTHENTICATION: i32 = 0x000100;

/// Client authentication response.
pub const CLIENT_AUTHENTICATION_RESPONSE: i32 = 0x000101;

/// Client authentication with custom credentials request.
pub const CLIENT_AUTHENTICATION_CUSTOM: i32 = 0x000200;

/// Client authentication with custom credentials response.
pub const CLIENT_AUTHENTICATION_CUSTOM_RESPONSE: i32 = 0x000201;

/// Heartbeat ping request.
pub const CLIENT_PING: i32 = 0x000B00;

/// Heartbeat ping response.
pub const CLIENT_PING_RESPONSE: i32 = 0x000B01;

/// Local backup listener registration request.
pub const CLIENT_LOCAL_BACKUP_LISTENER: i32 = 0x000F00;

/// Local backup listener registration response.
pub const CLIENT_LOCAL_BACKUP_LISTENER_RESPONSE: i32 = 0x000F01;

/// Backup acknowledgement event.
pub const CLIENT_BACKUP_EVENT: i32 = 0x000F02;
