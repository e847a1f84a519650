//! Authentication request/response codecs.

use bytes::BufMut;
use uuid::Uuid;

use super::builtin::*;
use crate::error::{HazelcastError, Result};
use crate::protocol::constants::*;
use crate::protocol::{ClientMessage, Frame};

/// Credentials carried by an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCredentials {
    /// Plain username and password; both may be absent.
    UsernamePassword {
        /// Username, if any.
        username: Option<String>,
        /// Password, if any.
        password: Option<String>,
    },
    /// Opaque credential bytes (bearer tokens and custom credentials).
    Custom(Vec<u8>),
}

/// Outcome of an authentication attempt as reported by the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AuthenticationStatus {
    /// The client is authenticated.
    Authenticated = 0,
    /// The member rejected the credentials.
    CredentialsFailed = 1,
    /// The member uses a different serialization version.
    SerializationVersionMismatch = 2,
    /// The cluster does not accept this client.
    NotAllowedInCluster = 3,
}

impl AuthenticationStatus {
    /// Creates a status from its wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Authenticated),
            1 => Some(Self::CredentialsFailed),
            2 => Some(Self::SerializationVersionMismatch),
            3 => Some(Self::NotAllowedInCluster),
            _ => None,
        }
    }

    /// Returns the wire value of this status.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Parameters of a client authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    /// Name of the cluster the client wants to join.
    pub cluster_name: String,
    /// Credentials presented to the cluster.
    pub credentials: AuthCredentials,
    /// Identity of this client instance.
    pub client_uuid: Uuid,
    /// Client type tag.
    pub client_type: String,
    /// Serialization version spoken by the client.
    pub serialization_version: u8,
    /// Client library version.
    pub client_version: String,
    /// Display name of the client instance.
    pub client_name: String,
    /// Labels attached to the client instance.
    pub labels: Vec<String>,
}

const REQUEST_UUID_OFFSET: usize = REQUEST_HEADER_SIZE;
const REQUEST_SERIALIZATION_VERSION_OFFSET: usize = REQUEST_UUID_OFFSET + UUID_SIZE;

impl AuthenticationRequest {
    /// Encodes the request. Custom credentials select the custom
    /// authentication message type.
    pub fn encode(&self) -> ClientMessage {
        let message_type = match self.credentials {
            AuthCredentials::UsernamePassword { .. } => CLIENT_AUTHENTICATION,
            AuthCredentials::Custom(_) => CLIENT_AUTHENTICATION_CUSTOM,
        };
        let mut message = ClientMessage::new_request(message_type);
        message.set_retryable(true);
        if let Some(initial) = message.initial_frame_mut() {
            encode_uuid(&mut initial.content, Some(self.client_uuid));
            initial.content.put_u8(self.serialization_version);
        }

        encode_string(&mut message, &self.cluster_name);
        match &self.credentials {
            AuthCredentials::UsernamePassword { username, password } => {
                encode_nullable_string(&mut message, username.as_deref());
                encode_nullable_string(&mut message, password.as_deref());
            }
            AuthCredentials::Custom(bytes) => encode_bytes(&mut message, bytes),
        }
        encode_string(&mut message, &self.client_type);
        encode_string(&mut message, &self.client_version);
        encode_string(&mut message, &self.client_name);
        encode_string_list(&mut message, &self.labels);
        message
    }

    /// Decodes a request; used by member-side test doubles.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        let mut iter = message.frame_iter();
        let initial = initial_content(&mut iter)?;
        let client_uuid = decode_uuid(initial, REQUEST_UUID_OFFSET)?
            .ok_or_else(|| HazelcastError::Protocol("client uuid must not be null".into()))?;
        let serialization_version = decode_u8(initial, REQUEST_SERIALIZATION_VERSION_OFFSET)?;

        let cluster_name = decode_string(&mut iter)?;
        let credentials = match message.message_type() {
            Some(CLIENT_AUTHENTICATION_CUSTOM) => AuthCredentials::Custom(decode_bytes(&mut iter)?),
            _ => AuthCredentials::UsernamePassword {
                username: decode_nullable_string(&mut iter)?,
                password: decode_nullable_string(&mut iter)?,
            },
        };

        Ok(Self {
            cluster_name,
            credentials,
            client_uuid,
            serialization_version,
            client_type: decode_string(&mut iter)?,
            client_version: decode_string(&mut iter)?,
            client_name: decode_string(&mut iter)?,
            labels: decode_string_list(&mut iter)?,
        })
    }
}

/// Parameters of a client authentication response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResponse {
    /// Authentication outcome.
    pub status: AuthenticationStatus,
    /// Host and port of the answering member.
    pub address: Option<(String, u16)>,
    /// Identity of the answering member.
    pub member_uuid: Option<Uuid>,
    /// Serialization version spoken by the member.
    pub serialization_version: u8,
    /// Version string of the member.
    pub server_version: String,
    /// Number of partitions in the cluster.
    pub partition_count: i32,
    /// Identity of the cluster.
    pub cluster_id: Uuid,
    /// Whether the cluster supports client failover (enterprise feature).
    pub failover_supported: bool,
}

const RESPONSE_STATUS_OFFSET: usize = RESPONSE_HEADER_SIZE;
const RESPONSE_MEMBER_UUID_OFFSET: usize = RESPONSE_STATUS_OFFSET + BYTE_SIZE;
const RESPONSE_SERIALIZATION_VERSION_OFFSET: usize = RESPONSE_MEMBER_UUID_OFFSET + UUID_SIZE;
const RESPONSE_PARTITION_COUNT_OFFSET: usize = RESPONSE_SERIALIZATION_VERSION_OFFSET + BYTE_SIZE;
const RESPONSE_CLUSTER_ID_OFFSET: usize = RESPONSE_PARTITION_COUNT_OFFSET + INT_SIZE;
const RESPONSE_FAILOVER_SUPPORTED_OFFSET: usize = RESPONSE_CLUSTER_ID_OFFSET + UUID_SIZE;

impl AuthenticationResponse {
    /// Encodes the response; used by member-side test doubles.
    pub fn encode(&self, correlation_id: i64) -> ClientMessage {
        let mut message =
            ClientMessage::create_for_response(CLIENT_AUTHENTICATION_RESPONSE, correlation_id, 0);
        if let Some(initial) = message.initial_frame_mut() {
            initial.content.put_u8(self.status.code());
            encode_uuid(&mut initial.content, self.member_uuid);
            initial.content.put_u8(self.serialization_version);
            initial.content.put_i32_le(self.partition_count);
            encode_uuid(&mut initial.content, Some(self.cluster_id));
            initial.content.put_u8(u8::from(self.failover_supported));
        }

        match &self.address {
            Some((host, port)) => {
                message.add_frame(Frame::begin_frame());
                let mut port_frame = Frame::default();
                port_frame.content.put_i32_le(i32::from(*port));
                message.add_frame(port_frame);
                encode_string(&mut message, host);
                message.add_frame(Frame::end_frame());
            }
            None => message.add_frame(Frame::null_frame()),
        }
        encode_string(&mut message, &self.server_version);
        message
    }

    /// Decodes an authentication response.
    pub fn decode(message: &ClientMessage) -> Result<Self> {
        let mut iter = message.frame_iter();
        let initial = initial_content(&mut iter)?;

        let status_code = decode_u8(initial, RESPONSE_STATUS_OFFSET)?;
        let status = AuthenticationStatus::from_code(status_code).ok_or_else(|| {
            HazelcastError::Protocol(format!("unknown authentication status {status_code}"))
        })?;
        let member_uuid = decode_uuid(initial, RESPONSE_MEMBER_UUID_OFFSET)?;
        let serialization_version = decode_u8(initial, RESPONSE_SERIALIZATION_VERSION_OFFSET)?;
        let partition_count = decode_i32(initial, RESPONSE_PARTITION_COUNT_OFFSET)?;
        let cluster_id = decode_uuid(initial, RESPONSE_CLUSTER_ID_OFFSET)?.unwrap_or_else(Uuid::nil);
        let failover_supported = decode_bool(initial, RESPONSE_FAILOVER_SUPPORTED_OFFSET)?;

        let address = if next_is_null(&mut iter) {
            None
        } else {
            let begin = iter.next();
            if !begin.map(|f| f.is_begin_data_structure()).unwrap_or(false) {
                return Err(HazelcastError::Protocol("expected address begin frame".into()));
            }
            let port_frame = initial_content(&mut iter)?;
            let port = decode_i32(port_frame, 0)?;
            let host = decode_string(&mut iter)?;
            iter.skip_to_struct_end();
            let port = u16::try_from(port)
                .map_err(|_| HazelcastError::Protocol(format!("invalid port {port}")))?;
            Some((host, port))
        };
        let server_version = decode_string(&mut iter)?;

        Ok(Self {
            status,
            address,
            member_uuid,
            serialization_version,
            server_version,
            partition_count,
            cluster_id,
            failover_supported,
        })
    }
}
