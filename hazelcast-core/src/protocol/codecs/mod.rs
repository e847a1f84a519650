//! Codecs for the messages the connection core exchanges itself.

pub mod auth;
pub mod backup;
pub mod builtin;
pub mod error;
pub mod ping;

pub use auth::{AuthCredentials, AuthenticationRequest, AuthenticationResponse, AuthenticationStatus};
pub use error::{error_codes, ErrorHolder};
