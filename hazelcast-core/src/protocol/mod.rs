//! Hazelcast Open Binary Protocol implementation.
//!
//! This module provides the framing types for communicating with Hazelcast
//! clusters using the Open Binary Protocol, plus the codecs of the messages
//! the client core sends on its own behalf (authentication, heartbeat,
//! backup acknowledgements and error responses).

mod client_message;
mod codec;
pub mod codecs;
pub mod constants;
mod fragment;
mod frame;

pub use client_message::{ClientMessage, FrameIterator};
pub use codec::ClientMessageCodec;
pub use constants::*;
pub use fragment::FragmentAssembler;
pub use frame::{Frame, InvalidFrameLength};
