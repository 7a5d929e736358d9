//! A from-scratch async implementation of [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455)
//! for the Tokio stack: frame codec, message reassembly, and the
//! Open/Closing/Closed connection lifecycle.
//!
//! The crate is transport-agnostic — [`Endpoint`] wraps anything that's
//! `AsyncRead + AsyncWrite + Unpin`, so dialing a socket and wrapping it in
//! TLS both stay the caller's job. There is no background task or callback
//! registry: call [`Endpoint::next_message`] in a loop and match on the
//! [`Outcome`] it returns.

mod assembler;
mod close;
mod config;
mod endpoint;
pub mod error;
mod frame;
pub mod handshake;
mod mask;
mod message;
mod reader;
mod role;
mod split;
mod state;
mod writer;

pub use config::{ClientConfig, ServerConfig, WebSocketConfig};
pub use endpoint::{CloseCode, Endpoint, Outcome};
pub use error::Error;
pub use frame::OpCode;
pub use message::Message;
pub use role::Role;
pub use split::{EndpointReader, EndpointWriter};
pub use state::EndpointState;
