//! Nodle Protocol - Wire protocol for the chat server
//!
//! The protocol is plain text, one message per newline-terminated line.
//! The server drives a login dialogue with fixed tokens (`SUBMITNAME`,
//! `SUBMITPASS`, ...), after which every line the client sends is relayed
//! to all authenticated clients as `MESSAGE <name>: <text>`.
//!
//! This crate provides the server message type with its exact wire form,
//! the parser clients use to read it back, and the consent rule for the
//! account creation prompt.

pub mod consent;
pub mod message;

pub use consent::is_affirmative;
pub use message::{ProtocolError, ServerMessage};

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 9001;
