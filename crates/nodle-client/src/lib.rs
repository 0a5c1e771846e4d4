//! Client library for the nodle chat protocol.
//!
//! [`ChatClient`] speaks the line protocol over any async byte stream and
//! wraps the login and account-creation dialogues in single calls.

pub mod client;
pub mod error;

pub use client::{ChatClient, LoginOutcome, RegisterOutcome, TcpChatClient};
pub use error::{ClientError, Result};
