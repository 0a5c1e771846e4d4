//! Nodle Daemon - Chat sessions, name registry and broadcast
//!
//! This crate provides the server side of the chat service:
//! - `server` - TCP listener and the per-connection login/relay state machine
//! - `registry` - Name registry actor enforcing one session per account
//! - `broadcast` - Outbound line queues and fan-out to authenticated clients
//! - `diagnostics` - Observer interface for server activity
//! - `config` - Server configuration (file, environment, defaults)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        nodled                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │     │   NameRegistryActor         │   │
//! │  │ (TcpListener)   │     │  (claimed names owner)      │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │ spawn per connection        │ claim/release    │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐─────────────────────┘                  │
//! │  │ SessionHandler  │────▶ AccountStore (records on disk)   │
//! │  │  (per client)   │                                        │
//! │  └────────┬────────┘     ┌─────────────────────────────┐   │
//! │           └─────────────▶│  Broadcaster                │   │
//! │                          │  (outbound queue per client)│   │
//! │                          └─────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Production code never panics: fallible operations return `Result`
//! or `Option`, and closed channels are handled as ordinary errors.

pub mod broadcast;
pub mod config;
pub mod diagnostics;
pub mod registry;
pub mod server;
