//! TCP listener for the chat daemon.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a writer task and a SessionHandler for each client
//! - Shares one account store, name registry and broadcaster across sessions
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │   (per client)  │────▶│  AccountStore   │
//! └───────┬─────────┘     └─────────────────┘
//!         │ broadcast
//!         ▼
//! ┌─────────────────┐
//! │   Broadcaster   │──▶ writer task (per client) ──▶ socket
//! └─────────────────┘
//! ```
//!
//! A failing session never takes the listener down; accept errors are
//! logged and the loop keeps going.

mod connection;

pub use connection::{ConnectionError, SessionContext, SessionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use nodle_core::AccountStore;

use crate::broadcast::{spawn_writer, Broadcaster};
use crate::config::ServerConfig;
use crate::diagnostics::DiagnosticSink;
use crate::registry::{spawn_name_registry, RegistryHandle};

/// TCP chat server.
pub struct ChatServer {
    /// Bound listening socket
    listener: TcpListener,

    /// Collaborators handed to every session
    ctx: SessionContext,

    /// Capacity of each client's outbound queue
    outbound_buffer: usize,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for numbering sessions
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket and starts the name registry.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen address and per-session limits
    /// * `accounts` - Account store shared by all sessions
    /// * `diagnostics` - Receiver of session activity
    /// * `cancel_token` - Token for graceful shutdown
    pub async fn bind(
        config: &ServerConfig,
        accounts: Arc<dyn AccountStore>,
        diagnostics: Arc<dyn DiagnosticSink>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        let ctx = SessionContext::new(
            accounts,
            spawn_name_registry(),
            Broadcaster::new(),
            diagnostics,
        )
        .with_max_line_length(config.max_line_length);

        Ok(Self {
            listener,
            ctx,
            outbound_buffer: config.outbound_buffer.max(1),
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    /// Returns a handle to the name registry.
    pub fn names(&self) -> RegistryHandle {
        self.ctx.names.clone()
    }

    /// Returns the broadcaster shared by all sessions.
    pub fn broadcaster(&self) -> Broadcaster {
        self.ctx.broadcaster.clone()
    }

    /// Runs the accept loop until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(addr = ?self.listener.local_addr().ok(), "Chat server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Spawns the writer and session tasks for a new client.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let (outbound, _writer_task) = spawn_writer(writer, self.outbound_buffer);
        let handler = SessionHandler::new(reader, outbound, self.ctx.clone(), connection_number);

        debug!(connection = connection_number, peer = %peer, "Accepted connection");

        tokio::spawn(async move {
            let name = handler.run().await;
            debug!(
                connection = connection_number,
                logged_in = name.is_some(),
                "Session task finished"
            );
        });
    }
}

/// Errors that can occur in the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use nodle_core::MemoryAccountStore;

    use crate::diagnostics::MemorySink;

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn bind_server(config: &ServerConfig, cancel: CancellationToken) -> ChatServer {
        ChatServer::bind(
            config,
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemorySink::new()),
            cancel,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = bind_server(&loopback_config(), CancellationToken::new()).await;
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = bind_server(&loopback_config(), CancellationToken::new()).await;
        let taken = first.local_addr().unwrap();

        let config = ServerConfig {
            port: taken.port(),
            ..loopback_config()
        };
        let result = ChatServer::bind(
            &config,
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemorySink::new()),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ServerError::Bind { addr, .. }) if addr == taken));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = bind_server(&loopback_config(), cancel.clone()).await;

        let task = tokio::spawn(async move { server.run().await });
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
