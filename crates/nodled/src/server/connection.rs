//! Session handler for individual client connections.
//!
//! Each accepted connection gets its own `SessionHandler` that:
//! - Runs the login dialogue against the account store
//! - Claims the account name in the name registry
//! - Registers its outbound channel with the broadcaster
//! - Relays every further line to all authenticated clients
//! - Releases the name and channel when the client goes away
//!
//! # Login dialogue
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   SUBMITNAME ── name ──┬─ exists ── SUBMITPASS ── pass ───┼─ wrong / in use
//!                        │                           │      │
//!                        │                   ACCOUNTACCEPTED│
//!                        │                    NAMEACCEPTED  │
//!                        │                      (relay)     │
//!                        └─ unknown ── INVALIDNAME ── yes? ─┤ no
//!                                          │                │
//!                              SUBMITNEWPASS ── VERIFYPASS ─┤ MISMATCHPASS
//!                                          │                │
//!                                   ACCOUNTCREATED ─────────┘
//! ```
//!
//! Creating an account does not log the client in; it returns to
//! `SUBMITNAME` and the client logs in as usual.
//!
//! A closed connection at any prompt ends the session without sending
//! anything further. So does eviction by the broadcaster when the client
//! stops reading its chat lines.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use nodle_core::{AccountName, AccountStore, StoreError};
use nodle_protocol::{is_affirmative, ServerMessage};

use crate::broadcast::{Broadcaster, ChannelId, Outbound};
use crate::config::DEFAULT_MAX_LINE_LENGTH;
use crate::diagnostics::{DiagnosticEvent, DiagnosticKind, DiagnosticSink};
use crate::registry::{RegistryError, RegistryHandle};

/// Shared collaborators every session works against.
#[derive(Clone)]
pub struct SessionContext {
    /// Persisted account records
    pub accounts: Arc<dyn AccountStore>,

    /// Claimed-name registry
    pub names: RegistryHandle,

    /// Authenticated clients' outbound channels
    pub broadcaster: Broadcaster,

    /// Activity observer
    pub diagnostics: Arc<dyn DiagnosticSink>,

    /// Longest accepted client line
    pub max_line_length: usize,
}

impl SessionContext {
    /// Creates a context with the default line length limit.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        names: RegistryHandle,
        broadcaster: Broadcaster,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            accounts,
            names,
            broadcaster,
            diagnostics,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Sets the longest accepted client line.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }
}

/// Session handler for a single client.
pub struct SessionHandler<R> {
    /// Incoming lines
    lines: FramedRead<R, LinesCodec>,

    /// This client's outbound queue
    outbound: Outbound,

    /// Shared collaborators
    ctx: SessionContext,

    /// Number assigned by the listener, used in logs and diagnostics
    connection_number: u64,

    /// Name held in the registry, once claimed
    claimed: Option<AccountName>,

    /// Broadcast registration, once in the relay
    channel: Option<ChannelId>,
}

impl<R> SessionHandler<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Creates a new session handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the client connection
    /// * `outbound` - Queue feeding the write half (see `spawn_writer`)
    /// * `ctx` - Shared account store, name registry and broadcaster
    /// * `connection_number` - Unique number for this connection
    pub fn new(reader: R, outbound: Outbound, ctx: SessionContext, connection_number: u64) -> Self {
        let codec = LinesCodec::new_with_max_length(ctx.max_line_length);
        Self {
            lines: FramedRead::new(reader, codec),
            outbound,
            ctx,
            connection_number,
            claimed: None,
            channel: None,
        }
    }

    /// Runs the session until the client disconnects.
    ///
    /// Returns the account name the client was logged in as, if it got
    /// that far. By the time this returns the name has been released and
    /// the outbound channel unregistered.
    pub async fn run(mut self) -> Option<AccountName> {
        debug!(connection = self.connection_number, "New client connected");
        self.report(DiagnosticKind::ClientConnected);

        match self.serve().await {
            Ok(()) | Err(ConnectionError::Eof) => {
                debug!(connection = self.connection_number, "Client sent EOF");
            }
            Err(e) => {
                debug!(
                    connection = self.connection_number,
                    error = %e,
                    "Connection closed"
                );
            }
        }

        let name = self.claimed.clone();
        self.cleanup().await;

        info!(
            connection = self.connection_number,
            name = ?name.as_ref().map(AccountName::as_str),
            "Client disconnected"
        );
        name
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let name = self.authenticate().await?;
        self.enter_chat().await?;
        self.relay(&name).await
    }

    /// Loops over the login dialogue until a name is claimed.
    async fn authenticate(&mut self) -> Result<AccountName, ConnectionError> {
        loop {
            self.send(ServerMessage::SubmitName).await?;
            self.report(DiagnosticKind::LoginPrompted);

            let candidate = self.read_line().await?;

            let name = match AccountName::parse(&candidate) {
                Ok(name) => name,
                Err(e) => {
                    self.report(DiagnosticKind::NameRejected {
                        candidate,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let exists = match self.ctx.accounts.exists(&name).await {
                Ok(exists) => exists,
                Err(e) => {
                    self.report_store_fault(&e);
                    continue;
                }
            };

            if exists {
                if let Some(name) = self.login(name).await? {
                    return Ok(name);
                }
            } else {
                self.offer_account(name).await?;
            }
        }
    }

    /// Password step for an existing account.
    ///
    /// Returns the claimed name on success, `None` to restart the dialogue.
    async fn login(&mut self, name: AccountName) -> Result<Option<AccountName>, ConnectionError> {
        self.report(DiagnosticKind::UserExists {
            name: name.to_string(),
        });
        self.send(ServerMessage::SubmitPass).await?;

        let password = self.read_line().await?;

        match self.ctx.accounts.verify_password(&name, &password).await {
            Ok(true) => {}
            Ok(false) => {
                self.report(DiagnosticKind::PasswordRejected {
                    name: name.to_string(),
                });
                return Ok(None);
            }
            Err(e) => {
                self.report_store_fault(&e);
                return Ok(None);
            }
        }

        if !self.ctx.names.try_claim(name.clone()).await? {
            self.report(DiagnosticKind::NameInUse {
                name: name.to_string(),
            });
            return Ok(None);
        }
        self.claimed = Some(name.clone());

        self.report(DiagnosticKind::PasswordAccepted {
            name: name.to_string(),
        });
        self.send(ServerMessage::AccountAccepted).await?;

        Ok(Some(name))
    }

    /// Creation offer for an unknown account.
    async fn offer_account(&mut self, name: AccountName) -> Result<(), ConnectionError> {
        self.report(DiagnosticKind::CreationOffered {
            name: name.to_string(),
        });
        self.send(ServerMessage::InvalidName).await?;

        let answer = self.read_line().await?;
        if !is_affirmative(&answer) {
            self.report(DiagnosticKind::CreationDeclined {
                name: name.to_string(),
            });
            return Ok(());
        }

        self.send(ServerMessage::SubmitNewPass).await?;
        let password = self.read_line().await?;

        self.send(ServerMessage::VerifyPass).await?;
        let confirmation = self.read_line().await?;

        if password != confirmation {
            self.report(DiagnosticKind::PasswordMismatch {
                name: name.to_string(),
            });
            self.send(ServerMessage::MismatchPass).await?;
            return Ok(());
        }

        match self.ctx.accounts.create(&name, &password).await {
            Ok(()) => {
                self.report(DiagnosticKind::AccountCreated {
                    name: name.to_string(),
                });
                self.send(ServerMessage::AccountCreated).await?;
            }
            Err(e) => {
                self.report(DiagnosticKind::AccountCreationFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Acknowledges the login and joins the broadcast set.
    async fn enter_chat(&mut self) -> Result<(), ConnectionError> {
        // Queued before registering, so no broadcast can overtake it
        self.send(ServerMessage::NameAccepted).await?;

        let id = self.ctx.broadcaster.register(self.outbound.clone()).await;
        self.channel = Some(id);
        Ok(())
    }

    /// Relays lines until the client disconnects.
    async fn relay(&mut self, name: &AccountName) -> Result<(), ConnectionError> {
        loop {
            let text = match self.read_line().await {
                Ok(text) => text,
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            };

            let line = ServerMessage::message(name.as_str(), text.as_str()).to_string();
            let report = self.ctx.broadcaster.broadcast(&line).await;

            self.report(DiagnosticKind::ChatMessage {
                name: name.to_string(),
                text,
                delivered: report.delivered,
            });
        }
    }

    /// Releases everything this session holds in shared state.
    async fn cleanup(&mut self) {
        if let Some(id) = self.channel.take() {
            self.ctx.broadcaster.unregister(id).await;
        }

        let name = self.claimed.take();
        if let Some(name) = &name {
            if let Err(e) = self.ctx.names.release(name.clone()).await {
                warn!(
                    connection = self.connection_number,
                    name = %name,
                    error = %e,
                    "Failed to release name"
                );
            }
        }

        self.report(DiagnosticKind::ClientDisconnected {
            name: name.map(|n| n.to_string()),
        });
    }

    /// Reads the next line from the client.
    ///
    /// Fails with `Evicted` as soon as the broadcaster cuts this client off.
    async fn read_line(&mut self) -> Result<String, ConnectionError> {
        let next = tokio::select! {
            _ = self.outbound.evicted() => return Err(ConnectionError::Evicted),
            next = self.lines.next() => next,
        };

        match next {
            Some(Ok(line)) => Ok(line),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                Err(ConnectionError::LineTooLong {
                    max: self.ctx.max_line_length,
                })
            }
            Some(Err(LinesCodecError::Io(e))) => Err(ConnectionError::Io(e.to_string())),
            None => Err(ConnectionError::Eof),
        }
    }

    /// Queues a protocol message for this client.
    async fn send(&self, msg: ServerMessage) -> Result<(), ConnectionError> {
        self.outbound
            .send(msg.to_string())
            .await
            .map_err(|_| ConnectionError::OutboundClosed)
    }

    fn report(&self, kind: DiagnosticKind) {
        self.ctx
            .diagnostics
            .on_event(&DiagnosticEvent::now(self.connection_number, kind));
    }

    fn report_store_fault(&self, error: &StoreError) {
        self.report(DiagnosticKind::StoreFault {
            name: error.account().to_string(),
            reason: error.to_string(),
        });
    }

    /// Returns the connection number.
    pub fn connection_number(&self) -> u64 {
        self.connection_number
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Eof,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Outbound channel closed")]
    OutboundClosed,

    #[error("Evicted for not reading")]
    Evicted,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
