//! Diagnostic observer interface.
//!
//! Sessions report what they are doing (logins, rejections, account
//! creation, relayed chat) to a [`DiagnosticSink`]. A console or GUI is
//! just another sink; the protocol never depends on one being attached.
//! Passwords never appear in events.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A connection was accepted
    ClientConnected,
    /// The server asked for a name
    LoginPrompted,
    /// The candidate name is not a valid account name
    NameRejected { candidate: String, reason: String },
    /// The named account exists; asking for its password
    UserExists { name: String },
    /// The password matched and the name was claimed
    PasswordAccepted { name: String },
    /// The password did not match
    PasswordRejected { name: String },
    /// The password matched but another session holds the name
    NameInUse { name: String },
    /// The named account does not exist; offering to create it
    CreationOffered { name: String },
    /// The client declined to create the account
    CreationDeclined { name: String },
    /// The two new passwords differed
    PasswordMismatch { name: String },
    /// A new account record was written
    AccountCreated { name: String },
    /// Writing a new account record failed
    AccountCreationFailed { name: String, reason: String },
    /// A stored record could not be read or parsed
    StoreFault { name: String, reason: String },
    /// An authenticated line was relayed to all clients
    ChatMessage {
        name: String,
        text: String,
        delivered: usize,
    },
    /// The session ended
    ClientDisconnected { name: Option<String> },
}

impl DiagnosticKind {
    /// Stable snake_case identifier of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientConnected => "client_connected",
            Self::LoginPrompted => "login_prompted",
            Self::NameRejected { .. } => "name_rejected",
            Self::UserExists { .. } => "user_exists",
            Self::PasswordAccepted { .. } => "password_accepted",
            Self::PasswordRejected { .. } => "password_rejected",
            Self::NameInUse { .. } => "name_in_use",
            Self::CreationOffered { .. } => "creation_offered",
            Self::CreationDeclined { .. } => "creation_declined",
            Self::PasswordMismatch { .. } => "password_mismatch",
            Self::AccountCreated { .. } => "account_created",
            Self::AccountCreationFailed { .. } => "account_creation_failed",
            Self::StoreFault { .. } => "store_fault",
            Self::ChatMessage { .. } => "chat_message",
            Self::ClientDisconnected { .. } => "client_disconnected",
        }
    }

    /// Whether the event reports a fault rather than normal activity.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::AccountCreationFailed { .. } | Self::StoreFault { .. }
        )
    }
}

/// Human-readable detail, in the spirit of a server console.
impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientConnected => write!(f, "new client joined"),
            Self::LoginPrompted => write!(f, "asking for login information"),
            Self::NameRejected { candidate, reason } => {
                write!(f, "rejected name {candidate:?}: {reason}")
            }
            Self::UserExists { name } => write!(f, "user exists: {name}"),
            Self::PasswordAccepted { name } => write!(f, "password accepted for {name}"),
            Self::PasswordRejected { name } => write!(f, "wrong password for {name}"),
            Self::NameInUse { name } => write!(f, "{name} is already logged in"),
            Self::CreationOffered { name } => {
                write!(f, "user {name} does not exist, asking if it should be created")
            }
            Self::CreationDeclined { name } => write!(f, "creation of {name} declined"),
            Self::PasswordMismatch { name } => write!(f, "password mismatch creating {name}"),
            Self::AccountCreated { name } => write!(f, "account created: {name}"),
            Self::AccountCreationFailed { name, reason } => {
                write!(f, "could not create {name}: {reason}")
            }
            Self::StoreFault { name, reason } => write!(f, "record fault for {name}: {reason}"),
            Self::ChatMessage { name, text, .. } => write!(f, "{name}: {text}"),
            Self::ClientDisconnected { name: Some(name) } => {
                write!(f, "client disconnected: {name}")
            }
            Self::ClientDisconnected { name: None } => write!(f, "client disconnected"),
        }
    }
}

/// One reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Connection number the event belongs to
    pub connection: u64,
    /// When it was reported
    pub at: DateTime<Utc>,
    /// What happened
    pub kind: DiagnosticKind,
}

impl DiagnosticEvent {
    /// Creates an event stamped with the current time.
    pub fn now(connection: u64, kind: DiagnosticKind) -> Self {
        Self {
            connection,
            at: Utc::now(),
            kind,
        }
    }
}

/// Receiver of server activity events.
///
/// Called inline from session tasks, so implementations must be quick
/// and must not block.
pub trait DiagnosticSink: Send + Sync {
    fn on_event(&self, event: &DiagnosticEvent);
}

// ============================================================================
// Sinks
// ============================================================================

/// Routes events to `tracing`.
///
/// Faults log at `warn`, chat lines at `debug`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn on_event(&self, event: &DiagnosticEvent) {
        let kind = event.kind.kind();
        if event.kind.is_fault() {
            warn!(connection = event.connection, kind, "{}", event.kind);
        } else if matches!(event.kind, DiagnosticKind::ChatMessage { .. }) {
            debug!(connection = event.connection, kind, "{}", event.kind);
        } else {
            info!(connection = event.connection, kind, "{}", event.kind);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event received so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns the kinds of every event received so far.
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl DiagnosticSink for MemorySink {
    fn on_event(&self, event: &DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(DiagnosticKind::ClientConnected.kind(), "client_connected");
        assert_eq!(
            DiagnosticKind::StoreFault {
                name: "a".into(),
                reason: "b".into()
            }
            .kind(),
            "store_fault"
        );
    }

    #[test]
    fn test_detail_text() {
        let kind = DiagnosticKind::ChatMessage {
            name: "bob".into(),
            text: "hi".into(),
            delivered: 2,
        };
        assert_eq!(kind.to_string(), "bob: hi");
        assert_eq!(
            DiagnosticKind::UserExists {
                name: "alice".into()
            }
            .to_string(),
            "user exists: alice"
        );
    }

    #[test]
    fn test_faults() {
        assert!(DiagnosticKind::AccountCreationFailed {
            name: "x".into(),
            reason: "disk full".into()
        }
        .is_fault());
        assert!(!DiagnosticKind::PasswordRejected { name: "x".into() }.is_fault());
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.on_event(&DiagnosticEvent::now(1, DiagnosticKind::ClientConnected));
        sink.on_event(&DiagnosticEvent::now(1, DiagnosticKind::LoginPrompted));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.connection == 1));
        assert!(events[0].at <= events[1].at);
        assert_eq!(
            sink.kinds(),
            vec![DiagnosticKind::ClientConnected, DiagnosticKind::LoginPrompted]
        );
    }

    #[test]
    fn test_tracing_sink_accepts_all_kinds() {
        let sink = TracingSink;
        sink.on_event(&DiagnosticEvent::now(0, DiagnosticKind::ClientConnected));
        sink.on_event(&DiagnosticEvent::now(
            0,
            DiagnosticKind::StoreFault {
                name: "x".into(),
                reason: "y".into(),
            },
        ));
    }
}
