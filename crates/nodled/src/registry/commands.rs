//! Name registry commands and errors.
//!
//! This module defines the message types for communicating with the
//! `NameRegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations

use nodle_core::AccountName;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the name registry actor.
///
/// Each command carries a oneshot sender for its response. The actor
/// handles commands one at a time, so a `TryClaim` check-and-insert can
/// never interleave with another claim or release.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim a name if nobody holds it.
    ///
    /// Responds `true` if the caller now holds the name, `false` if it
    /// was already claimed (the registry is left unchanged).
    TryClaim {
        /// Name to claim
        name: AccountName,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Release a claimed name.
    ///
    /// Responds `true` if the name was held. Releasing an unclaimed name
    /// is a no-op.
    Release {
        /// Name to release
        name: AccountName,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// List every currently claimed name, sorted.
    ClaimedNames {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<AccountName>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The actor stopped before answering.
    #[error("name registry channel closed")]
    ChannelClosed,
}
