//! Client interface for interacting with the NameRegistryActor.
//!
//! The `RegistryHandle` is cheap to clone; every session holds one.
//! Channel failures are mapped to `RegistryError::ChannelClosed`.

use tokio::sync::{mpsc, oneshot};

use nodle_core::AccountName;

use super::commands::{RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the name registry actor.
///
/// # Usage
///
/// ```ignore
/// if names.try_claim(name.clone()).await? {
///     // this session now owns `name`
///     names.release(name).await?;
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Atomically claims `name` if no other session holds it.
    ///
    /// Returns `Ok(true)` if the caller now holds the name and
    /// `Ok(false)` if it was already claimed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_claim(&self, name: AccountName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::TryClaim {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Releases `name`. Returns whether it was held.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn release(&self, name: AccountName) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Release {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Returns every claimed name, sorted.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn claimed_names(&self) -> Vec<AccountName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ClaimedNames { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
