//! Name registry actor - owns the set of claimed names.
//!
//! The actor is the single owner of claim state. It receives commands via
//! an mpsc channel and processes them sequentially, which is what makes
//! `TryClaim` atomic across all sessions.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info};

use nodle_core::AccountName;

use super::commands::RegistryCommand;

/// The name registry actor.
///
/// # Ownership
///
/// The actor owns `claimed`, the set of names held by authenticated
/// sessions. Nothing else can read or write it except through commands.
pub struct NameRegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Names currently held by a session
    claimed: HashSet<AccountName>,
}

impl NameRegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            claimed: HashSet::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!("Name registry starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(claimed = self.claimed.len(), "Name registry stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::TryClaim { name, respond_to } => {
                let claimed = self.handle_try_claim(name);
                // Ignore send error - the session may have gone away
                let _ = respond_to.send(claimed);
            }
            RegistryCommand::Release { name, respond_to } => {
                let released = self.handle_release(&name);
                let _ = respond_to.send(released);
            }
            RegistryCommand::ClaimedNames { respond_to } => {
                let mut names: Vec<_> = self.claimed.iter().cloned().collect();
                names.sort();
                let _ = respond_to.send(names);
            }
        }
    }

    fn handle_try_claim(&mut self, name: AccountName) -> bool {
        if self.claimed.contains(&name) {
            debug!(name = %name, "Name already claimed");
            return false;
        }

        debug!(name = %name, "Name claimed");
        self.claimed.insert(name)
    }

    fn handle_release(&mut self, name: &AccountName) -> bool {
        let released = self.claimed.remove(name);
        if released {
            debug!(name = %name, "Name released");
        }
        released
    }

    /// Returns the number of names currently claimed.
    #[cfg(test)]
    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }
}
