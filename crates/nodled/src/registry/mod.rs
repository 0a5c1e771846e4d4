//! Name registry using the Actor pattern.
//!
//! The registry is the single source of truth for which account names are
//! held by an active session. At most one session may hold a name at any
//! instant.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  RegistryCommand   ┌───────────────────┐
//! │ SessionHandler  │───(mpsc channel)──▶│ NameRegistryActor │
//! │  (per client)   │◀──(oneshot reply)──│ HashSet<Account-  │
//! └─────────────────┘                    │   Name> claimed   │
//!                                        └───────────────────┘
//! ```

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::NameRegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the name registry actor and return a handle for interaction.
///
/// The actor runs until every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use nodled::registry::spawn_name_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let names = spawn_name_registry();
///     let claimed = names.claimed_names().await;
///     assert!(claimed.is_empty());
/// }
/// ```
pub fn spawn_name_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = NameRegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
