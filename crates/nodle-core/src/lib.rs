//! Nodle Core - Account records and storage
//!
//! This crate provides the account model shared by the chat daemon
//! (nodled) and anything else that needs to read or write player records:
//! - `AccountName` - validated, case-sensitive account key
//! - `Record` - group/key/value data persisted per account
//! - `AccountStore` - storage contract with file and in-memory backends
//!
//! No production code in this crate panics: all fallible operations
//! return `Result` or `Option`.

pub mod account;
pub mod error;
pub mod file_store;
pub mod record;
pub mod store;

// Re-exports for convenience
pub use account::AccountName;
pub use error::{NameError, RecordParseError, StoreError, StoreResult};
pub use file_store::FileAccountStore;
pub use record::{Group, Record, ACCOUNT_GROUP, PASSWORD_KEY};
pub use store::{AccountStore, MemoryAccountStore, RecordEdit};
