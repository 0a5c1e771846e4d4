//! Account storage contract.
//!
//! The store is the only component that touches durable state. Sessions
//! talk to it through [`AccountStore`], so the login protocol can run
//! against [`MemoryAccountStore`] in tests and against
//! [`FileAccountStore`](crate::FileAccountStore) in the daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{AccountName, Record, StoreError, StoreResult};

/// Edit applied by [`AccountStore::update`].
pub type RecordEdit = Box<dyn FnOnce(&mut Record) + Send>;

/// Storage for per-account records.
///
/// Implementations must serialize `create` and `update` so that two
/// concurrent creators of the same name cannot both succeed and no
/// record is ever observed half-written.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Returns whether a record exists for `name`.
    ///
    /// A missing record is `Ok(false)`; only genuine storage faults are errors.
    async fn exists(&self, name: &AccountName) -> StoreResult<bool>;

    /// Loads and parses the record for `name`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if there is no record
    /// - `StoreError::Corrupt` if the record text cannot be parsed
    /// - `StoreError::Io` on storage failure
    async fn load(&self, name: &AccountName) -> StoreResult<Record>;

    /// Creates a new account holding [`Record::new_account`] defaults.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyExists` if a record is already present
    /// - `StoreError::Io` on storage failure
    async fn create(&self, name: &AccountName, password: &str) -> StoreResult<()>;

    /// Applies `edit` to an existing record and persists the result.
    ///
    /// Groups the edit does not touch are written back unchanged.
    /// Returns the record as stored.
    async fn update(&self, name: &AccountName, edit: RecordEdit) -> StoreResult<Record>;

    /// Compares `candidate` against the stored `account.password`.
    ///
    /// Returns `Ok(false)` when the record, group, or key is absent.
    /// Corrupt records and storage faults are errors so the caller can
    /// report them.
    async fn verify_password(&self, name: &AccountName, candidate: &str) -> StoreResult<bool> {
        match self.load(name).await {
            Ok(record) => Ok(record.password() == Some(candidate)),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Account store kept entirely in memory.
///
/// Records are held as text and parsed on every load, the same way the
/// file store works, so corrupt input behaves identically.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: Mutex<HashMap<AccountName, String>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw record text for `name`, replacing anything already there.
    pub async fn insert_raw(&self, name: AccountName, text: impl Into<String>) {
        self.records.lock().await.insert(name, text.into());
    }

    /// Returns the raw record text for `name`.
    pub async fn raw(&self, name: &AccountName) -> Option<String> {
        self.records.lock().await.get(name).cloned()
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn parse_for(name: &AccountName, text: &str) -> StoreResult<Record> {
    Record::parse(text).map_err(|source| StoreError::Corrupt {
        name: name.clone(),
        source,
    })
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn exists(&self, name: &AccountName) -> StoreResult<bool> {
        Ok(self.records.lock().await.contains_key(name))
    }

    async fn load(&self, name: &AccountName) -> StoreResult<Record> {
        let records = self.records.lock().await;
        let text = records
            .get(name)
            .ok_or_else(|| StoreError::NotFound { name: name.clone() })?;
        parse_for(name, text)
    }

    async fn create(&self, name: &AccountName, password: &str) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(name) {
            return Err(StoreError::AlreadyExists { name: name.clone() });
        }
        records.insert(name.clone(), Record::new_account(password).to_string());
        Ok(())
    }

    async fn update(&self, name: &AccountName, edit: RecordEdit) -> StoreResult<Record> {
        let mut records = self.records.lock().await;
        let text = records
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound { name: name.clone() })?;
        let mut record = parse_for(name, text)?;
        edit(&mut record);
        *text = record.to_string();
        Ok(record)
    }
}
