//! Directory-backed account store.
//!
//! One file per account, `<root>/<name>.ini`. Writes go to a temporary
//! sibling first and are renamed into place, so readers only ever see a
//! complete record. `create` and `update` share one store-wide lock;
//! account creation is rare enough that a coarse lock costs nothing.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{AccountName, AccountStore, Record, RecordEdit, StoreError, StoreResult};

/// File extension of persisted records.
const RECORD_EXTENSION: &str = "ini";

/// Account store keeping one record file per account under a directory.
#[derive(Debug)]
pub struct FileAccountStore {
    /// Directory holding the record files
    root: PathBuf,

    /// Serializes every write (create and read-modify-write)
    write_lock: Mutex<()>,
}

impl FileAccountStore {
    /// Creates a store rooted at `root`.
    ///
    /// The directory does not need to exist yet; it is created on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the directory holding the records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the record file for `name`.
    pub fn record_path(&self, name: &AccountName) -> PathBuf {
        self.root.join(format!("{}.{RECORD_EXTENSION}", name.as_str()))
    }

    fn temp_path(&self, name: &AccountName) -> PathBuf {
        self.root.join(format!(".{}.{RECORD_EXTENSION}.tmp", name.as_str()))
    }

    /// Writes `record` for `name` via temp file and rename.
    ///
    /// Callers must hold `write_lock`.
    async fn write_record(&self, name: &AccountName, record: &Record) -> StoreResult<()> {
        let io_err = |e: io::Error| StoreError::Io {
            name: name.clone(),
            reason: e.to_string(),
        };

        fs::create_dir_all(&self.root).await.map_err(io_err)?;

        let temp = self.temp_path(name);
        fs::write(&temp, record.to_string()).await.map_err(io_err)?;

        if let Err(e) = fs::rename(&temp, self.record_path(name)).await {
            let _ = fs::remove_file(&temp).await;
            return Err(io_err(e));
        }

        Ok(())
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn exists(&self, name: &AccountName) -> StoreResult<bool> {
        fs::try_exists(self.record_path(name))
            .await
            .map_err(|e| StoreError::Io {
                name: name.clone(),
                reason: e.to_string(),
            })
    }

    async fn load(&self, name: &AccountName) -> StoreResult<Record> {
        let text = match fs::read_to_string(self.record_path(name)).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { name: name.clone() });
            }
            Err(e) => {
                return Err(StoreError::Io {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        Record::parse(&text).map_err(|source| StoreError::Corrupt {
            name: name.clone(),
            source,
        })
    }

    async fn create(&self, name: &AccountName, password: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        if self.exists(name).await? {
            return Err(StoreError::AlreadyExists { name: name.clone() });
        }

        self.write_record(name, &Record::new_account(password)).await?;

        debug!(name = %name, path = %self.record_path(name).display(), "Account record created");
        Ok(())
    }

    async fn update(&self, name: &AccountName, edit: RecordEdit) -> StoreResult<Record> {
        let _guard = self.write_lock.lock().await;

        let mut record = self.load(name).await?;
        edit(&mut record);
        self.write_record(name, &record).await?;

        debug!(name = %name, "Account record updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn name(s: &str) -> AccountName {
        AccountName::parse(s).unwrap()
    }

    fn store() -> (FileAccountStore, TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        (FileAccountStore::new(dir.path().join("Files")), dir)
    }

    #[tokio::test]
    async fn test_missing_directory_means_no_accounts() {
        let (store, _dir) = store();
        assert!(!store.exists(&name("alice")).await.unwrap());
        assert!(!store.verify_password(&name("alice"), "x").await.unwrap());
        assert!(matches!(
            store.load(&name("alice")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_writes_expected_file() {
        let (store, _dir) = store();
        store.create(&name("alice"), "hunter2").await.unwrap();

        let path = store.root().join("alice.ini");
        assert_eq!(store.record_path(&name("alice")), path);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "[account]\npassword = hunter2\n\n[location]\nx = 3\ny = 3\n\n[inventory]\nslot1 = log"
        );

        // No temp file left behind
        let entries: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("alice.ini")]);
    }

    #[tokio::test]
    async fn test_round_trip_and_verify() {
        let (store, _dir) = store();
        store.create(&name("alice"), "hunter2").await.unwrap();

        let record = store.load(&name("alice")).await.unwrap();
        assert_eq!(record, Record::new_account("hunter2"));
        assert!(store.verify_password(&name("alice"), "hunter2").await.unwrap());
        assert!(!store.verify_password(&name("alice"), "hunter3").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let (store, _dir) = store();
        store.create(&name("alice"), "first").await.unwrap();
        let err = store.create(&name("alice"), "second").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert!(store.verify_password(&name("alice"), "first").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_file_reported() {
        let (store, _dir) = store();
        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.root().join("mallory.ini"), "password = x\n").unwrap();

        assert!(store.exists(&name("mallory")).await.unwrap());
        let err = store
            .verify_password(&name("mallory"), "x")
            .await
            .unwrap_err();
        match err {
            StoreError::Corrupt { name: n, source } => {
                assert_eq!(n.as_str(), "mallory");
                assert_eq!(source.line, 1);
            }
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_keeps_unknown_groups() {
        let (store, _dir) = store();
        std::fs::create_dir_all(store.root()).unwrap();
        let original = "[account]\npassword = pw\n\n[location]\nx = 3\ny = 3\n\n[guild]\nname = crabs\nrank = 2";
        std::fs::write(store.root().join("dave.ini"), original).unwrap();

        store
            .update(
                &name("dave"),
                Box::new(|r| {
                    r.set("location", "x", "5");
                    r.set("location", "y", "9");
                }),
            )
            .await
            .unwrap();

        let text = std::fs::read_to_string(store.root().join("dave.ini")).unwrap();
        assert_eq!(
            text,
            "[account]\npassword = pw\n\n[location]\nx = 5\ny = 9\n\n[guild]\nname = crabs\nrank = 2"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_exactly_one_succeeds() {
        let (store, _dir) = store();
        let store = Arc::new(store);

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create(&name("race"), "p1").await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create(&name("race"), "p2").await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::AlreadyExists { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 1);

        // Whichever won, the record is complete and parseable
        let record = store.load(&name("race")).await.unwrap();
        let password = record.password().unwrap();
        assert!(password == "p1" || password == "p2");
        assert_eq!(record.get("inventory", "slot1"), Some("log"));
    }
}
