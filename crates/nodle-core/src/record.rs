//! Persisted account records.
//!
//! A record is a list of named groups, each holding `key = value` entries:
//!
//! ```text
//! [account]
//! password = hunter2
//!
//! [location]
//! x = 3
//! y = 3
//! ```
//!
//! The chat core only reads `account.password`. Every other group is
//! opaque player state and must survive a load/store cycle unchanged, so
//! groups and entries keep their file order.

use std::fmt;

use crate::RecordParseError;

/// Group holding credentials.
pub const ACCOUNT_GROUP: &str = "account";

/// Key of the password entry inside [`ACCOUNT_GROUP`].
pub const PASSWORD_KEY: &str = "password";

// ============================================================================
// Group
// ============================================================================

/// One bracketed section of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    name: String,
    entries: Vec<(String, String)>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Returns the group name (without brackets).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a value, replacing an existing entry in place or appending.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes an entry, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the group has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Record
// ============================================================================

/// The persisted data of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    groups: Vec<Group>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the record written for a brand new account.
    ///
    /// Besides the password every account starts at location (3, 3)
    /// holding a single log.
    pub fn new_account(password: &str) -> Self {
        let mut record = Self::new();
        record.set(ACCOUNT_GROUP, PASSWORD_KEY, password);
        record.set("location", "x", "3");
        record.set("location", "y", "3");
        record.set("inventory", "slot1", "log");
        record
    }

    /// Parses record text.
    ///
    /// Blank lines are skipped. `[name]` opens a group (reopening it if it
    /// was seen before). `key = value` is split at the first `=` and both
    /// sides are trimmed; a repeated key keeps the last value.
    ///
    /// # Errors
    ///
    /// Returns `RecordParseError` for an entry before any group header, an
    /// empty group header, or a line that is neither header nor entry.
    pub fn parse(text: &str) -> Result<Self, RecordParseError> {
        let mut record = Self::new();
        let mut current: Option<usize> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = inner.trim();
                if name.is_empty() {
                    return Err(RecordParseError::new(line_no, "empty group header"));
                }
                current = Some(record.group_index_or_insert(name));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(RecordParseError::new(
                    line_no,
                    format!("expected `[group]` or `key = value`, got {line:?}"),
                ));
            };

            let Some(group) = current.and_then(|i| record.groups.get_mut(i)) else {
                return Err(RecordParseError::new(
                    line_no,
                    format!("entry {:?} appears before any group header", key.trim()),
                ));
            };

            group.set(key.trim(), value.trim());
        }

        Ok(record)
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Looks up a group by name for modification.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Iterates groups in file order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Looks up `group.key`.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.group(group)?.get(key)
    }

    /// Sets `group.key`, creating the group at the end if needed.
    pub fn set(&mut self, group: &str, key: impl Into<String>, value: impl Into<String>) {
        let index = self.group_index_or_insert(group);
        if let Some(group) = self.groups.get_mut(index) {
            group.set(key, value);
        }
    }

    /// Returns the stored password, if the record has one.
    pub fn password(&self) -> Option<&str> {
        self.get(ACCOUNT_GROUP, PASSWORD_KEY)
    }

    fn group_index_or_insert(&mut self, name: &str) -> usize {
        match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(Group::new(name));
                self.groups.len() - 1
            }
        }
    }
}

/// Renders the persisted form: groups separated by a blank line, no
/// trailing newline.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "[{}]", group.name)?;
            for (key, value) in group.entries() {
                write!(f, "\n{key} = {value}")?;
            }
        }
        Ok(())
    }
}
