//! Account identity.

use std::fmt;
use std::str::FromStr;

use crate::NameError;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Characters that would let a name address something other than its own
/// record in a directory-backed store.
const FORBIDDEN_CHARS: [char; 3] = ['/', '\\', ':'];

/// Name of a chat account, also the key of its persisted record.
///
/// Comparison is exact and case-sensitive: "Alice" and "alice" are two
/// different accounts. Construction goes through [`AccountName::parse`],
/// so every value is non-empty and safe to use as a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountName(String);

impl AccountName {
    /// Validates a candidate name.
    ///
    /// # Errors
    ///
    /// - `NameError::Empty` for an empty string
    /// - `NameError::ForbiddenCharacter` for path separators, `:`, or control characters
    /// - `NameError::Reserved` for `.` and `..`
    pub fn parse(candidate: &str) -> Result<Self, NameError> {
        if candidate.is_empty() {
            return Err(NameError::Empty);
        }

        if let Some(ch) = candidate
            .chars()
            .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control())
        {
            return Err(NameError::ForbiddenCharacter { ch });
        }

        if candidate == "." || candidate == ".." {
            return Err(NameError::Reserved {
                name: candidate.to_string(),
            });
        }

        Ok(Self(candidate.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
