//! Normalized employee identity keys.
//!
//! Folders are correlated to employees through their email address. Inputs
//! arrive from seed files, admin forms and Drive metadata with inconsistent
//! casing and stray whitespace, so every lookup goes through
//! [`IdentityKey::derive`] first.

use std::fmt;

use serde::{Serialize, Serializer};

/// A trimmed, lowercased email address.
///
/// Two keys are the same identity exactly when their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Returns `None` for empty or malformed input. Callers treat that as a
    /// key that matches nothing rather than as an error.
    pub fn derive(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if is_plausible_email(&normalized) {
            Some(Self(normalized))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn is_plausible_email(value: &str) -> bool {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}
