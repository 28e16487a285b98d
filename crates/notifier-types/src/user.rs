//! User records as served by the remote user directory.
//!
//! The directory owns these records; the notifier only ever holds
//! transient copies fetched at the start of a run.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque user identifier.
///
/// Directories disagree on whether ids are numbers or strings, so both
/// are accepted on the wire and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create an id from its textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => UserId(n.to_string()),
            RawId::Text(s) => UserId(s),
        })
    }
}

/// A user known to the directory.
///
/// `notified` flips from false to true at most once, and only after the
/// mail was sent and the directory confirmed the acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "hasReceivedEmail", alias = "notified", default)]
    pub notified: bool,
}

impl User {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, notified: bool) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            notified,
        }
    }

    /// A candidate still needs the notification email.
    pub fn is_candidate(&self) -> bool {
        !self.notified
    }

    /// Record a confirmed send + acknowledgment for this run's copy.
    pub fn mark_notified(&mut self) {
        self.notified = true;
    }
}
