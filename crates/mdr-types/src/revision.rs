use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::identifier::Identifier;

/// What a revision did to its document.
///
/// Persisted as a single character. The code table is closed: decoding an
/// unknown code is an error, never a silent default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RevisionKind {
    /// The document was created (`A`).
    Created,
    /// The document content was replaced (`M`).
    Modified,
    /// The document was tombstoned (`D`).
    Deleted,
}

impl RevisionKind {
    /// The persisted one-character code.
    pub const fn code(self) -> char {
        match self {
            Self::Created => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
        }
    }

    /// Decode a persisted code.
    pub fn from_code(code: char) -> Result<Self, TypeError> {
        match code {
            'A' => Ok(Self::Created),
            'M' => Ok(Self::Modified),
            'D' => Ok(Self::Deleted),
            other => Err(TypeError::UnknownRevisionCode(other)),
        }
    }
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl Serialize for RevisionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.code())
    }
}

impl<'de> Deserialize<'de> for RevisionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = char::deserialize(deserializer)?;
        Self::from_code(code).map_err(serde::de::Error::custom)
    }
}

/// Opaque, totally ordered revision token.
///
/// Tokens form a per-identifier sequence starting at 1; a later mutation
/// always carries a larger token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionToken(u64);

impl RevisionToken {
    /// The token of the first revision of any document.
    pub const FIRST: Self = Self(1);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The token following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a document's append-only history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: Identifier,
    pub token: RevisionToken,
    pub kind: RevisionKind,
    /// Actor that performed the mutation.
    pub author: String,
    /// Wall-clock time the revision was appended.
    pub timestamp: DateTime<Utc>,
}
