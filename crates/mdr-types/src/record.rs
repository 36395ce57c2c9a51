use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Current state of one stored document.
///
/// A tombstoned record keeps its identifier and timestamp but carries no
/// content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: Identifier,
    pub content: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub deleted: bool,
}

impl MetadataRecord {
    /// An active record.
    pub fn active(id: Identifier, content: Vec<u8>, last_modified: DateTime<Utc>) -> Self {
        Self {
            id,
            content,
            last_modified,
            deleted: false,
        }
    }

    /// A tombstone for `id`, deleted at `when`.
    pub fn tombstone(id: Identifier, when: DateTime<Utc>) -> Self {
        Self {
            id,
            content: Vec::new(),
            last_modified: when,
            deleted: true,
        }
    }

    /// Returns `true` when `content` equals the stored bytes and the stored
    /// timestamp is not older than `modified`.
    pub fn is_up_to_date(&self, content: &[u8], modified: DateTime<Utc>) -> bool {
        !self.deleted && self.content == content && self.last_modified >= modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Namespace;
    use chrono::Duration;

    fn id() -> Identifier {
        Namespace::new("DocPortal", "document")
            .unwrap()
            .identifier(1)
            .unwrap()
    }

    #[test]
    fn up_to_date_requires_same_bytes_and_fresh_stamp() {
        let now = Utc::now();
        let record = MetadataRecord::active(id(), b"<mods/>".to_vec(), now);
        assert!(record.is_up_to_date(b"<mods/>", now));
        assert!(record.is_up_to_date(b"<mods/>", now - Duration::seconds(5)));
        assert!(!record.is_up_to_date(b"<mods/>", now + Duration::seconds(5)));
        assert!(!record.is_up_to_date(b"<other/>", now));
    }

    #[test]
    fn tombstone_is_never_up_to_date() {
        let now = Utc::now();
        let record = MetadataRecord::tombstone(id(), now);
        assert!(record.deleted);
        assert!(record.content.is_empty());
        assert!(!record.is_up_to_date(b"", now));
    }
}
