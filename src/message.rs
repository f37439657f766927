// Core message model.
// Defines the Message record, its origin tag, and the identity key used to
// recognize the same message across the primary repository and its forks.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How many hex characters of the content digest participate in the
/// identity key and in disambiguated storage filenames.
const DIGEST_PREFIX_LEN: usize = 16;

/// Which repository supplied a copy of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// `owner/repo` label.
    pub label: String,
    /// True for the primary repository, false for forks.
    #[serde(default)]
    pub primary: bool,
}

impl Origin {
    pub fn primary(owner: &str, repo: &str) -> Self {
        Self {
            label: format!("{}/{}", owner, repo),
            primary: true,
        }
    }

    pub fn fork(owner: &str, repo: &str) -> Self {
        Self {
            label: format!("{}/{}", owner, repo),
            primary: false,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// A single chat entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Storage filename, unique within the merged set.
    pub filename: String,
    /// Text body, immutable once fetched.
    pub content: String,
    /// Author name from commit metadata or the filename convention.
    pub author: String,
    /// Commit date when available, otherwise the date the filename encodes.
    pub date: DateTime<Utc>,
    /// Provenance pointer, when commit history exists for the file.
    pub commit_hash: Option<String>,
    /// Which source supplied this copy.
    pub origin: Origin,
}

impl Message {
    /// Derive the identity key under which duplicates collapse.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::derive(&self.author, self.date, &self.content)
    }
}

/// Stable identity of a message across sources.
///
/// The key is (author, timestamp seconds, content digest prefix). Folding in
/// the digest means two sources reusing the same filename for different
/// content yield different keys, so neither copy is silently lost, while
/// byte-identical copies collapse regardless of which fork carried them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub author: String,
    pub timestamp: i64,
    pub digest: String,
}

impl IdentityKey {
    pub fn derive(author: &str, date: DateTime<Utc>, content: &str) -> Self {
        Self {
            author: author.to_string(),
            timestamp: date.timestamp(),
            digest: content_digest(content),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.author, self.timestamp, self.digest)
    }
}

/// Hex prefix of the SHA-256 digest of a message body.
pub fn content_digest(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..DIGEST_PREFIX_LEN / 2])
}

/// Parse the `"{unix_seconds}_{author}.txt"` filename convention.
///
/// Returns the encoded date and author, or `None` when the name does not
/// follow the convention. Commit history, when present, overrides these
/// values; entries with neither are skipped upstream.
pub fn parse_message_filename(filename: &str) -> Option<(DateTime<Utc>, String)> {
    let stem = filename.strip_suffix(".txt")?;
    let (ts, author) = stem.split_once('_')?;
    if author.is_empty() {
        return None;
    }
    let seconds: i64 = ts.parse().ok()?;
    let date = Utc.timestamp_opt(seconds, 0).single()?;
    Some((date, author.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conventional_filename() {
        let (date, author) = parse_message_filename("1700000000_alice.txt").unwrap();
        assert_eq!(author, "alice");
        assert_eq!(date.timestamp(), 1_700_000_000);
    }

    #[test]
    fn author_may_contain_underscores() {
        let (_, author) = parse_message_filename("1700000000_bob_the_builder.txt").unwrap();
        assert_eq!(author, "bob_the_builder");
    }

    #[test]
    fn rejects_unconventional_filenames() {
        assert!(parse_message_filename("greeting.txt").is_none());
        assert!(parse_message_filename("notes.md").is_none());
        assert!(parse_message_filename("1700000000_.txt").is_none());
        assert!(parse_message_filename("yesterday_alice.txt").is_none());
    }

    #[test]
    fn identical_copies_share_a_key() {
        let date = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = IdentityKey::derive("alice", date, "hi");
        let b = IdentityKey::derive("alice", date, "hi");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_content_splits_the_key() {
        let date = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = IdentityKey::derive("alice", date, "hi");
        let b = IdentityKey::derive("alice", date, "bye");
        assert_ne!(a, b);
    }

    #[test]
    fn sub_second_dates_collapse_to_seconds() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t1 = t0 + chrono::Duration::milliseconds(400);
        assert_eq!(
            IdentityKey::derive("alice", t0, "hi"),
            IdentityKey::derive("alice", t1, "hi"),
        );
    }
}
