// GitHub API response types.
// Defines structs for deserializing the REST endpoints the sync consumes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Repository owner, as embedded in fork listings.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerInfo {
    pub login: String,
}

/// One fork from the forks listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ForkInfo {
    pub name: String,
    pub owner: OwnerInfo,
}

/// One entry from a contents listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub download_url: Option<String>,
}

impl ContentEntry {
    /// Whether this entry is a message file the sync should consider.
    pub fn is_message_file(&self) -> bool {
        self.entry_type == "file" && self.name.ends_with(".txt")
    }
}

/// One commit from a path-filtered commits listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitListItem {
    pub sha: String,
    pub commit: CommitDetail,
}

/// Nested commit payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub author: Option<CommitAuthor>,
}

/// Commit author signature.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub date: DateTime<Utc>,
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_entry_filtering() {
        let file: ContentEntry =
            serde_json::from_str(r#"{"name":"1700000000_alice.txt","type":"file","download_url":"https://raw.example/a.txt"}"#)
                .unwrap();
        assert!(file.is_message_file());

        let dir: ContentEntry =
            serde_json::from_str(r#"{"name":"archive","type":"dir","download_url":null}"#).unwrap();
        assert!(!dir.is_message_file());

        let readme: ContentEntry =
            serde_json::from_str(r#"{"name":"README.md","type":"file","download_url":null}"#)
                .unwrap();
        assert!(!readme.is_message_file());
    }

    #[test]
    fn commit_author_may_be_absent() {
        let item: CommitListItem = serde_json::from_str(
            r#"{"sha":"abc123","commit":{"author":null}}"#,
        )
        .unwrap();
        assert!(item.commit.author.is_none());
    }
}
