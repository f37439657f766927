// Cache path utilities.
// Lays out the on-disk cache: message blobs, metadata index, last_update.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Default base cache directory (~/.cache/bananachat on Linux).
pub fn default_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "bananachat").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Resolved locations inside one cache directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one blob per message.
    pub fn messages_dir(&self) -> PathBuf {
        self.root.join("messages")
    }

    /// Directory holding the metadata index.
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    /// The metadata index document.
    pub fn index_path(&self) -> PathBuf {
        self.metadata_dir().join("index.json")
    }

    /// Timestamp of the last successful sync.
    pub fn last_update_path(&self) -> PathBuf {
        self.root.join("last_update")
    }

    /// Path of one message blob.
    pub fn message_path(&self, filename: &str) -> PathBuf {
        self.messages_dir().join(sanitize_name(filename))
    }
}

/// Sanitize a filename for use in filesystem paths.
/// Replaces problematic characters with underscores.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
