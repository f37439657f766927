// Cache store for message blobs and the metadata index.
// All index and blob writes go through temp-file + rename so concurrent
// readers never observe partial data.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, Origin};

use super::paths::CacheLayout;

/// One row of the metadata index, persisted as `metadata/index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub filename: String,
    pub author: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    pub origin: Origin,
}

impl IndexEntry {
    pub fn from_message(message: &Message) -> Self {
        Self {
            filename: message.filename.clone(),
            author: message.author.clone(),
            date: message.date,
            commit_hash: message.commit_hash.clone(),
            origin: message.origin.clone(),
        }
    }
}

/// Durable local storage for the merged message set.
///
/// Writers must be serialized (the orchestrator performs one sequential
/// persist phase per sync); reads may run concurrently with each other and
/// with a write.
#[derive(Debug, Clone)]
pub struct CacheStore {
    layout: CacheLayout,
}

impl CacheStore {
    /// Open a store rooted at `cache_dir`, creating the directory tree.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let layout = CacheLayout::new(cache_dir);
        fs::create_dir_all(layout.messages_dir())?;
        fs::create_dir_all(layout.metadata_dir())?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Write one message blob. Returns whether anything was written: an
    /// existing blob with identical content is left untouched so repeated
    /// syncs against unchanged remote state do not rewrite the cache.
    pub fn save_message(&self, filename: &str, content: &str) -> Result<bool> {
        let path = self.layout.message_path(filename);
        if let Ok(existing) = fs::read_to_string(&path) {
            if existing == content {
                return Ok(false);
            }
        }
        write_atomic(&path, content.as_bytes())?;
        Ok(true)
    }

    /// Write the full index and stamp `last_update`, as the final step of a
    /// sync. The index rename is the commit point: until it lands, readers
    /// keep seeing the previous index.
    pub fn save_metadata(&self, entries: &[IndexEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.layout.index_path(), json.as_bytes())?;
        write_atomic(
            &self.layout.last_update_path(),
            Utc::now().to_rfc3339().as_bytes(),
        )?;
        Ok(())
    }

    /// Read all cached messages, sorted ascending by date.
    ///
    /// A missing index means an empty cache, not an error. An index entry
    /// whose blob is missing is skipped with a warning; a crash between the
    /// two halves of a clear must not break readers.
    pub fn get_messages(&self) -> Result<Vec<Message>> {
        let index = match self.read_index()? {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        let mut messages = Vec::with_capacity(index.len());
        for entry in index {
            let path = self.layout.message_path(&entry.filename);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(
                        filename = %entry.filename,
                        error = %e,
                        "skipping index entry with unreadable blob"
                    );
                    continue;
                }
            };
            messages.push(Message {
                filename: entry.filename,
                content,
                author: entry.author,
                date: entry.date,
                commit_hash: entry.commit_hash,
                origin: entry.origin,
            });
        }

        messages.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.filename.cmp(&b.filename)));
        Ok(messages)
    }

    /// Timestamp of the last successful sync, when one has completed.
    pub fn last_update(&self) -> Result<Option<DateTime<Utc>>> {
        let path = self.layout.last_update_path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)))
    }

    /// Remove the index and all blobs as one logical operation.
    ///
    /// The index reference goes away first, so readers racing a clear see
    /// either the old complete state or an empty cache. Blobs orphaned by a
    /// crash mid-clear are invisible to readers and swept by the next sync.
    pub fn clear(&self) -> Result<()> {
        remove_if_exists(&self.layout.index_path())?;
        remove_if_exists(&self.layout.last_update_path())?;
        for path in self.blob_paths()? {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    /// Remove blobs not referenced by `keep`. Returns how many were removed.
    pub fn prune_orphans(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for path in self.blob_paths()? {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if !keep.contains(&name) {
                tracing::debug!(filename = %name, "pruning orphaned blob");
                remove_if_exists(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn read_index(&self) -> Result<Option<Vec<IndexEntry>>> {
        let path = self.layout.index_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn blob_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.layout.messages_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }
}

/// Write bytes via a temp file and atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn entry(filename: &str, author: &str, secs: i64) -> IndexEntry {
        IndexEntry {
            filename: filename.to_string(),
            author: author.to_string(),
            date: Utc.timestamp_opt(secs, 0).unwrap(),
            commit_hash: None,
            origin: Origin::primary("owner", "repo"),
        }
    }

    #[test]
    fn empty_cache_reads_as_no_messages() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();
        assert!(store.get_messages().unwrap().is_empty());
        assert!(store.last_update().unwrap().is_none());
    }

    #[test]
    fn save_and_read_sorted_by_date() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_message("b.txt", "second").unwrap();
        store.save_message("a.txt", "first").unwrap();
        store
            .save_metadata(&[entry("b.txt", "bob", 200), entry("a.txt", "alice", 100)])
            .unwrap();

        let messages = store.get_messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].filename, "a.txt");
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].filename, "b.txt");
        assert!(store.last_update().unwrap().is_some());
    }

    #[test]
    fn unchanged_blob_is_not_rewritten() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        assert!(store.save_message("a.txt", "hi").unwrap());
        assert!(!store.save_message("a.txt", "hi").unwrap());
        assert!(store.save_message("a.txt", "changed").unwrap());
    }

    #[test]
    fn missing_blob_is_skipped_not_fatal() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_message("a.txt", "kept").unwrap();
        store
            .save_metadata(&[entry("a.txt", "alice", 100), entry("gone.txt", "bob", 200)])
            .unwrap();

        let messages = store.get_messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].filename, "a.txt");
    }

    #[test]
    fn clear_removes_index_and_blobs() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_message("a.txt", "hi").unwrap();
        store.save_metadata(&[entry("a.txt", "alice", 100)]).unwrap();

        store.clear().unwrap();
        assert!(store.get_messages().unwrap().is_empty());
        assert!(store.last_update().unwrap().is_none());
        assert!(!store.layout().message_path("a.txt").exists());
    }

    #[test]
    fn interrupted_clear_leaves_readers_working() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_message("a.txt", "hi").unwrap();
        store.save_metadata(&[entry("a.txt", "alice", 100)]).unwrap();

        // Simulate a crash that removed blobs but never reached the index.
        fs::remove_file(store.layout().message_path("a.txt")).unwrap();

        let messages = store.get_messages().unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn prune_removes_only_unreferenced_blobs() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_message("keep.txt", "kept").unwrap();
        store.save_message("orphan.txt", "stale").unwrap();

        let keep: HashSet<String> = ["keep.txt".to_string()].into_iter().collect();
        assert_eq!(store.prune_orphans(&keep).unwrap(), 1);
        assert!(store.layout().message_path("keep.txt").exists());
        assert!(!store.layout().message_path("orphan.txt").exists());
    }

    #[test]
    fn index_omits_null_commit_hashes() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();

        store.save_metadata(&[entry("a.txt", "alice", 100)]).unwrap();
        let raw = fs::read_to_string(store.layout().index_path()).unwrap();
        assert!(!raw.contains("commit_hash"));
    }
}
