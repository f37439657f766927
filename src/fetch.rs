// Per-source message fetching.
// Turns one repository's messages folder into Message records, retrying
// transient failures and skipping malformed entries without aborting.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::error::{ChatError, Result};
use crate::message::{Message, parse_message_filename};
use crate::source::{FileRef, RemoteSource, Source};

/// Retry/backoff policy for content fetches within one source.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_retries: usize,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl FetchPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// What one source contributed to a sync.
#[derive(Debug, Default)]
pub struct SourceFetch {
    pub messages: Vec<Message>,
    /// Entries skipped as malformed or vanished mid-fetch.
    pub skipped: usize,
}

/// Fetch all candidate messages from one source.
///
/// A source without a messages folder is an empty contribution, not an
/// error. Transport failures that survive the retry budget fail the whole
/// source; the orchestrator isolates that from the remaining sources.
pub async fn fetch_source(
    remote: &dyn RemoteSource,
    source: &Source,
    policy: &FetchPolicy,
) -> Result<SourceFetch> {
    let files = match remote.list_message_files(&source.owner, &source.repo).await {
        Ok(files) => files,
        Err(ChatError::NotFound(_)) => {
            tracing::debug!(source = %source.label(), "no messages folder");
            return Ok(SourceFetch::default());
        }
        Err(e) => return Err(e),
    };

    let mut fetch = SourceFetch::default();
    for file in files {
        match fetch_one(remote, source, &file, policy).await? {
            Some(message) => fetch.messages.push(message),
            None => fetch.skipped += 1,
        }
    }

    tracing::debug!(
        source = %source.label(),
        messages = fetch.messages.len(),
        skipped = fetch.skipped,
        "fetched source"
    );
    Ok(fetch)
}

/// Fetch one file. `Ok(None)` means a non-fatal per-item skip.
async fn fetch_one(
    remote: &dyn RemoteSource,
    source: &Source,
    file: &FileRef,
    policy: &FetchPolicy,
) -> Result<Option<Message>> {
    let fetch_content = || async { remote.fetch_content(file).await };
    let content = match fetch_content
        .retry(policy.backoff())
        .when(ChatError::is_retryable)
        .notify(|err: &ChatError, after: Duration| {
            tracing::debug!(file = %file.name, error = %err, retry_in = ?after, "retrying fetch");
        })
        .await
    {
        Ok(content) => content,
        // Deleted between listing and fetch: skip the item.
        Err(ChatError::NotFound(_)) => {
            tracing::warn!(source = %source.label(), file = %file.name, "file vanished, skipping");
            return Ok(None);
        }
        Err(ChatError::InvalidData(reason)) => {
            tracing::warn!(source = %source.label(), file = %file.name, %reason, "skipping");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let history = match remote
        .fetch_path_history(&source.owner, &source.repo, &file.path())
        .await
    {
        Ok(history) => history,
        // Quota exhaustion will hit every later call too; surface it.
        Err(e @ ChatError::RateLimited { .. }) => return Err(e),
        Err(e) => {
            tracing::warn!(file = %file.name, error = %e, "history lookup failed");
            None
        }
    };

    let parsed = parse_message_filename(&file.name);
    let (author, date, commit_hash) = match (history, parsed) {
        (Some(history), _) => (history.author, history.date, Some(history.commit_hash)),
        (None, Some((date, author))) => (author, date, None),
        (None, None) => {
            tracing::warn!(
                source = %source.label(),
                file = %file.name,
                "no history and unconventional filename, skipping"
            );
            return Ok(None);
        }
    };

    Ok(Some(Message {
        filename: file.name.clone(),
        content,
        author,
        date,
        commit_hash,
        origin: source.origin(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::source::{ForkRef, PathHistory};

    /// Scripted source: file listings, contents, histories, and a budget of
    /// transient failures to burn through before content fetches succeed.
    #[derive(Default)]
    struct ScriptedSource {
        files: Vec<FileRef>,
        contents: Vec<(String, String)>,
        histories: Vec<(String, PathHistory)>,
        missing_folder: bool,
        transient_failures: Mutex<usize>,
    }

    impl ScriptedSource {
        fn file(name: &str) -> FileRef {
            FileRef {
                owner: "prime".into(),
                repo: "chat".into(),
                name: name.into(),
                download_url: Some(format!("https://raw.example/{name}")),
            }
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedSource {
        async fn list_forks(&self, _owner: &str, _repo: &str) -> Result<Vec<ForkRef>> {
            Ok(Vec::new())
        }

        async fn list_message_files(&self, _owner: &str, _repo: &str) -> Result<Vec<FileRef>> {
            if self.missing_folder {
                return Err(ChatError::NotFound("messages".into()));
            }
            Ok(self.files.clone())
        }

        async fn fetch_content(&self, file: &FileRef) -> Result<String> {
            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ChatError::Timeout(Duration::from_secs(1)));
            }
            self.contents
                .iter()
                .find(|(name, _)| name == &file.name)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| ChatError::NotFound(file.name.clone()))
        }

        async fn fetch_path_history(
            &self,
            _owner: &str,
            _repo: &str,
            path: &str,
        ) -> Result<Option<PathHistory>> {
            Ok(self
                .histories
                .iter()
                .find(|(p, _)| format!("messages/{p}") == path)
                .map(|(_, h)| h.clone()))
        }
    }

    fn quick_policy() -> FetchPolicy {
        FetchPolicy {
            max_retries: 2,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn missing_folder_is_an_empty_contribution() {
        let remote = ScriptedSource {
            missing_folder: true,
            ..Default::default()
        };
        let source = Source::fork(ForkRef {
            owner: "someone".into(),
            repo: "chat".into(),
        });
        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        assert!(fetch.messages.is_empty());
        assert_eq!(fetch.skipped, 0);
    }

    #[tokio::test]
    async fn history_wins_over_filename_metadata() {
        let history = PathHistory {
            author: "alice".into(),
            date: Utc.timestamp_opt(1_700_000_500, 0).unwrap(),
            commit_hash: "abc123".into(),
        };
        let remote = ScriptedSource {
            files: vec![ScriptedSource::file("1700000000_bob.txt")],
            contents: vec![("1700000000_bob.txt".into(), "hi".into())],
            histories: vec![("1700000000_bob.txt".into(), history)],
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        let message = &fetch.messages[0];
        assert_eq!(message.author, "alice");
        assert_eq!(message.date.timestamp(), 1_700_000_500);
        assert_eq!(message.commit_hash.as_deref(), Some("abc123"));
        assert!(message.origin.primary);
    }

    #[tokio::test]
    async fn filename_metadata_backs_up_missing_history() {
        let remote = ScriptedSource {
            files: vec![ScriptedSource::file("1700000000_bob.txt")],
            contents: vec![("1700000000_bob.txt".into(), "yo".into())],
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        let message = &fetch.messages[0];
        assert_eq!(message.author, "bob");
        assert_eq!(message.date.timestamp(), 1_700_000_000);
        assert!(message.commit_hash.is_none());
    }

    #[tokio::test]
    async fn malformed_entries_are_counted_not_fatal() {
        let remote = ScriptedSource {
            files: vec![
                ScriptedSource::file("1700000000_bob.txt"),
                ScriptedSource::file("scribble.txt"),
            ],
            contents: vec![
                ("1700000000_bob.txt".into(), "yo".into()),
                ("scribble.txt".into(), "???".into()),
            ],
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        assert_eq!(fetch.messages.len(), 1);
        assert_eq!(fetch.skipped, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let remote = ScriptedSource {
            files: vec![ScriptedSource::file("1700000000_bob.txt")],
            contents: vec![("1700000000_bob.txt".into(), "yo".into())],
            transient_failures: Mutex::new(2),
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        assert_eq!(fetch.messages.len(), 1);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_fails_the_source() {
        let remote = ScriptedSource {
            files: vec![ScriptedSource::file("1700000000_bob.txt")],
            contents: vec![("1700000000_bob.txt".into(), "yo".into())],
            transient_failures: Mutex::new(10),
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let result = fetch_source(&remote, &source, &quick_policy()).await;
        assert!(matches!(result, Err(ChatError::Timeout(_))));
    }

    #[tokio::test]
    async fn vanished_file_is_a_skip() {
        let remote = ScriptedSource {
            files: vec![ScriptedSource::file("1700000000_bob.txt")],
            ..Default::default()
        };
        let source = Source::primary("prime", "chat");

        let fetch = fetch_source(&remote, &source, &quick_policy()).await.unwrap();
        assert!(fetch.messages.is_empty());
        assert_eq!(fetch.skipped, 1);
    }
}
