// Sync orchestration.
// Enumerates the primary repository and its forks, fans fetches out across
// a bounded worker pool, merges the results, and persists them as one
// sequential write phase ending in an atomic index swap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::paths::sanitize_name;
use crate::cache::{CacheStore, IndexEntry};
use crate::config::Config;
use crate::dedup::merge_messages;
use crate::error::{ChatError, Result};
use crate::fetch::{FetchPolicy, fetch_source};
use crate::github::GitHubClient;
use crate::limiter::RateLimiter;
use crate::message::Message;
use crate::source::{RateLimited, RemoteSource, Source};

/// Where a sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Merging,
    Persisting,
    Failed,
}

impl SyncPhase {
    pub fn display(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Fetching => "Fetching",
            SyncPhase::Merging => "Merging",
            SyncPhase::Persisting => "Persisting",
            SyncPhase::Failed => "Failed",
        }
    }
}

/// A non-fatal failure attributed to one source.
#[derive(Debug)]
pub struct SourceError {
    /// `owner/repo` label of the source, or the primary's label for a fork
    /// enumeration failure.
    pub origin: String,
    pub error: ChatError,
}

/// What a completed sync produced.
#[derive(Debug)]
pub struct SyncOutcome {
    /// The merged, deduplicated message set, ascending by date.
    pub messages: Vec<Message>,
    /// Per-source failures that did not abort the sync.
    pub errors: Vec<SourceError>,
    /// Malformed or vanished entries skipped across all sources.
    pub skipped: usize,
}

/// Tuning for one orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub owner: String,
    pub repo: String,
    pub policy: FetchPolicy,
    /// Concurrent source fetches. The shared rate limiter still gates every
    /// remote call regardless of which worker issues it.
    pub concurrency: usize,
    /// Budget for one source's whole fetch; overruns count as that source
    /// failing, not as a sync abort.
    pub source_timeout: Duration,
}

impl SyncOptions {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            policy: FetchPolicy::default(),
            concurrency: 4,
            source_timeout: Duration::from_secs(300),
        }
    }
}

/// Drives enumerate → fetch → merge → persist.
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteSource>,
    store: CacheStore,
    options: SyncOptions,
    phase_tx: watch::Sender<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(remote: Arc<dyn RemoteSource>, store: CacheStore, options: SyncOptions) -> Self {
        let (phase_tx, _) = watch::channel(SyncPhase::default());
        Self {
            remote,
            store,
            options,
            phase_tx,
        }
    }

    /// Wire up the GitHub client, shared rate limiter, and cache store from
    /// a loaded config.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.github_token.is_empty() {
            return Err(ChatError::MissingToken);
        }
        let limiter = if config.rate_limit_fail_fast {
            RateLimiter::fail_fast(config.rate_limit_calls, config.rate_window())
        } else {
            RateLimiter::new(config.rate_limit_calls, config.rate_window())
        };
        let client = GitHubClient::new(&config.github_token)?;
        let remote = Arc::new(RateLimited::new(client, Arc::new(limiter)));
        let store = CacheStore::new(&config.cache_dir)?;

        let options = SyncOptions {
            policy: config.fetch_policy(),
            concurrency: config.concurrency,
            source_timeout: config.source_timeout(),
            ..SyncOptions::new(&config.owner, &config.repo)
        };
        Ok(Self::new(remote, store, options))
    }

    /// Observe phase transitions.
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase_tx.subscribe()
    }

    /// The cache this orchestrator persists into.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Read the current cached message set, ascending by date.
    pub fn messages(&self) -> Result<Vec<Message>> {
        self.store.get_messages()
    }

    /// Run a full sync.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        self.sync_with(CancellationToken::new()).await
    }

    /// Run a full sync under a cancellation token. On cancellation the
    /// pre-existing cache state stays authoritative: no index is written
    /// and `Cancelled` is returned.
    pub async fn sync_with(&self, cancel: CancellationToken) -> Result<SyncOutcome> {
        let result = self.run(&cancel).await;
        match &result {
            Ok(_) | Err(ChatError::Cancelled) => self.set_phase(SyncPhase::Idle),
            Err(_) => self.set_phase(SyncPhase::Failed),
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        self.set_phase(SyncPhase::Fetching);
        let mut errors = Vec::new();

        let sources = self.enumerate_sources(cancel, &mut errors).await?;
        tracing::info!(sources = sources.len(), "starting fetch");

        let (all, skipped) = self.fetch_all(sources, cancel, &mut errors).await?;

        self.set_phase(SyncPhase::Merging);
        let merged = merge_messages(all);
        tracing::info!(messages = merged.len(), errors = errors.len(), "merged");

        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        self.set_phase(SyncPhase::Persisting);
        self.persist(&merged)?;

        Ok(SyncOutcome {
            messages: merged,
            errors,
            skipped,
        })
    }

    /// Primary plus whatever forks enumerate. A failed enumeration degrades
    /// to the primary alone and is recorded, not escalated.
    async fn enumerate_sources(
        &self,
        cancel: &CancellationToken,
        errors: &mut Vec<SourceError>,
    ) -> Result<Vec<Source>> {
        let primary = Source::primary(&self.options.owner, &self.options.repo);
        let mut sources = vec![primary.clone()];

        let forks = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            forks = self.remote.list_forks(&primary.owner, &primary.repo) => forks,
        };
        match forks {
            Ok(forks) => sources.extend(forks.into_iter().map(Source::fork)),
            Err(e) => {
                tracing::warn!(error = %e, "fork enumeration failed, syncing primary only");
                errors.push(SourceError {
                    origin: primary.label(),
                    error: e,
                });
            }
        }
        Ok(sources)
    }

    async fn fetch_all(
        &self,
        sources: Vec<Source>,
        cancel: &CancellationToken,
        errors: &mut Vec<SourceError>,
    ) -> Result<(Vec<Message>, usize)> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks: JoinSet<(Source, Result<crate::fetch::SourceFetch>)> = JoinSet::new();

        for source in sources {
            let remote = Arc::clone(&self.remote);
            let policy = self.options.policy.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let timeout = self.options.source_timeout;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (source, Err(ChatError::Cancelled)),
                };
                let fetched = tokio::select! {
                    _ = cancel.cancelled() => Err(ChatError::Cancelled),
                    outcome = tokio::time::timeout(
                        timeout,
                        fetch_source(remote.as_ref(), &source, &policy),
                    ) => match outcome {
                        Ok(result) => result,
                        Err(_) => Err(ChatError::Timeout(timeout)),
                    },
                };
                (source, fetched)
            });
        }

        let mut all = Vec::new();
        let mut skipped = 0;
        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(fetch))) => {
                    skipped += fetch.skipped;
                    all.extend(fetch.messages);
                }
                Ok((_, Err(ChatError::Cancelled))) => cancelled = true,
                Ok((source, Err(e))) => {
                    tracing::warn!(source = %source.label(), error = %e, "source failed");
                    errors.push(SourceError {
                        origin: source.label(),
                        error: e,
                    });
                }
                Err(e) => {
                    errors.push(SourceError {
                        origin: "fetch worker".to_string(),
                        error: ChatError::Other(e.to_string()),
                    });
                }
            }
        }

        if cancelled || cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        Ok((all, skipped))
    }

    /// One sequential write phase: blobs, then the index as the atomic
    /// commit point, then a sweep of blobs the new index no longer names.
    fn persist(&self, merged: &[Message]) -> Result<()> {
        for message in merged {
            self.store.save_message(&message.filename, &message.content)?;
        }

        let entries: Vec<IndexEntry> = merged.iter().map(IndexEntry::from_message).collect();
        self.store.save_metadata(&entries)?;

        let keep: HashSet<String> = merged
            .iter()
            .map(|m| sanitize_name(&m.filename))
            .collect();
        let pruned = self.store.prune_orphans(&keep)?;
        if pruned > 0 {
            tracing::debug!(pruned, "removed stale blobs");
        }
        Ok(())
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase_tx.send_replace(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_names() {
        assert_eq!(SyncPhase::Idle.display(), "Idle");
        assert_eq!(SyncPhase::Persisting.display(), "Persisting");
    }

    #[test]
    fn options_default_tuning() {
        let options = SyncOptions::new("prime", "chat");
        assert_eq!(options.owner, "prime");
        assert!(options.concurrency >= 1);
        assert!(options.source_timeout > Duration::ZERO);
    }
}
