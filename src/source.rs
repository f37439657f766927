// Remote source abstraction.
// The sync engine talks to "a thing that can list forks, list message files,
// fetch content, and look up path history" rather than to GitHub directly,
// so tests can substitute an in-memory fixture.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::message::Origin;

/// A fork of the primary repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkRef {
    pub owner: String,
    pub repo: String,
}

/// One repository the sync pulls from: the primary or a fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub owner: String,
    pub repo: String,
    pub primary: bool,
}

impl Source {
    pub fn primary(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            primary: true,
        }
    }

    pub fn fork(fork: ForkRef) -> Self {
        Self {
            owner: fork.owner,
            repo: fork.repo,
            primary: false,
        }
    }

    /// Origin tag applied to every message this source yields.
    pub fn origin(&self) -> Origin {
        if self.primary {
            Origin::primary(&self.owner, &self.repo)
        } else {
            Origin::fork(&self.owner, &self.repo)
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// A message file within one repository's messages folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub owner: String,
    pub repo: String,
    /// Bare filename, e.g. `1700000000_alice.txt`.
    pub name: String,
    /// Direct content URL, when the listing supplied one.
    pub download_url: Option<String>,
}

impl FileRef {
    /// Repository-relative path of the file.
    pub fn path(&self) -> String {
        format!("messages/{}", self.name)
    }
}

/// Provenance of the most recent change to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHistory {
    pub author: String,
    pub date: DateTime<Utc>,
    pub commit_hash: String,
}

/// Remote API surface the sync engine consumes.
///
/// Implementations perform no side effects beyond the network calls
/// themselves. Every production call path is expected to run through
/// [`RateLimited`], since the quota is global to the credentials.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List forks of a repository.
    async fn list_forks(&self, owner: &str, repo: &str) -> Result<Vec<ForkRef>>;

    /// List entries of the messages folder. Fails with `NotFound` when the
    /// folder does not exist; callers treat that as zero messages.
    async fn list_message_files(&self, owner: &str, repo: &str) -> Result<Vec<FileRef>>;

    /// Fetch the text content of one message file.
    async fn fetch_content(&self, file: &FileRef) -> Result<String>;

    /// Look up author/date/hash of the most recent change to a path.
    /// `None` when no history is available.
    async fn fetch_path_history(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<PathHistory>>;
}

/// Rate-limited wrapper around any [`RemoteSource`].
///
/// Acquires a slot from the shared limiter before delegating, so all
/// traffic funnels through one quota no matter which worker issues it.
pub struct RateLimited<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> RateLimited<S> {
    pub fn new(inner: S, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RemoteSource> RemoteSource for RateLimited<S> {
    async fn list_forks(&self, owner: &str, repo: &str) -> Result<Vec<ForkRef>> {
        self.limiter.acquire().await?;
        self.inner.list_forks(owner, repo).await
    }

    async fn list_message_files(&self, owner: &str, repo: &str) -> Result<Vec<FileRef>> {
        self.limiter.acquire().await?;
        self.inner.list_message_files(owner, repo).await
    }

    async fn fetch_content(&self, file: &FileRef) -> Result<String> {
        self.limiter.acquire().await?;
        self.inner.fetch_content(file).await
    }

    async fn fetch_path_history(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<PathHistory>> {
        self.limiter.acquire().await?;
        self.inner.fetch_path_history(owner, repo, path).await
    }
}
