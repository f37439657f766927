// bananachat sync engine.
// Aggregates chat messages stored as files in a GitHub repository and its
// forks into a deduplicated local cache, which presentation layers read.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod github;
pub mod limiter;
pub mod message;
pub mod source;
pub mod sync;

pub use cache::{CacheStore, IndexEntry};
pub use config::Config;
pub use error::{ChatError, Result};
pub use fetch::{FetchPolicy, SourceFetch};
pub use github::GitHubClient;
pub use limiter::RateLimiter;
pub use message::{IdentityKey, Message, Origin};
pub use source::{FileRef, ForkRef, PathHistory, RateLimited, RemoteSource, Source};
pub use sync::{SourceError, SyncOptions, SyncOrchestrator, SyncOutcome, SyncPhase};
