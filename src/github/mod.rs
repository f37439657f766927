// GitHub API module.
// Provides the client and wire types backing the RemoteSource trait.

pub mod client;
pub mod source;
pub mod types;

pub use client::GitHubClient;
pub use types::RateLimitSnapshot;
