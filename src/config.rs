// Configuration loading.
// JSON file in the home directory with BANANACHAT_* environment overrides,
// plus the sync tuning knobs the engine needs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::default_cache_dir;
use crate::error::Result;
use crate::fetch::FetchPolicy;
use crate::limiter::{DEFAULT_MAX_CALLS, DEFAULT_WINDOW};

const CONFIG_FILE_NAME: &str = ".bananachat.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github_token: String,
    pub owner: String,
    pub repo: String,
    pub cache_dir: PathBuf,
    /// Client-side quota: calls per rolling window.
    pub rate_limit_calls: usize,
    pub rate_limit_window_secs: u64,
    /// Surface `RateLimited` instead of waiting out the window.
    pub rate_limit_fail_fast: bool,
    /// Concurrent source fetches.
    pub concurrency: usize,
    /// Budget for one source's whole fetch, rate waits included.
    pub source_timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        let policy = FetchPolicy::default();
        Self {
            github_token: String::new(),
            owner: String::new(),
            repo: String::new(),
            cache_dir: default_cache_dir()
                .unwrap_or_else(|| PathBuf::from(".bananachat").join("cache")),
            rate_limit_calls: DEFAULT_MAX_CALLS,
            rate_limit_window_secs: DEFAULT_WINDOW.as_secs(),
            rate_limit_fail_fast: false,
            concurrency: 4,
            source_timeout_secs: 300,
            max_retries: policy.max_retries,
        }
    }
}

impl Config {
    /// Default config file location (`~/.bananachat.json`).
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from the default location with environment overrides applied.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file. A missing file yields the defaults; an
    /// unreadable document is logged and also falls back to defaults, the
    /// same forgiving behavior the config file has always had.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        match serde_json::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Persist the config to a file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `BANANACHAT_*` overrides from an environment lookup. Injected
    /// as a closure so tests never touch process-global state.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env("BANANACHAT_GITHUB_TOKEN") {
            self.github_token = token;
        }
        if let Some(owner) = env("BANANACHAT_OWNER") {
            self.owner = owner;
        }
        if let Some(repo) = env("BANANACHAT_REPO") {
            self.repo = repo;
        }
        if let Some(dir) = env("BANANACHAT_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.max_retries,
            ..FetchPolicy::default()
        }
    }
}
