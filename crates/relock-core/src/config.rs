use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default npm registry used when a record does not name one.
pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Default yarn registry, used by yarn-classic `resolved` URLs.
pub const YARN_REGISTRY: &str = "https://registry.yarnpkg.com";

/// Runtime configuration for the relock CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Directory receiving intermediate snapshot/tree/placement dumps.
    pub debug_dir: Option<PathBuf>,

    /// Reject snapshots with more records than this before resolving.
    pub max_entries: Option<usize>,

    /// Output shaping options.
    pub format: FormatOptions,
}

/// Options that affect emitted lockfile text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    pub npm_registry: String,
    pub yarn_registry: String,
    /// `__metadata.version` written to yarn-berry lockfiles.
    pub berry_metadata_version: u32,
    /// `__metadata.cacheKey` written to yarn-berry lockfiles.
    pub berry_cache_key: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            npm_registry: NPM_REGISTRY.to_string(),
            yarn_registry: YARN_REGISTRY.to_string(),
            berry_metadata_version: 6,
            berry_cache_key: "8".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            debug_dir: None,
            max_entries: None,
            format: FormatOptions::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    #[must_use]
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    #[must_use]
    pub fn with_max_entries(mut self, limit: Option<usize>) -> Self {
        self.max_entries = limit;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: FormatOptions) -> Self {
        self.format = format;
        self
    }
}
