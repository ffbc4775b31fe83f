use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the event store database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `None` opens a private in-memory
    /// database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Enable WAL mode (file-backed databases only)
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite synchronous mode
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// SQLite cache size (in pages, negative = KB)
    /// Default: -64000 (64MB)
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// How long a writer waits for another connection's write lock
    /// Default: 5000ms
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// Full fsync (safest, slowest)
    Full,
    /// fsync at critical moments (good balance)
    #[default]
    Normal,
    /// No fsync (fastest, least safe)
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

fn default_wal_mode() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -64000 // 64MB
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            cache_size: default_cache_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub fn with_cache_size(mut self, cache_size: i32) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cfg: StoreConfig = serde_json::from_str(r#"{ "path": "/tmp/keel.db" }"#).unwrap();
        assert_eq!(cfg.path, Some(PathBuf::from("/tmp/keel.db")));
        assert!(cfg.wal_mode);
        assert_eq!(cfg.synchronous, SynchronousMode::Normal);
        assert_eq!(cfg.cache_size, -64000);
        assert_eq!(cfg.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_in_memory_has_no_path() {
        let cfg = StoreConfig::in_memory().with_busy_timeout(10);
        assert!(cfg.path.is_none());
        assert_eq!(cfg.busy_timeout_ms, 10);
    }
}
