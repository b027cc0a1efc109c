use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// PostgreSQL connection URL for the durable store (memory store when unset)
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Path of the CSV ledger journal (journal disabled when unset)
    #[serde(default)]
    pub ledger_journal: Option<String>,
}

/// Transition coordinator tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinatorConfig {
    /// How long a transition request may wait on the per-barter lock
    /// before failing with `Busy` (milliseconds)
    pub lock_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Listing reconciliation worker tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconcilerConfig {
    /// How often to scan for unreleased listings (seconds)
    pub scan_interval_secs: u64,
    /// How long a completed barter may sit with its listing still active
    /// before the worker picks it up (seconds)
    pub stale_threshold_secs: u64,
    /// Maximum records to process per scan
    pub batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "barter-core.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            coordinator: CoordinatorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            postgres_url: None,
            ledger_journal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.coordinator.lock_timeout(), Duration::from_millis(2_000));
        assert_eq!(cfg.reconciler.batch_size, 100);
        assert!(cfg.postgres_url.is_none());
    }

    #[test]
    fn partial_yaml_uses_section_defaults() {
        let yaml = r#"
log_level: debug
log_dir: ./logs
log_file: test.log
use_json: false
rotation: never
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.coordinator.lock_timeout_ms, 2_000);
        assert_eq!(cfg.reconciler.scan_interval_secs, 30);
    }
}
