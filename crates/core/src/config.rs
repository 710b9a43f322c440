use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub rules: RuleHandlerConfig,
    pub collections: CollectionHandlerConfig,
    pub tasks: TaskConfig,
    pub tautulli: TautulliConfig,
    pub notifications: NotificationConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CULLER_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CULLER_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            rules: RuleHandlerConfig::from_env_profiled(p),
            collections: CollectionHandlerConfig::from_env_profiled(p),
            tasks: TaskConfig::from_env_profiled(p),
            tautulli: TautulliConfig::from_env_profiled(p),
            notifications: NotificationConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  rules:         cron={}, concurrency={}",
            self.rules.cron,
            self.rules.concurrency
        );
        tracing::info!("  collections:   cron={}", self.collections.cron);
        tracing::info!(
            "  tasks:         attempts={}, retry={}s, stale_after={}",
            self.tasks.registration_attempts,
            self.tasks.registration_retry_secs,
            self.tasks
                .stale_after_secs
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "never".to_string())
        );
        tracing::info!(
            "  tautulli:      watched_percent={}",
            self.tautulli.watched_percent
        );
        tracing::info!(
            "  notifications: webhook={}, events={}",
            if self.notifications.webhook_url.is_some() {
                "configured"
            } else {
                "(none)"
            },
            self.notifications.events.len()
        );
        tracing::info!(
            "  storage:       snapshot={}",
            self.storage
                .snapshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(memory only)".to_string())
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "rules": { "cron": self.rules.cron, "concurrency": self.rules.concurrency },
            "collections": { "cron": self.collections.cron },
            "tasks": {
                "registration_attempts": self.tasks.registration_attempts,
                "stale_after_secs": self.tasks.stale_after_secs,
            },
            "tautulli": { "watched_percent": self.tautulli.watched_percent },
            "notifications": {
                "configured": self.notifications.is_configured(),
                "events": self.notifications.events,
            },
            "storage": { "snapshot_path": self.storage.snapshot_path },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            rules: RuleHandlerConfig::default(),
            collections: CollectionHandlerConfig::default(),
            tasks: TaskConfig::default(),
            tautulli: TautulliConfig::default(),
            notifications: NotificationConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

// ── Rule handler ──────────────────────────────────────────────

pub const DEFAULT_RULE_HANDLER_CRON: &str = "0 0-23/8 * * *";
pub const DEFAULT_COLLECTION_HANDLER_CRON: &str = "0 0-23/12 * * *";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleHandlerConfig {
    pub cron: String,
    /// Maximum number of items evaluated concurrently.
    pub concurrency: usize,
    /// Items per abort checkpoint.
    pub batch_size: usize,
    /// Minimum interval between progress events.
    pub progress_interval_ms: u64,
}

impl RuleHandlerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron: profiled_env_or(p, "RULE_HANDLER_CRON", DEFAULT_RULE_HANDLER_CRON),
            concurrency: profiled_env_u64(p, "RULE_HANDLER_CONCURRENCY", 8).max(1) as usize,
            batch_size: profiled_env_u64(p, "RULE_HANDLER_BATCH_SIZE", 50).max(1) as usize,
            progress_interval_ms: profiled_env_u64(p, "RULE_HANDLER_PROGRESS_MS", 1000),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for RuleHandlerConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_RULE_HANDLER_CRON.to_string(),
            concurrency: 8,
            batch_size: 50,
            progress_interval_ms: 1000,
        }
    }
}

// ── Collection handler ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionHandlerConfig {
    pub cron: String,
}

impl CollectionHandlerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            cron: profiled_env_or(
                p,
                "COLLECTION_HANDLER_CRON",
                DEFAULT_COLLECTION_HANDLER_CRON,
            ),
        }
    }
}

impl Default for CollectionHandlerConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_COLLECTION_HANDLER_CRON.to_string(),
        }
    }
}

// ── Task runner ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// How many times job registration is attempted at bootstrap.
    pub registration_attempts: u32,
    pub registration_retry_secs: u64,
    /// Poll interval while waiting for running tasks on shutdown.
    pub shutdown_poll_ms: u64,
    /// A `running` ledger row older than this is reclaimable. `None` keeps
    /// manual-reset semantics.
    pub stale_after_secs: Option<u64>,
}

impl TaskConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            registration_attempts: profiled_env_u32(p, "TASK_REGISTRATION_ATTEMPTS", 3).max(1),
            registration_retry_secs: profiled_env_u64(p, "TASK_REGISTRATION_RETRY_SECS", 10),
            shutdown_poll_ms: profiled_env_u64(p, "TASK_SHUTDOWN_POLL_MS", 1000),
            stale_after_secs: profiled_env_opt(p, "TASK_STALE_AFTER_SECS")
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn registration_retry(&self) -> Duration {
        Duration::from_secs(self.registration_retry_secs)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }

    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_secs.map(Duration::from_secs)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            registration_attempts: 3,
            registration_retry_secs: 10,
            shutdown_poll_ms: 1000,
            stale_after_secs: None,
        }
    }
}

// ── Tautulli ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TautulliConfig {
    /// Percent-complete at which a play counts as watched.
    pub watched_percent: f64,
}

impl TautulliConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            watched_percent: profiled_env_f64(p, "TAUTULLI_WATCHED_PERCENT", 90.0),
        }
    }
}

impl Default for TautulliConfig {
    fn default() -> Self {
        Self {
            watched_percent: 90.0,
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    /// Event type names the webhook subscribes to (empty = media events only).
    pub events: Vec<String>,
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
    /// Extra webhook request headers, each `Name=value`.
    pub webhook_headers: Vec<String>,
    /// minijinja template producing the webhook's JSON document.
    pub webhook_payload_template: Option<String>,
}

impl NotificationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            events: profiled_env_list(p, "NOTIFY_EVENTS"),
            subject_template: profiled_env_opt(p, "NOTIFY_SUBJECT_TEMPLATE"),
            body_template: profiled_env_opt(p, "NOTIFY_BODY_TEMPLATE"),
            webhook_headers: profiled_env_list(p, "NOTIFY_WEBHOOK_HEADERS"),
            webhook_payload_template: profiled_env_opt(p, "NOTIFY_WEBHOOK_PAYLOAD"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot file. When unset, state lives in memory only.
    pub snapshot_path: Option<PathBuf>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            snapshot_path: profiled_env_opt(p, "CULLER_SNAPSHOT_PATH").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.rules.cron, DEFAULT_RULE_HANDLER_CRON);
        assert_eq!(config.collections.cron, DEFAULT_COLLECTION_HANDLER_CRON);
        assert_eq!(config.tasks.registration_attempts, 3);
        assert_eq!(config.tasks.registration_retry(), Duration::from_secs(10));
        assert!(config.tasks.stale_after().is_none());
        assert_eq!(config.tautulli.watched_percent, 90.0);
        assert!(!config.notifications.is_configured());
    }

    #[test]
    fn profile_label_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn redacted_summary_has_no_webhook_url() {
        let mut config = Config::default();
        config.notifications.webhook_url = Some("https://hooks.example/secret".to_string());
        let summary = config.redacted_summary().to_string();
        assert!(!summary.contains("secret"));
        assert!(summary.contains("\"configured\":true"));
    }
}
