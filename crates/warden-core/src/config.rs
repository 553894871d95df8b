//! Configuration resolution for Warden.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/warden/settings.json`)
//! 3. Project config (.warden/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::MarkerClassifier;
use crate::error::{Error, Result};
use crate::policy::{
    DEFAULT_BACKGROUND_GRACE_MS, DEFAULT_INTER_OPERATION_PAUSE_MS, DEFAULT_INTERACTIVE_GRACE_MS,
    DEFAULT_KILL_CONFIRM_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, EscalationPolicy,
};

/// Complete Warden configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stop escalation and progress timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub interactive_grace_ms: u64,
    pub background_grace_ms: u64,
    pub inter_operation_pause_ms: u64,
    pub poll_interval_ms: u64,
    pub kill_confirm_timeout_ms: u64,
    /// Seconds between liveness messages while waiting on a worker.
    pub progress_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interactive_grace_ms: DEFAULT_INTERACTIVE_GRACE_MS,
            background_grace_ms: DEFAULT_BACKGROUND_GRACE_MS,
            inter_operation_pause_ms: DEFAULT_INTER_OPERATION_PAUSE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            kill_confirm_timeout_ms: DEFAULT_KILL_CONFIRM_TIMEOUT_MS,
            progress_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Markers appended after the built-in interactive markers.
    #[serde(default)]
    pub extra_interactive_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Signatures appended after the built-in sweep signatures.
    #[serde(default)]
    pub extra_signatures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// On-disk layer: every field optional so that a layer only overrides what
/// it names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    supervisor: SupervisorLayer,
    classifier: ClassifierConfig,
    scanner: ScannerConfig,
    logging: LoggingLayer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SupervisorLayer {
    interactive_grace_ms: Option<u64>,
    background_grace_ms: Option<u64>,
    inter_operation_pause_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    kill_confirm_timeout_ms: Option<u64>,
    progress_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingLayer {
    level: Option<String>,
    json: Option<bool>,
}

impl Config {
    /// Reject configurations that break the grace ordering or would spin.
    pub fn validate(&self) -> Result<()> {
        self.escalation_policy()?;
        if self.supervisor.poll_interval_ms == 0 {
            return Err(Error::Config(
                "supervisor.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.supervisor.progress_interval_secs == 0 {
            return Err(Error::Config(
                "supervisor.progress_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the escalation policy described by this config.
    pub fn escalation_policy(&self) -> Result<EscalationPolicy> {
        let s = &self.supervisor;
        Ok(EscalationPolicy::new(
            Duration::from_millis(s.interactive_grace_ms),
            Duration::from_millis(s.background_grace_ms),
        )?
        .with_inter_operation_pause(Duration::from_millis(s.inter_operation_pause_ms))
        .with_poll_interval(Duration::from_millis(s.poll_interval_ms))
        .with_kill_confirm_timeout(Duration::from_millis(s.kill_confirm_timeout_ms)))
    }

    /// Built-in classifier extended with the configured markers.
    pub fn classifier(&self) -> MarkerClassifier {
        let mut classifier = MarkerClassifier::new();
        classifier.extend(self.classifier.extra_interactive_markers.iter().cloned());
        classifier
    }

    pub const fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.supervisor.progress_interval_secs)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    load_config_from(global_config_path().as_deref(), project_dir, |key| {
        std::env::var(key).ok()
    })
}

/// Load configuration from explicit sources.
///
/// `env` resolves environment variable names; [`load_config`] passes the
/// process environment.
pub fn load_config_from(
    global_path: Option<&Path>,
    project_dir: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            let global = load_config_file(global_path)?;
            merge_config(&mut config, global);
        }
    }

    if let Some(dir) = project_dir {
        let project_path = project_config_path(dir);
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("warden").join("settings.json"))
}

/// Project config file path under `dir`.
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".warden").join("settings.json")
}

fn load_config_file(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigLayer) {
    let s = overlay.supervisor;
    let b = &mut base.supervisor;
    if let Some(v) = s.interactive_grace_ms {
        b.interactive_grace_ms = v;
    }
    if let Some(v) = s.background_grace_ms {
        b.background_grace_ms = v;
    }
    if let Some(v) = s.inter_operation_pause_ms {
        b.inter_operation_pause_ms = v;
    }
    if let Some(v) = s.poll_interval_ms {
        b.poll_interval_ms = v;
    }
    if let Some(v) = s.kill_confirm_timeout_ms {
        b.kill_confirm_timeout_ms = v;
    }
    if let Some(v) = s.progress_interval_secs {
        b.progress_interval_secs = v;
    }

    // Marker and signature lists accumulate across layers
    base.classifier
        .extra_interactive_markers
        .extend(overlay.classifier.extra_interactive_markers);
    base.scanner
        .extra_signatures
        .extend(overlay.scanner.extra_signatures);

    if let Some(level) = overlay.logging.level {
        base.logging.level = level;
    }
    if let Some(json) = overlay.logging.json {
        base.logging.json = json;
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) {
    if let Some(n) = env("WARDEN_INTERACTIVE_GRACE_MS").and_then(|v| v.parse().ok()) {
        config.supervisor.interactive_grace_ms = n;
    }
    if let Some(n) = env("WARDEN_BACKGROUND_GRACE_MS").and_then(|v| v.parse().ok()) {
        config.supervisor.background_grace_ms = n;
    }
    if let Some(n) = env("WARDEN_PROGRESS_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
        config.supervisor.progress_interval_secs = n;
    }
    if let Some(val) = env("WARDEN_LOG_LEVEL") {
        config.logging.level = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::classify::{Classification, Classify};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.supervisor.interactive_grace_ms, 15_000);
        assert_eq!(config.supervisor.background_grace_ms, 5_000);
        assert_eq!(config.progress_interval(), Duration::from_secs(30));
    }

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            load_config_from(Some(&dir.path().join("nope.json")), Some(dir.path()), no_env)
                .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn project_overrides_global_field_by_field() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        write(
            &global,
            r#"{"supervisor": {"interactive_grace_ms": 20000, "background_grace_ms": 4000}}"#,
        );
        write(
            &project_config_path(dir.path()),
            r#"{"supervisor": {"background_grace_ms": 3000}, "logging": {"json": true}}"#,
        );

        let config = load_config_from(Some(&global), Some(dir.path()), no_env).unwrap();
        assert_eq!(config.supervisor.interactive_grace_ms, 20_000);
        assert_eq!(config.supervisor.background_grace_ms, 3_000);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn markers_accumulate_across_layers() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.json");
        write(
            &global,
            r#"{"classifier": {"extra_interactive_markers": ["agent-loop"]}}"#,
        );
        write(
            &project_config_path(dir.path()),
            r#"{"classifier": {"extra_interactive_markers": ["review-bot"]},
                "scanner": {"extra_signatures": ["lint-watch"]}}"#,
        );

        let config = load_config_from(Some(&global), Some(dir.path()), no_env).unwrap();
        assert_eq!(
            config.classifier.extra_interactive_markers,
            vec!["agent-loop".to_string(), "review-bot".to_string()]
        );
        assert_eq!(config.scanner.extra_signatures, vec!["lint-watch".to_string()]);

        let classifier = config.classifier();
        assert_eq!(
            classifier.classify("node review-bot.js"),
            Classification::Interactive
        );
    }

    #[test]
    fn env_overrides_files() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &project_config_path(dir.path()),
            r#"{"supervisor": {"interactive_grace_ms": 20000}}"#,
        );
        let env = |key: &str| match key {
            "WARDEN_INTERACTIVE_GRACE_MS" => Some("30000".to_string()),
            "WARDEN_LOG_LEVEL" => Some("debug".to_string()),
            "WARDEN_BACKGROUND_GRACE_MS" => Some("not-a-number".to_string()),
            _ => None,
        };
        let config = load_config_from(None, Some(dir.path()), env).unwrap();
        assert_eq!(config.supervisor.interactive_grace_ms, 30_000);
        assert_eq!(config.supervisor.background_grace_ms, 5_000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn inverted_grace_periods_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &project_config_path(dir.path()),
            r#"{"supervisor": {"interactive_grace_ms": 1000, "background_grace_ms": 2000}}"#,
        );
        let err = load_config_from(None, Some(dir.path()), no_env).unwrap_err();
        assert!(matches!(err, Error::InvalidPolicy { .. }));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write(&project_config_path(dir.path()), "{ not json");
        let err = load_config_from(None, Some(dir.path()), no_env).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Failed to parse")));
    }

    #[test]
    fn zero_progress_interval_is_rejected() {
        let mut config = Config::default();
        config.supervisor.progress_interval_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
