//! Flags shared by every subcommand, and the last configuration layer they form.

use std::path::PathBuf;

use anyhow::{Context, Result};
use warden_core::Config;
use warden_core::config::load_config;

#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Log level or filter directive (overrides config and WARDEN_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Project directory holding `.warden/settings.json` (default: current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Grace period for interactive workers, in milliseconds
    #[arg(long, global = true)]
    pub interactive_grace_ms: Option<u64>,

    /// Grace period for background workers, in milliseconds
    #[arg(long, global = true)]
    pub background_grace_ms: Option<u64>,

    /// Seconds between "still running" messages
    #[arg(long, global = true)]
    pub progress_interval_secs: Option<u64>,
}

impl GlobalArgs {
    /// Resolve files and environment, then apply these flags on top.
    pub fn resolve(&self) -> Result<Config> {
        let project_dir = match &self.project_dir {
            Some(dir) => Some(dir.clone()),
            None => std::env::current_dir().ok(),
        };
        let config = load_config(project_dir.as_deref()).context("Failed to load configuration")?;
        self.apply(config)
    }

    /// Apply flag overrides to `config` and re-check it.
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        if self.log_json {
            config.logging.json = true;
        }
        if let Some(ms) = self.interactive_grace_ms {
            config.supervisor.interactive_grace_ms = ms;
        }
        if let Some(ms) = self.background_grace_ms {
            config.supervisor.background_grace_ms = ms;
        }
        if let Some(secs) = self.progress_interval_secs {
            config.supervisor.progress_interval_secs = secs;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = GlobalArgs {
            log_level: Some("debug".into()),
            log_json: true,
            interactive_grace_ms: Some(20_000),
            progress_interval_secs: Some(5),
            ..GlobalArgs::default()
        };
        let config = args.apply(Config::default()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.supervisor.interactive_grace_ms, 20_000);
        assert_eq!(config.supervisor.background_grace_ms, 5_000);
        assert_eq!(config.supervisor.progress_interval_secs, 5);
    }

    #[test]
    fn flags_cannot_break_grace_ordering() {
        let args = GlobalArgs {
            background_grace_ms: Some(30_000),
            ..GlobalArgs::default()
        };
        assert!(args.apply(Config::default()).is_err());
    }

    #[test]
    fn project_dir_layer_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".warden")).unwrap();
        std::fs::write(
            dir.path().join(".warden/settings.json"),
            r#"{"scanner": {"extra_signatures": ["my-agent"]}}"#,
        )
        .unwrap();
        let args = GlobalArgs {
            project_dir: Some(dir.path().to_path_buf()),
            ..GlobalArgs::default()
        };
        let config = args.resolve().unwrap();
        assert!(config
            .scanner
            .extra_signatures
            .iter()
            .any(|s| s == "my-agent"));
    }
}
