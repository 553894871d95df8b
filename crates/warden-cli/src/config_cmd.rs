//! `warden config`: print the resolved configuration.

use anyhow::{Context, Result};
use warden_core::Config;
use warden_core::config::{global_config_path, project_config_path};

use crate::settings::GlobalArgs;

/// Execute `warden config`.
#[allow(clippy::print_stdout)]
pub fn run(global: &GlobalArgs, config: &Config) -> Result<()> {
    if let Some(path) = global_config_path() {
        println!("# global:  {}", path.display());
    }
    let project_dir = match &global.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    println!("# project: {}", project_config_path(&project_dir).display());

    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{json}");
    Ok(())
}
