//! `warden classify`: show how a command line would be treated on stop.

use anyhow::{Context, Result};
use serde::Serialize;
use warden_core::policy::duration_ms;
use warden_core::{Classification, Classify, Config};

#[derive(clap::Args, Debug, Clone)]
pub struct ClassifyArgs {
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Command line to classify
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command_line: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ClassifyReport {
    pub command_line: String,
    pub classification: Classification,
    pub grace_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

pub fn classify(command_line: &str, config: &Config) -> Result<ClassifyReport> {
    let classifier = config.classifier();
    let policy = config.escalation_policy()?;
    let classification = classifier.classify(command_line);
    Ok(ClassifyReport {
        command_line: command_line.to_string(),
        classification,
        grace_ms: duration_ms(policy.grace_period(classification)),
        marker: classifier.matching_marker(command_line).map(str::to_string),
    })
}

/// Execute `warden classify`.
#[allow(clippy::print_stdout)]
pub fn run(args: &ClassifyArgs, config: &Config) -> Result<()> {
    let report = classify(&args.command_line.join(" "), config)?;
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        match &report.marker {
            Some(marker) => println!(
                "{} (grace {} ms, matched \"{marker}\")",
                report.classification, report.grace_ms
            ),
            None => println!("{} (grace {} ms)", report.classification, report.grace_ms),
        }
    }
    Ok(())
}
