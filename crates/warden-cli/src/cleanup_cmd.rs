//! `warden cleanup`: sweep orphaned workers from the process table.

use anyhow::{Context, Result};
use warden_core::Config;
use warden_supervisor::{OrphanScanner, ScanOptions, ScanOutcome, ScanResult};

#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct CleanupArgs {
    /// List what would be stopped without sending any signal
    #[arg(long)]
    pub dry_run: bool,

    /// Send SIGKILL to workers that survive their grace period
    #[arg(long)]
    pub force: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute `warden cleanup`, returning the process exit code.
pub async fn run(args: CleanupArgs, config: &Config) -> Result<u8> {
    let scanner = OrphanScanner::from_config(config).context("Invalid scanner settings")?;
    let result = scanner
        .scan(ScanOptions {
            dry_run: args.dry_run,
            force: args.force,
        })
        .await
        .context("Orphan sweep failed")?;

    print_result(&result, args)?;
    Ok(u8::from(result.has_errors()))
}

#[allow(clippy::print_stdout)]
fn print_result(result: &ScanResult, args: CleanupArgs) -> Result<()> {
    if args.json {
        let json =
            serde_json::to_string_pretty(result).context("Failed to serialize scan result")?;
        println!("{json}");
        return Ok(());
    }

    for entry in &result.entries {
        let outcome = match entry.outcome {
            ScanOutcome::Cleaned => "cleaned",
            ScanOutcome::Errored => "errored",
            ScanOutcome::SkippedDryRun => "would stop",
        };
        let classification = entry.classification.to_string();
        let detail = entry
            .detail
            .as_ref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "{:>7}  {classification:<11}  {outcome:<10}  {}{detail}",
            entry.pid, entry.command_line
        );
    }
    println!("{}", summary_line(result));
    Ok(())
}

fn summary_line(result: &ScanResult) -> String {
    let s = result.summary();
    if s.candidates == 0 {
        return "No orphaned workers found".to_string();
    }
    format!(
        "{} candidate(s): {} cleaned, {} errored, {} skipped",
        s.candidates, s.cleaned, s.errored, s.skipped
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{Classification, ProcessState};
    use warden_supervisor::ScanEntry;

    #[test]
    fn summary_line_reports_counts() {
        assert_eq!(
            summary_line(&ScanResult::default()),
            "No orphaned workers found"
        );
        let result = ScanResult {
            entries: vec![ScanEntry {
                pid: 42,
                command_line: "mutmut run".into(),
                classification: Classification::Background,
                outcome: ScanOutcome::SkippedDryRun,
                final_state: ProcessState::Running,
                detail: None,
            }],
        };
        assert_eq!(
            summary_line(&result),
            "1 candidate(s): 0 cleaned, 0 errored, 1 skipped"
        );
    }
}
