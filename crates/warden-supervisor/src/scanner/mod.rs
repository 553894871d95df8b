//! Orphan sweep.
//!
//! Finds processes matching known worker signatures anywhere in the process
//! table and drives each one through the same polite-stop, grace, force-kill
//! escalation the supervisor uses. Candidates are handled one at a time with
//! a short pause in between.

mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use warden_core::classify::DEFAULT_INTERACTIVE_MARKERS;
use warden_core::policy::duration_ms;
use warden_core::{Classification, Classify, Config, EscalationPolicy, ManagedProcess};

pub use types::{ScanEntry, ScanOptions, ScanOutcome, ScanResult, ScanSummary};

use crate::error::{ScanError, SignalError};
use crate::process_table::{ProcessEntry, ProcessTable, SignalKind, SystemProcessTable};

/// Tooling fragments swept in addition to the interactive markers.
pub const DEFAULT_TOOLING_SIGNATURES: &[&str] = &[
    "python-test-runner",
    "python-runner.py",
    "mutmut run",
    "pytest-watch",
    "ptw ",
];

const ALREADY_EXITED: &str = "already exited";

pub struct OrphanScanner {
    table: Arc<dyn ProcessTable>,
    classifier: Arc<dyn Classify>,
    policy: EscalationPolicy,
    signatures: Vec<String>,
    self_pid: u32,
}

impl OrphanScanner {
    pub fn new(
        table: Arc<dyn ProcessTable>,
        classifier: Arc<dyn Classify>,
        policy: EscalationPolicy,
    ) -> Self {
        Self {
            table,
            classifier,
            policy,
            signatures: Self::default_signatures(),
            self_pid: std::process::id(),
        }
    }

    /// Scanner over the real process table with signatures from `config`.
    pub fn from_config(config: &Config) -> warden_core::Result<Self> {
        let mut scanner = Self::new(
            Arc::new(SystemProcessTable),
            Arc::new(config.classifier()),
            config.escalation_policy()?,
        );
        scanner.signatures.extend(
            config
                .scanner
                .extra_signatures
                .iter()
                .filter(|s| !s.is_empty())
                .cloned(),
        );
        Ok(scanner)
    }

    pub fn default_signatures() -> Vec<String> {
        DEFAULT_INTERACTIVE_MARKERS
            .iter()
            .chain(DEFAULT_TOOLING_SIGNATURES)
            .map(|s| (*s).to_string())
            .collect()
    }

    #[must_use]
    pub fn with_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signatures = signatures.into_iter().map(Into::into).collect();
        self
    }

    /// Treat `pid` as the scanner's own process. Its ancestors are excluded too.
    #[must_use]
    pub const fn with_self_pid(mut self, pid: u32) -> Self {
        self.self_pid = pid;
        self
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    fn matches(&self, command_line: &str) -> bool {
        self.signatures.iter().any(|s| command_line.contains(s.as_str()))
    }

    /// Enumerate the table and keep matching processes, in enumeration order.
    ///
    /// The scanner's own pid and its ancestor chain are never candidates: the
    /// shell or runner that launched the sweep often matches a signature itself.
    pub async fn find_candidates(&self) -> Result<Vec<ProcessEntry>, ScanError> {
        let table = Arc::clone(&self.table);
        let entries = tokio::task::spawn_blocking(move || table.snapshot())
            .await
            .map_err(|e| ScanError::Enumeration {
                reason: format!("enumeration task failed: {e}"),
            })??;

        let excluded = ancestry(&entries, self.self_pid);
        Ok(entries
            .into_iter()
            .filter(|e| !excluded.contains(&e.pid) && self.matches(&e.command_line))
            .collect())
    }

    /// Run one sweep. Fails only when the process table cannot be read.
    pub async fn scan(&self, options: ScanOptions) -> Result<ScanResult, ScanError> {
        let candidates = self.find_candidates().await?;
        info!(
            candidates = candidates.len(),
            dry_run = options.dry_run,
            force = options.force,
            "Starting orphan sweep"
        );

        let mut result = ScanResult::default();
        for (index, candidate) in candidates.into_iter().enumerate() {
            if index > 0 && !options.dry_run {
                tokio::time::sleep(self.policy.inter_operation_pause()).await;
            }
            let entry = self.process_candidate(candidate, options).await;
            debug!(pid = entry.pid, outcome = ?entry.outcome, "Candidate processed");
            result.entries.push(entry);
        }

        info!(
            cleaned = result.cleaned_count(),
            errored = result.error_count(),
            skipped = result.skipped_count(),
            "Orphan sweep finished"
        );
        Ok(result)
    }

    async fn process_candidate(&self, candidate: ProcessEntry, options: ScanOptions) -> ScanEntry {
        let mut process =
            ManagedProcess::new(candidate.pid, candidate.command_line, self.classifier.as_ref());
        let pid = process.pid();

        if options.dry_run {
            info!(
                pid,
                classification = %process.classification(),
                command = %process.command_line(),
                "Dry run: would stop process"
            );
            return entry(&process, ScanOutcome::SkippedDryRun, None);
        }

        if let Err(e) = self.table.signal(pid, SignalKind::PoliteStop) {
            return signal_failed(&mut process, &e);
        }
        let grace = match process.request_termination(&self.policy, Instant::now().into_std()) {
            Ok(grace) => grace,
            Err(e) => return entry(&process, ScanOutcome::Errored, Some(e.to_string())),
        };
        info!(
            pid,
            classification = %process.classification(),
            grace_ms = duration_ms(grace),
            "Sent SIGTERM to orphan"
        );

        let gone = match process.classification() {
            // Interactive workers get the full window to persist state.
            Classification::Interactive => {
                tokio::time::sleep(grace).await;
                !self.table.is_alive(pid)
            }
            Classification::Background => self.wait_gone(pid, grace).await,
        };
        if gone {
            let _ = process.mark_exited();
            return entry(&process, ScanOutcome::Cleaned, None);
        }

        if !options.force {
            warn!(pid, "Orphan survived SIGTERM; rerun with --force to kill it");
            return entry(
                &process,
                ScanOutcome::Errored,
                Some("still running after grace period".to_string()),
            );
        }

        if let Err(e) = process.request_force_kill(Instant::now().into_std()) {
            return entry(&process, ScanOutcome::Errored, Some(e.to_string()));
        }
        warn!(pid, "Grace period elapsed, sending SIGKILL to orphan");
        if let Err(e) = self.table.signal(pid, SignalKind::ForceKill) {
            return signal_failed(&mut process, &e);
        }

        if self.wait_gone(pid, self.policy.kill_confirm_timeout()).await {
            let _ = process.mark_exited();
            entry(&process, ScanOutcome::Cleaned, None)
        } else {
            entry(
                &process,
                ScanOutcome::Cleaned,
                Some("SIGKILL sent; exit not yet observed".to_string()),
            )
        }
    }

    /// Poll liveness until `pid` is gone or `limit` has passed.
    async fn wait_gone(&self, pid: u32, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if !self.table.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.policy.poll_interval().min(deadline - now)).await;
        }
    }
}

/// A vanished target counts as cleaned; anything else is an error.
fn signal_failed(process: &mut ManagedProcess, error: &SignalError) -> ScanEntry {
    if error.is_vanished() {
        debug!(pid = process.pid(), "Orphan already exited");
        let _ = process.mark_exited();
        return entry(process, ScanOutcome::Cleaned, Some(ALREADY_EXITED.to_string()));
    }
    warn!(pid = process.pid(), error = %error, "Failed to signal orphan");
    let _ = process.mark_unreachable();
    entry(process, ScanOutcome::Errored, Some(error.to_string()))
}

fn entry(process: &ManagedProcess, outcome: ScanOutcome, detail: Option<String>) -> ScanEntry {
    ScanEntry {
        pid: process.pid(),
        command_line: process.command_line().to_string(),
        classification: process.classification(),
        outcome,
        final_state: process.state(),
        detail,
    }
}

/// `pid` plus every ancestor reachable through the snapshot's parent links.
fn ancestry(entries: &[ProcessEntry], pid: u32) -> HashSet<u32> {
    let parents: HashMap<u32, u32> = entries.iter().map(|e| (e.pid, e.ppid)).collect();
    let mut chain = HashSet::from([pid]);
    let mut current = pid;
    while let Some(&parent) = parents.get(&current) {
        if parent <= 1 || !chain.insert(parent) {
            break;
        }
        current = parent;
    }
    chain
}
