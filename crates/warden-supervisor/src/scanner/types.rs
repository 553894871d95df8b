use serde::{Deserialize, Serialize};
use warden_core::{Classification, ProcessState};

/// Operator flags for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Report candidates without sending any signal.
    pub dry_run: bool,
    /// Allow escalation to a forceful kill.
    pub force: bool,
}

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Cleaned,
    Errored,
    SkippedDryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub pid: u32,
    pub command_line: String,
    pub classification: Classification,
    pub outcome: ScanOutcome,
    pub final_state: ProcessState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Every candidate of one sweep, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub entries: Vec<ScanEntry>,
}

impl ScanResult {
    fn count(&self, outcome: ScanOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn candidate_count(&self) -> usize {
        self.entries.len()
    }

    pub fn cleaned_count(&self) -> usize {
        self.count(ScanOutcome::Cleaned)
    }

    pub fn error_count(&self) -> usize {
        self.count(ScanOutcome::Errored)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ScanOutcome::SkippedDryRun)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Counts only, for display.
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            candidates: self.candidate_count(),
            cleaned: self.cleaned_count(),
            errored: self.error_count(),
            skipped: self.skipped_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub candidates: usize,
    pub cleaned: usize,
    pub errored: usize,
    pub skipped: usize,
}
