//! Process classification.
//!
//! Decides whether a command line belongs to a long-running, stateful worker
//! (`Interactive`) or to disposable tooling (`Background`). Markers are
//! matched in order as plain substrings; the first hit wins.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Command-line fragments of task-router, workflow-runner and assessment
/// invocations.
pub const DEFAULT_INTERACTIVE_MARKERS: &[&str] = &[
    "task-router",
    "task_router",
    "workflow-runner",
    "workflow_runner",
    "workflow_engine",
    "assess-code",
    "/assess",
    "claude -p",
    "claude --print",
];

/// How a process should be treated when it is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Long-running worker that needs time to persist state before dying.
    Interactive,
    /// Disposable tooling that can be stopped quickly.
    Background,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => f.write_str("interactive"),
            Self::Background => f.write_str("background"),
        }
    }
}

/// A pure command-line classifier.
///
/// Implementations must be deterministic and total: the same command line
/// always yields the same classification.
pub trait Classify: Send + Sync {
    fn classify(&self, command_line: &str) -> Classification;
}

/// Substring marker table classifier.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerClassifier {
    /// Create a classifier with the built-in marker table.
    pub fn new() -> Self {
        Self {
            markers: DEFAULT_INTERACTIVE_MARKERS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Create a classifier with only the given markers.
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Append markers after the existing ones. Empty markers are ignored
    /// since they would match every command line.
    pub fn extend<I, S>(&mut self, markers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers.extend(
            markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty()),
        );
    }

    /// First marker contained in `command_line`, if any.
    pub fn matching_marker(&self, command_line: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|m| command_line.contains(m.as_str()))
            .map(String::as_str)
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl Classify for MarkerClassifier {
    fn classify(&self, command_line: &str) -> Classification {
        if self.matching_marker(command_line).is_some() {
            Classification::Interactive
        } else {
            Classification::Background
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_runner_is_interactive() {
        let c = MarkerClassifier::new();
        assert_eq!(
            c.classify("python3 scripts/workflow_engine.py run cycle.yaml"),
            Classification::Interactive
        );
        assert_eq!(
            c.classify("node task-router.js --agent planner"),
            Classification::Interactive
        );
        assert_eq!(
            c.classify("claude -p /assess --scope full"),
            Classification::Interactive
        );
    }

    #[test]
    fn tooling_is_background() {
        let c = MarkerClassifier::new();
        assert_eq!(
            c.classify("python3 scripts/python-test-runner.py --coverage"),
            Classification::Background
        );
        assert_eq!(c.classify(""), Classification::Background);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let c = MarkerClassifier::new();
        assert_eq!(c.classify("TASK-ROUTER"), Classification::Background);
    }

    #[test]
    fn first_marker_wins() {
        let c = MarkerClassifier::with_markers(["runner", "workflow"]);
        assert_eq!(c.matching_marker("workflow runner"), Some("runner"));
    }

    #[test]
    fn extend_adds_markers_and_skips_empty() {
        let mut c = MarkerClassifier::with_markers(Vec::<String>::new());
        assert_eq!(c.classify("lint-daemon --watch"), Classification::Background);
        c.extend(["", "lint-daemon"]);
        assert_eq!(c.markers().len(), 1);
        assert_eq!(c.classify("lint-daemon --watch"), Classification::Interactive);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = MarkerClassifier::new();
        let line = "bash -c 'workflow-runner --resume'";
        let first = c.classify(line);
        for _ in 0..10 {
            assert_eq!(c.classify(line), first);
        }
    }
}
