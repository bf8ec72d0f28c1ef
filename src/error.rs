use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Final classification of one file in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Recovered,
    Renamed,
    Simulated,
    Skipped,
    Failed,
    Corrupted,
}

impl Outcome {
    pub const ALL: [Outcome; 6] = [
        Outcome::Recovered,
        Outcome::Renamed,
        Outcome::Simulated,
        Outcome::Skipped,
        Outcome::Failed,
        Outcome::Corrupted,
    ];

    /// Whether a file with this outcome enters the processed-set.
    /// Failures are retried next run; dry-runs leave state untouched.
    pub fn records(self) -> bool {
        !matches!(self, Outcome::Failed | Outcome::Simulated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Recovered => "recovered",
            Outcome::Renamed => "renamed",
            Outcome::Simulated => "simulated",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
            Outcome::Corrupted => "corrupted",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unreadable audio file: {0}")]
    Corrupted(String),

    #[error("catalog lookup failed: {0}")]
    Lookup(String),

    #[error("tag write failed: {0}")]
    Tagging(String),

    #[error("rename failed: {0}")]
    Rename(String),
}

impl ProcessError {
    pub fn outcome(&self) -> Outcome {
        match self {
            ProcessError::Corrupted(_) => Outcome::Corrupted,
            _ => Outcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_outcomes() {
        let recorded: Vec<_> = Outcome::ALL.into_iter().filter(|o| o.records()).collect();
        assert_eq!(
            recorded,
            vec![
                Outcome::Recovered,
                Outcome::Renamed,
                Outcome::Skipped,
                Outcome::Corrupted
            ]
        );
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            ProcessError::Corrupted("bad header".into()).outcome(),
            Outcome::Corrupted
        );
        assert_eq!(ProcessError::Lookup("timeout".into()).outcome(), Outcome::Failed);
        assert_eq!(ProcessError::Rename("exists".into()).outcome(), Outcome::Failed);
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Outcome::Corrupted).unwrap(),
            "\"corrupted\""
        );
        assert_eq!(Outcome::Renamed.to_string(), "renamed");
    }
}
