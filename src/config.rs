use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::organizer::FilenameOrder;

pub const DATA_DIR_NAME: &str = ".audio-retagger";
pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MIN_SCORE: u32 = 90;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RENAME_PATTERN: &str = "{artist} - {title}";

pub fn default_state_file(root: &Path) -> PathBuf {
    root.join(DATA_DIR_NAME).join("state.json")
}

pub fn default_log_file(root: &Path) -> PathBuf {
    root.join(DATA_DIR_NAME).join("retagger.log")
}

/// Everything one run needs, resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub root: PathBuf,
    pub state_file: PathBuf,
    pub threads: usize,
    pub batch_size: usize,
    /// Look up and report, but write nothing.
    pub dry_run: bool,
    pub rename: bool,
    pub rename_pattern: String,
    pub cover_art: bool,
    /// Re-process files whose tags already look complete.
    pub force: bool,
    pub filename_order: FilenameOrder,
    pub contact: String,
    pub http_timeout: Duration,
    pub min_score: u32,
}

impl JobConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            state_file: default_state_file(&root),
            root,
            threads: DEFAULT_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            rename: false,
            rename_pattern: DEFAULT_RENAME_PATTERN.to_string(),
            cover_art: false,
            force: false,
            filename_order: FilenameOrder::default(),
            contact: "anonymous".to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads.max(1)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
