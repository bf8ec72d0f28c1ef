use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use sysinfo::System;

use crate::config::JobConfig;
use crate::error::Outcome;
use crate::musicbrainz::Catalog;
use crate::scanner;
use crate::state::ProcessedSet;
use crate::worker::{self, FileReport};

const MONITOR_INTERVAL: Duration = Duration::from_millis(500);
const PAUSE_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceStats {
    pub cpu_usage: f32,
    pub memory_usage: u64, // in bytes
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub recovered: usize,
    pub renamed: usize,
    pub simulated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub corrupted: usize,
}

impl OutcomeCounts {
    pub fn add(&mut self, outcome: Outcome, n: usize) {
        match outcome {
            Outcome::Recovered => self.recovered += n,
            Outcome::Renamed => self.renamed += n,
            Outcome::Simulated => self.simulated += n,
            Outcome::Skipped => self.skipped += n,
            Outcome::Failed => self.failed += n,
            Outcome::Corrupted => self.corrupted += n,
        }
    }

    pub fn get(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Recovered => self.recovered,
            Outcome::Renamed => self.renamed,
            Outcome::Simulated => self.simulated,
            Outcome::Skipped => self.skipped,
            Outcome::Failed => self.failed,
            Outcome::Corrupted => self.corrupted,
        }
    }

    pub fn total(&self) -> usize {
        Outcome::ALL.iter().map(|o| self.get(*o)).sum()
    }
}

/// Per-worker counters. Written only by the owning worker thread.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSlot {
    pub worker: usize,
    pub current_file: Option<String>,
    pub handled: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobProgress {
    pub is_running: bool,
    pub is_paused: bool,
    pub stop_requested: bool,
    pub dry_run: bool,
    pub root: String,
    pub files_total: usize,
    pub files_done: usize,
    pub counts: OutcomeCounts,
    pub workers: Vec<WorkerSlot>,
    pub elapsed_secs: u64,
    pub resources: ResourceStats,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub files_total: usize,
    pub counts: OutcomeCounts,
    pub elapsed: Duration,
    pub interrupted: bool,
    pub state_size: usize,
}

#[derive(Default)]
pub struct JobManager {
    progress: RwLock<JobProgress>,
    slots: DashMap<usize, WorkerSlot>,
    paused: AtomicBool,
    stop: AtomicBool,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_progress(&self) -> JobProgress {
        let mut p = self.progress.read().clone();
        let mut workers: Vec<WorkerSlot> = self.slots.iter().map(|s| s.value().clone()).collect();
        workers.sort_by_key(|s| s.worker);
        p.workers = workers;
        p.is_paused = self.is_paused();
        p.stop_requested = self.should_stop();
        p
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Ask workers to stop after the file they are on. State is still saved.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run one job to completion on the calling thread. Blocks; call it from
    /// `spawn_blocking` inside async code.
    pub fn run(&self, config: &JobConfig, catalog: &dyn Catalog) -> Result<RunSummary> {
        {
            let mut p = self.progress.write();
            if p.is_running {
                return Err(anyhow::anyhow!("Job already in progress"));
            }
            self.stop.store(false, Ordering::SeqCst);
            self.slots.clear();
            *p = JobProgress {
                is_running: true,
                dry_run: config.dry_run,
                root: config.root.display().to_string(),
                ..Default::default()
            };
        }

        let start = Instant::now();
        std::thread::scope(|s| {
            s.spawn(|| self.monitor_resources(start));
            let result = self.run_logic(config, catalog, start);

            {
                let mut p = self.progress.write();
                p.is_running = false;
                p.elapsed_secs = start.elapsed().as_secs();
                if let Err(e) = &result {
                    p.last_error = Some(format!("{:#}", e));
                }
            }
            result
        })
    }

    fn run_logic(
        &self,
        config: &JobConfig,
        catalog: &dyn Catalog,
        start: Instant,
    ) -> Result<RunSummary> {
        // 1. Load state
        let initial = ProcessedSet::load_or_recover(&config.state_file)?;
        let mut processed = initial.clone();
        tracing::info!(
            "Loaded {} processed paths from {:?}",
            initial.len(),
            config.state_file
        );

        // 2. Scan
        let files = scanner::scan_directory(&config.root)?;

        // 3. Diff
        let (already, pending): (Vec<PathBuf>, Vec<PathBuf>) =
            files.iter().cloned().partition(|p| processed.contains(p));
        {
            let mut p = self.progress.write();
            p.files_total = files.len();
            p.files_done = already.len();
            p.counts.add(Outcome::Skipped, already.len());
        }
        tracing::info!(
            "Found {} audio files: {} already processed, {} to go",
            files.len(),
            already.len(),
            pending.len()
        );

        // 4. Process in batches
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads())
            .thread_name(|i| format!("retag-worker-{}", i))
            .build()
            .context("Failed to build worker pool")?;

        let mut interrupted = false;
        for chunk in pending.chunks(config.batch_size()) {
            if self.should_stop() {
                interrupted = true;
                break;
            }

            let reports: Vec<FileReport> = pool.install(|| {
                chunk
                    .par_iter()
                    .filter_map(|path| self.handle_file(path, config, catalog))
                    .collect()
            });

            // Merge on this thread only; workers never touch the set.
            let recorded = if config.dry_run {
                0
            } else {
                record_reports(&mut processed, &reports)
            };
            if recorded > 0 {
                if let Err(e) = processed.save(&config.state_file) {
                    tracing::error!("Failed to save state after batch: {:#}", e);
                }
            }

            if reports.len() < chunk.len() {
                interrupted = true;
                break;
            }
        }

        // 5. Final save
        if !config.dry_run && (processed != initial || !config.state_file.exists()) {
            processed.save(&config.state_file)?;
        }

        let counts = self.progress.read().counts.clone();
        Ok(RunSummary {
            files_total: files.len(),
            counts,
            elapsed: start.elapsed(),
            interrupted,
            state_size: processed.len(),
        })
    }

    fn handle_file(
        &self,
        path: &Path,
        config: &JobConfig,
        catalog: &dyn Catalog,
    ) -> Option<FileReport> {
        while self.is_paused() && !self.should_stop() {
            std::thread::sleep(PAUSE_POLL);
        }
        if self.should_stop() {
            return None;
        }

        let worker_idx = rayon::current_thread_index().unwrap_or(0);
        self.slots
            .entry(worker_idx)
            .or_insert_with(|| WorkerSlot {
                worker: worker_idx,
                ..Default::default()
            })
            .current_file = Some(path.display().to_string());

        let report = worker::process_file(path, config, catalog);
        log_report(&report);

        if let Some(mut slot) = self.slots.get_mut(&worker_idx) {
            slot.current_file = None;
            slot.handled += 1;
        }
        {
            let mut p = self.progress.write();
            p.files_done += 1;
            p.counts.add(report.outcome, 1);
            if report.outcome == Outcome::Failed {
                p.last_error = Some(format!("{}: {}", report.path.display(), report.detail));
            }
        }

        Some(report)
    }

    fn monitor_resources(&self, start: Instant) {
        let mut sys = System::new();
        loop {
            std::thread::sleep(MONITOR_INTERVAL);
            if !self.progress.read().is_running {
                break;
            }

            sys.refresh_cpu_usage();
            sys.refresh_memory();
            let cpu_usage = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>()
                / sys.cpus().len().max(1) as f32;

            let mut p = self.progress.write();
            p.elapsed_secs = start.elapsed().as_secs();
            p.resources.cpu_usage = cpu_usage;
            p.resources.memory_usage = sys.used_memory();
        }
    }
}

/// Add every recordable report to the set; returns how many were new.
fn record_reports(processed: &mut ProcessedSet, reports: &[FileReport]) -> usize {
    let before = processed.len();
    processed.extend(
        reports
            .iter()
            .filter(|r| r.outcome.records())
            .flat_map(|r| std::iter::once(r.path.as_path()).chain(r.new_path.as_deref())),
    );
    processed.len() - before
}

fn log_report(report: &FileReport) {
    let path = report.path.display();
    match report.outcome {
        Outcome::Failed | Outcome::Corrupted => {
            tracing::warn!(outcome = %report.outcome, "{}: {}", path, report.detail)
        }
        Outcome::Renamed => tracing::info!(
            outcome = %report.outcome,
            "{} -> {}: {}",
            path,
            report
                .new_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            report.detail
        ),
        _ => tracing::info!(outcome = %report.outcome, "{}: {}", path, report.detail),
    }
}
