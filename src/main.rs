use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod html_template;
pub mod job;
pub mod logging;
pub mod musicbrainz;
pub mod organizer;
pub mod scanner;
pub mod server;
pub mod state;
pub mod worker;

#[cfg(test)]
mod testing;

use config::JobConfig;
use error::Outcome;
use job::JobManager;
use musicbrainz::MusicBrainzCatalog;
use organizer::FilenameOrder;
use state::ProcessedSet;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up and fix tags for every audio file under a folder
    Run(RunArgs),
    /// Show how much of a folder has already been processed
    Status(StatusArgs),
    /// Forget processed files so the next run starts over
    Reset(ResetArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Music folder to process
    folder: PathBuf,

    /// Number of worker threads
    #[arg(short = 'j', long, env = "RETAGGER_THREADS", default_value_t = config::DEFAULT_THREADS)]
    threads: usize,

    /// Files handed to the pool between state saves
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Look everything up but write nothing
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Rename files after tagging
    #[arg(long, default_value_t = false)]
    rename: bool,

    /// Name template: {artist} {title} {album} {year} {genre}
    #[arg(long, default_value = config::DEFAULT_RENAME_PATTERN)]
    rename_pattern: String,

    /// Fetch and embed front cover art
    #[arg(long, default_value_t = false)]
    cover_art: bool,

    /// Re-process files whose tags already look complete
    #[arg(long, default_value_t = false)]
    force: bool,

    /// How to read "A - B" file names when tags have no title
    #[arg(long, value_enum, default_value_t = FilenameOrder::TitleArtist)]
    filename_order: FilenameOrder,

    /// Contact (email or URL) sent in the User-Agent to MusicBrainz
    #[arg(long, env = "RETAGGER_CONTACT", default_value = "anonymous")]
    contact: String,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout: u64,

    /// Minimum MusicBrainz search score (0-100) to accept a match
    #[arg(long, default_value_t = config::DEFAULT_MIN_SCORE,
          value_parser = clap::value_parser!(u32).range(0..=100))]
    min_score: u32,

    /// Processed-set file (default: <folder>/.audio-retagger/state.json)
    #[arg(long, env = "RETAGGER_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Append-only log file (default: <folder>/.audio-retagger/retagger.log)
    #[arg(long, env = "RETAGGER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Serve a live web dashboard on 127.0.0.1:<port>
    #[arg(long, env = "RETAGGER_DASHBOARD_PORT")]
    dashboard_port: Option<u16>,

    /// Don't draw the terminal progress line; per-file log lines then go to stderr too
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

impl RunArgs {
    fn to_config(&self) -> JobConfig {
        let mut config = JobConfig::new(self.folder.clone());
        if let Some(state_file) = &self.state_file {
            config.state_file = state_file.clone();
        }
        config.threads = self.threads;
        config.batch_size = self.batch_size;
        config.dry_run = self.dry_run;
        config.rename = self.rename;
        config.rename_pattern = self.rename_pattern.clone();
        config.cover_art = self.cover_art;
        config.force = self.force;
        config.filename_order = self.filename_order;
        config.contact = self.contact.clone();
        config.http_timeout = Duration::from_secs(self.http_timeout.max(1));
        config.min_score = self.min_score;
        config
    }
}

#[derive(Parser, Debug)]
struct StateArgs {
    /// Music folder the state belongs to
    folder: PathBuf,

    /// Processed-set file (default: <folder>/.audio-retagger/state.json)
    #[arg(long, env = "RETAGGER_STATE_FILE")]
    state_file: Option<PathBuf>,
}

impl StateArgs {
    fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| config::default_state_file(&self.folder))
    }
}

#[derive(Parser, Debug)]
struct StatusArgs {
    #[command(flatten)]
    state: StateArgs,

    /// Print every processed path
    #[arg(long, default_value_t = false)]
    list: bool,
}

#[derive(Parser, Debug)]
struct ResetArgs {
    #[command(flatten)]
    state: StateArgs,

    /// Actually delete the state file
    #[arg(long, default_value_t = false)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_job(args).await,
        Commands::Status(args) => show_status(args),
        Commands::Reset(args) => reset_state(args),
    }
}

async fn run_job(args: RunArgs) -> Result<()> {
    let config = args.to_config();

    // Checked before logging so a typo doesn't create the folder for the log.
    if !config.root.is_dir() {
        anyhow::bail!("Music folder {:?} does not exist", config.root);
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| config::default_log_file(&config.root));
    let _log_guard = logging::initialize_logging(&log_file, !args.no_progress)?;

    info!("Starting Audio Retagger");
    info!(
        "Folder: {:?}, threads: {}, mode: {}",
        config.root,
        config.threads(),
        if config.dry_run { "DRY RUN" } else { "WRITE" }
    );
    info!("State: {:?}, log: {:?}", config.state_file, log_file);

    let manager = Arc::new(JobManager::new());

    if let Some(port) = args.dashboard_port {
        let server_manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = server::start_server(server_manager, port).await {
                tracing::error!("{:#}", e);
            }
        });
    }

    let terminal = (!args.no_progress)
        .then(|| dashboard::spawn_terminal_dashboard(manager.clone(), Duration::from_millis(500)));

    let job_manager = manager.clone();
    let job_config = config.clone();
    let mut job = tokio::task::spawn_blocking(move || {
        let catalog = MusicBrainzCatalog::new(
            &job_config.contact,
            job_config.http_timeout,
            job_config.min_score,
        )?;
        job_manager.run(&job_config, &catalog)
    });

    let joined = tokio::select! {
        res = &mut job => res,
        _ = shutdown_signal() => {
            warn!("Interrupt received, finishing in-flight files and saving state...");
            manager.request_stop();
            job.await
        }
    };

    if let Some(handle) = terminal {
        handle.abort();
        println!();
    }

    let summary = joined.context("Job task panicked")??;

    println!();
    if summary.interrupted {
        println!("Run interrupted. Progress saved to {:?}.", config.state_file);
    } else {
        println!("Run complete.");
    }
    println!(
        "Files: {}, elapsed: {:.1}s, processed-set size: {}",
        summary.files_total,
        summary.elapsed.as_secs_f64(),
        summary.state_size
    );
    for outcome in Outcome::ALL {
        println!("  {:<10} {}", outcome, summary.counts.get(outcome));
    }

    Ok(())
}

fn show_status(args: StatusArgs) -> Result<()> {
    let state_file = args.state.state_file();
    let set = ProcessedSet::load(&state_file)
        .with_context(|| format!("Could not read state file {:?}", state_file))?;

    println!("State file: {:?}", state_file);
    println!("Processed: {}", set.len());

    match scanner::scan_directory(&args.state.folder) {
        Ok(files) => {
            let pending = files.iter().filter(|f| !set.contains(f)).count();
            println!("Audio files on disk: {}, not yet processed: {}", files.len(), pending);
        }
        Err(e) => eprintln!("Could not scan folder: {:#}", e),
    }

    if args.list {
        for path in set.iter() {
            println!("{}", path);
        }
    }
    Ok(())
}

fn reset_state(args: ResetArgs) -> Result<()> {
    let state_file = args.state.state_file();
    if !state_file.exists() {
        println!("Nothing to reset: {:?} does not exist.", state_file);
        return Ok(());
    }
    if !args.yes {
        println!("Refusing to delete {:?} without --yes.", state_file);
        return Ok(());
    }
    std::fs::remove_file(&state_file)
        .with_context(|| format!("Failed to delete {:?}", state_file))?;
    println!("Deleted {:?}.", state_file);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_to_config() {
        let cli = Cli::try_parse_from([
            "audio-retagger",
            "run",
            "/music",
            "-j",
            "3",
            "--dry-run",
            "--rename",
            "--filename-order",
            "artist-title",
            "--min-score",
            "75",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.to_config();
        assert_eq!(config.threads, 3);
        assert!(config.dry_run && config.rename && !config.cover_art);
        assert_eq!(config.filename_order, FilenameOrder::ArtistTitle);
        assert_eq!(config.min_score, 75);
        assert_eq!(
            config.state_file,
            PathBuf::from("/music/.audio-retagger/state.json")
        );
    }

    #[test]
    fn test_min_score_is_bounded() {
        assert!(Cli::try_parse_from(["audio-retagger", "run", "/music", "--min-score", "150"]).is_err());
    }

    #[test]
    fn test_reset_requires_yes() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        std::fs::write(&state_file, "[]").unwrap();
        let args = |yes| ResetArgs {
            state: StateArgs {
                folder: dir.path().to_path_buf(),
                state_file: Some(state_file.clone()),
            },
            yes,
        };

        reset_state(args(false)).unwrap();
        assert!(state_file.exists());
        reset_state(args(true)).unwrap();
        assert!(!state_file.exists());
    }
}
