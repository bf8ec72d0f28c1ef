//! Terminal progress line.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::job::{JobManager, JobProgress};

const BAR_WIDTH: usize = 24;
const NAME_WIDTH: usize = 40;

fn progress_bar(done: usize, total: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (done.min(total) * BAR_WIDTH) / total
    };
    format!("[{}{}]", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn short_name(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path);
    if name.chars().count() <= NAME_WIDTH {
        name.to_string()
    } else {
        let head: String = name.chars().take(NAME_WIDTH - 1).collect();
        format!("{}…", head)
    }
}

pub fn render_status_line(p: &JobProgress) -> String {
    let c = &p.counts;
    let mut line = format!(
        "{} {}/{} | rec {} ren {} sim {} skip {} fail {} corrupt {}",
        progress_bar(p.files_done, p.files_total),
        p.files_done,
        p.files_total,
        c.recovered,
        c.renamed,
        c.simulated,
        c.skipped,
        c.failed,
        c.corrupted
    );

    if p.stop_requested && p.is_running {
        line.push_str(" | stopping");
    } else if p.is_paused {
        line.push_str(" | paused");
    }

    let busy = p.workers.iter().filter(|w| w.current_file.is_some()).count();
    if let Some(current) = p
        .workers
        .iter()
        .filter_map(|w| w.current_file.as_deref())
        .next()
    {
        line.push_str(&format!(" | {} busy: {}", busy, short_name(current)));
    }
    line
}

/// Carriage return plus `line`, padded to blank out a longer previous line.
fn overwrite(line: &str, last_len: usize) -> String {
    let pad = last_len.saturating_sub(line.chars().count());
    format!("\r{}{}", line, " ".repeat(pad))
}

/// Redraw the status line in place until the job finishes.
pub fn spawn_terminal_dashboard(manager: Arc<JobManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen_running = false;
        let mut last_len: usize = 0;
        loop {
            tokio::time::sleep(interval).await;
            let p = manager.get_progress();
            seen_running |= p.is_running;

            let line = render_status_line(&p);
            print!("{}", overwrite(&line, last_len));
            last_len = line.chars().count();
            std::io::stdout().flush().ok();

            if seen_running && !p.is_running {
                println!();
                break;
            }
        }
    })
}
