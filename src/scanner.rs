use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: [&str; 10] = [
    "mp3", "flac", "m4a", "mp4", "ogg", "opus", "wav", "aiff", "wv", "ape",
];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Collect every audio file below `root` as a sorted list of absolute paths.
pub fn scan_directory(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Music folder {:?} does not exist or is not a directory", root);
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to resolve music folder {:?}", root))?;

    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_audio_file(e.path()))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    files.dedup();
    Ok(files)
}
