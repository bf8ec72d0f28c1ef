use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::JobConfig;
use crate::error::{Outcome, ProcessError};
use crate::musicbrainz::{Catalog, LookupMatch};
use crate::organizer::{self, CoverImage, TagUpdate, TrackTags};

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub detail: String,
    pub new_path: Option<PathBuf>,
}

impl FileReport {
    fn new(path: &Path, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome,
            detail: detail.into(),
            new_path: None,
        }
    }
}

/// Process one file. Every error is caught here and turned into an outcome,
/// so a bad file never takes down its worker.
pub fn process_file(path: &Path, config: &JobConfig, catalog: &dyn Catalog) -> FileReport {
    match try_process(path, config, catalog) {
        Ok(report) => report,
        Err(e) => FileReport::new(path, e.outcome(), e.to_string()),
    }
}

fn try_process(
    path: &Path,
    config: &JobConfig,
    catalog: &dyn Catalog,
) -> Result<FileReport, ProcessError> {
    let tags = organizer::read_tags(path).map_err(|e| ProcessError::Corrupted(format!("{:#}", e)))?;

    if !config.force && tags.is_complete(config.cover_art) {
        return Ok(FileReport::new(path, Outcome::Skipped, "tags already complete"));
    }

    let Some((title, artist)) = tags.identity(path, config.filename_order) else {
        return Ok(FileReport::new(path, Outcome::Skipped, "no title to search for"));
    };

    let found = catalog
        .lookup(&title, artist.as_deref())
        .map_err(|e| ProcessError::Lookup(format!("{:#}", e)))?;
    let Some(found) = found else {
        return Ok(FileReport::new(
            path,
            Outcome::Skipped,
            format!("no catalog match for {:?} by {:?}", title, artist),
        ));
    };

    let mut update = build_update(&tags, &found);
    if config.cover_art && (!tags.has_cover || config.force) {
        update.cover = fetch_cover(path, &found, catalog);
    }

    let final_tags = update.apply_to(&tags);
    let plan = if config.rename {
        organizer::plan_rename(path, &final_tags, &config.rename_pattern)
    } else {
        None
    };
    let target = plan.as_ref().and_then(|plan| plan.preview(path));

    if update.is_empty() && target.is_none() {
        return Ok(FileReport::new(
            path,
            Outcome::Skipped,
            "catalog match changes nothing",
        ));
    }

    if config.dry_run {
        let mut detail = format!("would write {}", update.describe());
        if let Some(target) = &target {
            detail.push_str(&format!("; would rename to {:?}", target));
        }
        return Ok(FileReport::new(path, Outcome::Simulated, detail));
    }

    if !update.is_empty() {
        organizer::write_tags(path, &update)
            .map_err(|e| ProcessError::Tagging(format!("{:#}", e)))?;
    }

    let detail = format!("wrote {}", update.describe());
    match (plan, target) {
        (Some(plan), Some(target)) => {
            let moved = plan
                .execute(path)
                .map_err(|e| ProcessError::Rename(format!("{:?}: {}", target, e)))?;
            if moved == path {
                return Ok(FileReport::new(path, Outcome::Recovered, detail));
            }
            let mut report = FileReport::new(path, Outcome::Renamed, detail);
            report.new_path = Some(moved);
            Ok(report)
        }
        _ => Ok(FileReport::new(path, Outcome::Recovered, detail)),
    }
}

fn changed(current: &Option<String>, new: Option<&String>) -> Option<String> {
    new.filter(|n| !n.trim().is_empty())
        .filter(|n| current.as_deref() != Some(n.as_str()))
        .cloned()
}

/// Catalog values replace the file's values where they differ; fields the
/// catalog doesn't know are left alone.
pub fn build_update(tags: &TrackTags, found: &LookupMatch) -> TagUpdate {
    TagUpdate {
        title: changed(&tags.title, Some(&found.title)),
        artist: changed(&tags.artist, Some(&found.artist)),
        album: changed(&tags.album, found.album.as_ref()),
        date: changed(&tags.date, found.date.as_ref()),
        genre: changed(&tags.genre, found.genre.as_ref()),
        cover: None,
    }
}

fn fetch_cover(path: &Path, found: &LookupMatch, catalog: &dyn Catalog) -> Option<CoverImage> {
    if let Some(local) = organizer::find_local_cover(path) {
        match CoverImage::from_file(&local) {
            Ok(cover) => return Some(cover),
            Err(e) => tracing::warn!("Ignoring local cover {:?}: {:#}", local, e),
        }
    }

    let release_id = found.release_id.as_deref()?;
    match catalog.cover_art(release_id) {
        Ok(Some(bytes)) => match CoverImage::from_bytes(bytes) {
            Ok(cover) => Some(cover),
            Err(e) => {
                tracing::warn!("Cover for release {} unusable: {:#}", release_id, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Cover fetch for {:?} failed: {:#}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, png_bytes, sample_match, write_silent_wav, FakeCatalog};
    use lofty::config::WriteOptions;
    use std::fs;
    use lofty::tag::{Accessor, Tag, TagExt, TagType};

    fn config_for(root: &Path) -> JobConfig {
        JobConfig::new(root.to_path_buf())
    }

    #[test]
    fn test_recovers_tags_from_filename_identity() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));

        let report = process_file(&path, &config_for(dir.path()), &catalog);
        assert_eq!(report.outcome, Outcome::Recovered, "{}", report.detail);

        let tags = organizer::read_tags(&path).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.album.as_deref(), Some("Test Album"));
        assert_eq!(tags.genre.as_deref(), Some("Rock"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        let before = fs::read(&path).unwrap();
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));

        let mut config = config_for(dir.path());
        config.dry_run = true;
        config.rename = true;
        let report = process_file(&path, &config, &catalog);

        assert_eq!(report.outcome, Outcome::Simulated);
        assert!(report.detail.contains("would rename"));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_rename_moves_file() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));

        let mut config = config_for(dir.path());
        config.rename = true;
        config.rename_pattern = "{year} - {artist} - {title}".into();
        let report = process_file(&path, &config, &catalog);

        assert_eq!(report.outcome, Outcome::Renamed, "{}", report.detail);
        let new_path = report.new_path.unwrap();
        assert_eq!(new_path, dir.path().join("1999 - Band - Song.wav"));
        assert!(new_path.exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_fields_only_in_secondary_tag_survive() {
        let dir = testing::init();
        let path = dir.path().join("untitled.wav");
        write_silent_wav(&path);
        let mut info = Tag::new(TagType::RiffInfo);
        info.set_title("Song".to_string());
        info.set_artist("Band".to_string());
        info.save_to_path(&path, WriteOptions::default()).unwrap();
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));

        let report = process_file(&path, &config_for(dir.path()), &catalog);
        assert_eq!(report.outcome, Outcome::Recovered, "{}", report.detail);

        let tags = organizer::read_tags(&path).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Band"));
        assert_eq!(tags.album.as_deref(), Some("Test Album"));
    }

    #[test]
    fn test_no_match_is_skipped() {
        let dir = testing::init();
        let path = dir.path().join("Unknown - Nobody.wav");
        write_silent_wav(&path);
        let report = process_file(&path, &config_for(dir.path()), &FakeCatalog::default());
        assert_eq!(report.outcome, Outcome::Skipped);
    }

    #[test]
    fn test_lookup_error_is_failed() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        let catalog = FakeCatalog::default().failing_on("Song");
        let report = process_file(&path, &config_for(dir.path()), &catalog);
        assert_eq!(report.outcome, Outcome::Failed);
        assert!(report.detail.contains("simulated outage"));
    }

    #[test]
    fn test_unreadable_file_is_corrupted() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.flac");
        fs::write(&path, b"garbage").unwrap();
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));
        let report = process_file(&path, &config_for(dir.path()), &catalog);
        assert_eq!(report.outcome, Outcome::Corrupted);
        assert_eq!(catalog.lookup_count(), 0);
    }

    #[test]
    fn test_complete_tags_skip_lookup_unless_forced() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        organizer::write_tags(
            &path,
            &TagUpdate {
                title: Some("Song".into()),
                album: Some("Kept".into()),
                date: Some("2000".into()),
                genre: Some("Jazz".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let catalog = FakeCatalog::default().with(sample_match("Song", "Band"));

        let report = process_file(&path, &config_for(dir.path()), &catalog);
        assert_eq!(report.outcome, Outcome::Skipped);
        assert_eq!(catalog.lookup_count(), 0);

        let mut config = config_for(dir.path());
        config.force = true;
        let report = process_file(&path, &config, &catalog);
        assert_eq!(report.outcome, Outcome::Recovered);
        assert_eq!(
            organizer::read_tags(&path).unwrap().album.as_deref(),
            Some("Test Album")
        );
    }

    #[test]
    fn test_cover_prefers_local_file() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        fs::write(dir.path().join("cover.png"), png_bytes()).unwrap();
        let catalog = FakeCatalog {
            cover: Some(b"not an image".to_vec()),
            ..Default::default()
        }
        .with(sample_match("Song", "Band"));

        let cover = fetch_cover(&path, &sample_match("Song", "Band"), &catalog).unwrap();
        assert_eq!(cover.data, png_bytes());
    }

    #[test]
    fn test_unusable_remote_cover_is_not_fatal() {
        let dir = testing::init();
        let path = dir.path().join("Song - Band.wav");
        write_silent_wav(&path);
        let catalog = FakeCatalog {
            cover: Some(b"not an image".to_vec()),
            ..Default::default()
        }
        .with(sample_match("Song", "Band"));

        let mut config = config_for(dir.path());
        config.cover_art = true;
        let report = process_file(&path, &config, &catalog);
        assert_eq!(report.outcome, Outcome::Recovered);
        assert!(!organizer::read_tags(&path).unwrap().has_cover);
    }

    #[test]
    fn test_build_update_only_includes_changes() {
        let tags = TrackTags {
            title: Some("Song".into()),
            artist: Some("Band".into()),
            album: Some("Test Album".into()),
            ..Default::default()
        };
        let update = build_update(&tags, &sample_match("Song", "Band"));
        assert_eq!(update.title, None);
        assert_eq!(update.album, None);
        assert_eq!(update.date.as_deref(), Some("1999-01-01"));
        assert_eq!(update.genre.as_deref(), Some("Rock"));
    }
}
