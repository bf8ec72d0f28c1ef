use anyhow::{Context, Result};
use clap::ValueEnum;
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const LOCAL_COVER_NAMES: [&str; 7] = [
    "cover.jpg",
    "cover.jpeg",
    "cover.png",
    "folder.jpg",
    "folder.jpeg",
    "folder.png",
    "front.jpg",
];

/// Which side of a dashed file name holds the title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum FilenameOrder {
    /// "Title - Artist.ext"
    #[default]
    TitleArtist,
    /// "Artist - Title.ext"
    ArtistTitle,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub has_cover: bool,
}

fn clean(value: Option<Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TrackTags {
    fn from_tag(tag: &Tag) -> Self {
        let date = tag
            .get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::Year))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| tag.year().map(|y| y.to_string()));

        Self {
            title: clean(tag.title()),
            artist: clean(tag.artist()),
            album: clean(tag.album()),
            date,
            genre: clean(tag.genre()),
            has_cover: tag
                .pictures()
                .iter()
                .any(|p| p.pic_type() == PictureType::CoverFront),
        }
    }

    /// Nothing left for a lookup to fill in.
    pub fn is_complete(&self, want_cover: bool) -> bool {
        self.album.is_some()
            && self.date.is_some()
            && self.genre.is_some()
            && (!want_cover || self.has_cover)
    }

    /// Title and artist to search the catalog with, falling back to the
    /// file name when the tags carry no title.
    pub fn identity(&self, path: &Path, order: FilenameOrder) -> Option<(String, Option<String>)> {
        let mut title = self.title.clone();
        let mut artist = self.artist.clone();

        if title.is_none() {
            if let Some(filename) = path.file_name().and_then(|s| s.to_str()) {
                let (f_title, f_artist) = parse_metadata_from_filename(filename, order);
                title = f_title;
                if artist.is_none() {
                    artist = f_artist;
                }
            }
        }

        title
            .filter(|t| !t.trim().is_empty())
            .map(|t| (t, artist))
    }
}

pub fn parse_metadata_from_filename(
    filename: &str,
    order: FilenameOrder,
) -> (Option<String>, Option<String>) {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    // Spaced dashes win over bare ones. With several separators the artist
    // is the outer segment on its side and the title keeps the rest.
    let (parts, sep): (Vec<&str>, &str) = if stem.contains(" - ") {
        (stem.split(" - ").collect(), " - ")
    } else {
        (stem.split('-').collect(), "-")
    };

    if parts.len() >= 2 {
        let n = parts.len();
        let (title, artist) = match order {
            FilenameOrder::TitleArtist => (parts[..n - 1].join(sep), parts[n - 1]),
            FilenameOrder::ArtistTitle => (parts[1..].join(sep), parts[0]),
        };
        let title = title.trim();
        let artist = artist.trim();
        if !title.is_empty() && !artist.is_empty() {
            return (Some(title.to_string()), Some(artist.to_string()));
        }
    }

    let stem = stem.trim();
    if stem.is_empty() {
        (None, None)
    } else {
        (Some(stem.to_string()), None)
    }
}

pub fn read_tags(path: &Path) -> Result<TrackTags> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file tags")?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    Ok(tag.map(TrackTags::from_tag).unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pub mime: MimeType,
    pub data: Vec<u8>,
}

impl CoverImage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mime = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            MimeType::Jpeg
        } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            MimeType::Png
        } else {
            anyhow::bail!("Cover image is neither JPEG nor PNG");
        };
        Ok(Self { mime, data })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read cover file {:?}", path))?;
        Self::from_bytes(data)
    }
}

/// Fields to write into a file's primary tag. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub cover: Option<CoverImage>,
}

impl TagUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.date.is_none()
            && self.genre.is_none()
            && self.cover.is_none()
    }

    /// The tags a file will carry once this update is written.
    pub fn apply_to(&self, tags: &TrackTags) -> TrackTags {
        TrackTags {
            title: self.title.clone().or_else(|| tags.title.clone()),
            artist: self.artist.clone().or_else(|| tags.artist.clone()),
            album: self.album.clone().or_else(|| tags.album.clone()),
            date: self.date.clone().or_else(|| tags.date.clone()),
            genre: self.genre.clone().or_else(|| tags.genre.clone()),
            has_cover: tags.has_cover || self.cover.is_some(),
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (name, value) in [
            ("title", &self.title),
            ("artist", &self.artist),
            ("album", &self.album),
            ("date", &self.date),
            ("genre", &self.genre),
        ] {
            if let Some(v) = value {
                parts.push(format!("{}={:?}", name, v));
            }
        }
        if let Some(cover) = &self.cover {
            parts.push(format!("cover={} bytes", cover.data.len()));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

pub fn write_tags(path: &Path, update: &TagUpdate) -> Result<()> {
    let mut tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file tags")?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        // Carry over what `read_tags` saw in any other tag, or fields the
        // update leaves alone would vanish on the next read.
        let mut primary = Tag::new(tag_type);
        if let Some(existing) = tagged_file.first_tag() {
            for item in existing.items() {
                primary.insert(item.clone());
            }
            for picture in existing.pictures() {
                primary.push_picture(picture.clone());
            }
        }
        tagged_file.insert_tag(primary);
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .context("Primary tag missing after insert")?;

    if let Some(title) = &update.title {
        tag.set_title(title.clone());
    }
    if let Some(artist) = &update.artist {
        tag.set_artist(artist.clone());
    }
    if let Some(album) = &update.album {
        tag.set_album(album.clone());
    }
    if let Some(genre) = &update.genre {
        tag.set_genre(genre.clone());
    }
    if let Some(date) = &update.date {
        tag.insert_text(ItemKey::RecordingDate, date.clone());
    }
    if let Some(cover) = &update.cover {
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(cover.mime.clone()),
            None,
            cover.data.clone(),
        ));
    }

    tag.save_to_path(path, WriteOptions::default())
        .context("Failed to save tags")?;
    Ok(())
}

pub fn find_local_cover(track_path: &Path) -> Option<PathBuf> {
    let parent = track_path.parent()?;
    LOCAL_COVER_NAMES
        .iter()
        .map(|name| parent.join(name))
        .find(|path| path.is_file())
}

fn sanitize_component(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Where a file should move to: `stem.ext` in its own directory, or
/// `stem (n).ext` when that name belongs to another file.
#[derive(Debug, Clone, PartialEq)]
pub struct RenamePlan {
    parent: PathBuf,
    stem: String,
    ext: Option<String>,
}

impl RenamePlan {
    fn candidate(&self, n: usize) -> PathBuf {
        let suffix = if n == 0 { String::new() } else { format!(" ({})", n) };
        match &self.ext {
            Some(ext) => self.parent.join(format!("{}{}.{}", self.stem, suffix, ext)),
            None => self.parent.join(format!("{}{}", self.stem, suffix)),
        }
    }

    /// First name not held by another file. `None` when `path` already
    /// carries one of the planned names.
    pub fn preview(&self, path: &Path) -> Option<PathBuf> {
        (0..)
            .map(|n| self.candidate(n))
            .find(|c| c == path || !c.exists() || is_same_file(c, path))
            .filter(|c| c != path)
    }

    /// Move `path` to the first free name and return where it ended up.
    /// Names are claimed with `create_new` before the move, so two workers
    /// heading for the same name never land on it together.
    pub fn execute(&self, path: &Path) -> std::io::Result<PathBuf> {
        let mut n = 0;
        loop {
            let candidate = self.candidate(n);
            if candidate == path {
                return Ok(candidate);
            }
            // Case-only renames on case-insensitive filesystems.
            if is_same_file(&candidate, path) {
                std::fs::rename(path, &candidate)?;
                return Ok(candidate);
            }

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(placeholder) => {
                    drop(placeholder);
                    if let Err(e) = std::fs::rename(path, &candidate) {
                        let _ = std::fs::remove_file(&candidate);
                        return Err(e);
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Expand a rename pattern (`{artist}`, `{title}`, `{album}`, `{year}`,
/// `{genre}`) into a plan for a new name next to `path`. `None` when the
/// pattern expands to nothing usable.
pub fn plan_rename(path: &Path, tags: &TrackTags, pattern: &str) -> Option<RenamePlan> {
    let year = tags
        .date
        .as_deref()
        .map(|d| d.chars().take(4).collect::<String>())
        .unwrap_or_default();

    let expanded = pattern
        .replace("{artist}", &sanitize_component(tags.artist.as_deref().unwrap_or("Unknown Artist")))
        .replace("{title}", &sanitize_component(tags.title.as_deref().unwrap_or("Unknown Title")))
        .replace("{album}", &sanitize_component(tags.album.as_deref().unwrap_or_default()))
        .replace("{year}", &sanitize_component(&year))
        .replace("{genre}", &sanitize_component(tags.genre.as_deref().unwrap_or_default()));

    let stem = sanitize_component(&expanded)
        .trim_matches(|c: char| c == '.' || c == ' ' || c == '-')
        .to_string();
    if stem.is_empty() {
        return None;
    }

    Some(RenamePlan {
        parent: path.parent()?.to_path_buf(),
        stem,
        ext: path.extension().and_then(|e| e.to_str()).map(str::to_string),
    })
}

/// The name `path` would get right now, or `None` when it would keep its own.
pub fn rename_target(path: &Path, tags: &TrackTags, pattern: &str) -> Option<PathBuf> {
    plan_rename(path, tags, pattern)?.preview(path)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
