use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use tempfile::TempDir;

use crate::musicbrainz::{Catalog, LookupMatch};

static INIT: Once = Once::new();

pub fn init() -> TempDir {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
    TempDir::new().expect("failed to create temp dir")
}

/// Smallest PCM WAV lofty will parse: 0.1s of mono 8kHz silence.
pub fn write_silent_wav(path: &Path) {
    let data_len: u32 = 1600;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&16000u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);
    fs::write(path, bytes).expect("failed to write wav");
}

pub fn png_bytes() -> Vec<u8> {
    let mut v = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    v.extend_from_slice(&[0u8; 32]);
    v
}

pub fn sample_match(title: &str, artist: &str) -> LookupMatch {
    LookupMatch {
        recording_id: format!("rec-{}", title.to_lowercase()),
        title: title.to_string(),
        artist: artist.to_string(),
        album: Some("Test Album".to_string()),
        date: Some("1999-01-01".to_string()),
        genre: Some("Rock".to_string()),
        release_id: Some("rel-1".to_string()),
    }
}

/// In-memory catalog keyed by lowercase title.
#[derive(Default)]
pub struct FakeCatalog {
    pub matches: HashMap<String, LookupMatch>,
    /// Titles whose lookup returns an error.
    pub failing: Vec<String>,
    pub cover: Option<Vec<u8>>,
    pub lookups: AtomicUsize,
}

impl FakeCatalog {
    pub fn with(mut self, m: LookupMatch) -> Self {
        self.matches.insert(m.title.to_lowercase(), m);
        self
    }

    pub fn failing_on(mut self, title: &str) -> Self {
        self.failing.push(title.to_lowercase());
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Catalog for FakeCatalog {
    fn lookup(&self, title: &str, _artist: Option<&str>) -> anyhow::Result<Option<LookupMatch>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = title.to_lowercase();
        if self.failing.contains(&key) {
            anyhow::bail!("simulated outage");
        }
        Ok(self.matches.get(&key).cloned())
    }

    fn cover_art(&self, _release_id: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.cover.clone())
    }
}
