//! Track store collaborator.
//!
//! The scan reads the full record set from here once at start; the API layer
//! removes records after a successful member deletion. The engine itself
//! never writes to the store.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::RwLock;

use crate::dedupe::record::RawTrackMetadata;

pub trait TrackStore: Send + Sync {
    /// Every known record, in stable filepath order.
    fn all_tracks(&self) -> Result<Vec<RawTrackMetadata>>;

    /// Remove one record by filepath. Returns false when the path is
    /// unknown. Never touches the file itself.
    fn remove_track(&self, filepath: &str) -> Result<bool>;
}

/// In-memory store keyed by filepath. The default deployment loads it from
/// the JSON index the tag extractor writes.
#[derive(Default)]
pub struct MemoryTrackStore {
    tracks: RwLock<BTreeMap<String, RawTrackMetadata>>,
}

impl MemoryTrackStore {
    pub fn new(records: Vec<RawTrackMetadata>) -> Self {
        let tracks = records
            .into_iter()
            .map(|record| (record.filepath.clone(), record))
            .collect();
        Self {
            tracks: RwLock::new(tracks),
        }
    }

    /// Load a JSON array of raw records.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening track index {}", path.display()))?;
        let records: Vec<RawTrackMetadata> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing track index {}", path.display()))?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }
}

impl TrackStore for MemoryTrackStore {
    fn all_tracks(&self) -> Result<Vec<RawTrackMetadata>> {
        Ok(self.tracks.read().values().cloned().collect())
    }

    fn remove_track(&self, filepath: &str) -> Result<bool> {
        Ok(self.tracks.write().remove(filepath).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn raw(filepath: &str) -> RawTrackMetadata {
        RawTrackMetadata {
            filepath: filepath.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn all_tracks_returns_records_in_filepath_order() {
        let store = MemoryTrackStore::new(vec![raw("/b.mp3"), raw("/a.mp3"), raw("/c.mp3")]);
        let paths: Vec<String> = store
            .all_tracks()
            .unwrap()
            .into_iter()
            .map(|r| r.filepath)
            .collect();
        assert_eq!(paths, vec!["/a.mp3", "/b.mp3", "/c.mp3"]);
    }

    #[test]
    fn remove_track_reports_whether_the_path_existed() {
        let store = MemoryTrackStore::new(vec![raw("/a.mp3")]);
        assert!(store.remove_track("/a.mp3").unwrap());
        assert!(!store.remove_track("/a.mp3").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn load_reads_a_json_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"filepath": "/music/x.mp3", "title": "Song X", "bitrate": 320}},
                {{"filepath": "/music/y.flac", "title": ["Song Y"], "file_size": "9000000"}}
            ]"#
        )
        .unwrap();
        let store = MemoryTrackStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        let tracks = store.all_tracks().unwrap();
        assert_eq!(tracks[0].filepath, "/music/x.mp3");
    }

    #[test]
    fn load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(MemoryTrackStore::load(file.path()).is_err());
    }
}
