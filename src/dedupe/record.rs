//! Input and canonical record types for the duplicate-detection engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A textual tag as the cache supplies it: scalar or list-valued.
/// Multi-valued artist/title tags are common in files written by pickier
/// taggers; the normalizer flattens them to one string.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    One(String),
    Many(Vec<String>),
}

/// A numeric field as the cache supplies it. Extractors disagree on types:
/// some write numbers, some write stringified numbers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

/// One file's metadata exactly as the tag cache hands it over.
///
/// Field shapes are deliberately loose; the normalizer owns all coercion.
/// Duration may arrive under any of the cache's historical key names
/// (`duration`, `length`, `time`), first present wins.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RawTrackMetadata {
    pub filepath: String,
    pub title: Option<TagValue>,
    pub artist: Option<TagValue>,
    pub album: Option<TagValue>,
    #[serde(alias = "albumartist")]
    pub album_artist: Option<TagValue>,
    pub duration: Option<RawNumber>,
    pub length: Option<RawNumber>,
    pub time: Option<RawNumber>,
    pub file_size: Option<RawNumber>,
    pub bitrate: Option<RawNumber>,
    pub format: Option<String>,
}

/// Container/codec family of a library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Flac,
    Wav,
    Aiff,
    M4a,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Parse a format name or file extension, with or without the dot.
    pub fn from_name(name: &str) -> Self {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            "aiff" | "aif" => Self::Aiff,
            "m4a" => Self::M4a,
            "ogg" => Self::Ogg,
            _ => Self::Unknown,
        }
    }

    pub fn from_path(filepath: &str) -> Self {
        Path::new(filepath)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_name)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Aiff => "aiff",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Unknown => "unknown",
        }
    }
}

/// Canonical, immutable view of one audio file, produced by the normalizer.
///
/// All text fields are lowercased and cleaned; numeric fields default to
/// zero when the source had nothing usable. Zero therefore reads as
/// "unknown" everywhere downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub filepath: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub normalized_filename: String,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub bitrate_kbps: u32,
    pub format: AudioFormat,
}
