//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Similarity gates for the duplicate scan, in percent. Read once when a
/// scan starts; changing the environment mid-scan never affects a running
/// scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    /// Minimum weighted overall score for a candidate pair
    pub overall: f64,

    /// Minimum title similarity when both sides have a title
    pub title: f64,

    /// Minimum artist similarity when both sides have an artist
    pub artist: f64,

    /// Secondary gate, applied when title or artist is missing on one side
    pub album: f64,

    /// Secondary gate, applied when title or artist is missing on one side
    pub filename: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            overall: 78.0,
            title: 85.0,
            artist: 80.0,
            album: 80.0,
            filename: 75.0,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// Path to the JSON track index written by the tag extractor
    pub track_index_path: String,

    /// Similarity thresholds for the duplicate scan
    pub thresholds: ThresholdConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = ThresholdConfig::default();

        Ok(Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            track_index_path: env::var("TRACK_INDEX_PATH")
                .unwrap_or_else(|_| "./data/tracks.json".to_string()),

            thresholds: ThresholdConfig {
                overall: threshold_var("DUPE_OVERALL_THRESHOLD", defaults.overall)?,
                title: threshold_var("DUPE_TITLE_THRESHOLD", defaults.title)?,
                artist: threshold_var("DUPE_ARTIST_THRESHOLD", defaults.artist)?,
                album: threshold_var("DUPE_ALBUM_THRESHOLD", defaults.album)?,
                filename: threshold_var("DUPE_FILENAME_THRESHOLD", defaults.filename)?,
            },
        })
    }
}

fn threshold_var(name: &str, default: f64) -> Result<f64> {
    match env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {name}")),
        Err(_) => Ok(default),
    }
}
