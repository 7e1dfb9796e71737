//! Weighted multi-field similarity between two normalized records.
//!
//! Text fields blend three string metrics (plain ratio, partial ratio, and a
//! token-sort ratio) by taking the maximum. Numeric fields use relative
//! closeness, with zero meaning unknown: an unknown value on either side
//! scores 0 at full weight, so metadata-poor records cannot pair on text
//! alone. Absent text fields drop out entirely and their weight is
//! redistributed proportionally over whatever is present.

use rapidfuzz::fuzz;

use super::record::TrackRecord;
use crate::config::ThresholdConfig;

/// Field weights as fractions of the overall score. The sum is 1.0 and
/// compatibility fixtures depend on these exact values.
pub const WEIGHT_TITLE: f64 = 0.35;
pub const WEIGHT_ARTIST: f64 = 0.30;
pub const WEIGHT_ALBUM: f64 = 0.10;
pub const WEIGHT_FILENAME: f64 = 0.10;
pub const WEIGHT_DURATION: f64 = 0.10;
pub const WEIGHT_SIZE: f64 = 0.03;
pub const WEIGHT_BITRATE: f64 = 0.02;

/// Guards the relative-closeness denominator.
const EPSILON: f64 = 1e-9;

/// Per-field similarity percentages for one record pair. Text fields are
/// `None` when empty on either side; numeric fields always carry a value,
/// zero when unknown. Transient: dropped once the clustering decision is
/// made.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub title: Option<f64>,
    pub artist: Option<f64>,
    pub album: Option<f64>,
    pub filename: Option<f64>,
    pub duration: f64,
    pub size: f64,
    pub bitrate: f64,
    pub overall: f64,
}

/// Maximum of plain ratio, partial ratio, and token-sort ratio, scaled from
/// rapidfuzz's [0,1] fractions to [0,100].
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let plain = fuzz::ratio(a.chars(), b.chars());
    let partial = partial_ratio(a, b);
    let token_sort = fuzz::ratio(sort_tokens(a).chars(), sort_tokens(b).chars());
    100.0 * plain.max(partial).max(token_sort)
}

/// Substring-tolerant metric: the best plain ratio between the shorter
/// string and every window of the longer one at the shorter's length.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let mut shorter: Vec<char> = a.chars().collect();
    let mut longer: Vec<char> = b.chars().collect();
    if shorter.len() > longer.len() {
        std::mem::swap(&mut shorter, &mut longer);
    }
    if shorter.is_empty() {
        return if longer.is_empty() { 1.0 } else { 0.0 };
    }
    longer
        .windows(shorter.len())
        .map(|window| fuzz::ratio(shorter.iter().copied(), window.iter().copied()))
        .fold(0.0, f64::max)
}

/// Whitespace tokens in sorted order, rejoined. Comparing the results with a
/// plain ratio gives the token-order-insensitive metric.
fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Relative closeness of two non-negative values, in [0,100]. Zero means
/// unknown, so a zero on either side scores 0 rather than trivially
/// matching.
pub fn numeric_similarity(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    let sim = 100.0 * (1.0 - (a - b).abs() / a.max(b).max(EPSILON));
    sim.clamp(0.0, 100.0)
}

/// Score one record pair. Pure and symmetric; the normalizer has already
/// sanitized both sides, so this never fails.
pub fn score_pair(a: &TrackRecord, b: &TrackRecord) -> PairScore {
    let title = text_field(&a.title, &b.title);
    let artist = artist_similarity(a, b);
    let album = text_field(&a.album, &b.album);
    let filename = text_field(&a.normalized_filename, &b.normalized_filename);

    let duration = numeric_similarity(a.duration_seconds, b.duration_seconds);
    let size = numeric_similarity(a.file_size_bytes as f64, b.file_size_bytes as f64);
    let bitrate = numeric_similarity(f64::from(a.bitrate_kbps), f64::from(b.bitrate_kbps));

    let mut weighted = 0.0;
    let mut weight_present = 0.0;
    for (score, weight) in [
        (title, WEIGHT_TITLE),
        (artist, WEIGHT_ARTIST),
        (album, WEIGHT_ALBUM),
        (filename, WEIGHT_FILENAME),
    ] {
        if let Some(value) = score {
            weighted += value * weight;
            weight_present += weight;
        }
    }
    weighted += duration * WEIGHT_DURATION + size * WEIGHT_SIZE + bitrate * WEIGHT_BITRATE;
    weight_present += WEIGHT_DURATION + WEIGHT_SIZE + WEIGHT_BITRATE;

    let overall = weighted / weight_present;

    PairScore {
        title,
        artist,
        album,
        filename,
        duration,
        size,
        bitrate,
        overall,
    }
}

/// Gate policy deciding whether a scored pair is a candidate duplicate.
///
/// Title and artist gates apply whenever those fields are present. When
/// either is missing, the album and filename thresholds step in as secondary
/// gates for whichever of those fields exist. A pair with no text evidence
/// at all is never a candidate.
pub fn is_candidate(score: &PairScore, thresholds: &ThresholdConfig) -> bool {
    let no_text = score.title.is_none()
        && score.artist.is_none()
        && score.album.is_none()
        && score.filename.is_none();
    if no_text {
        return false;
    }
    if score.overall < thresholds.overall {
        return false;
    }
    if score.title.is_some_and(|title| title < thresholds.title) {
        return false;
    }
    if score.artist.is_some_and(|artist| artist < thresholds.artist) {
        return false;
    }
    if score.title.is_none() || score.artist.is_none() {
        if score.album.is_some_and(|album| album < thresholds.album) {
            return false;
        }
        if score
            .filename
            .is_some_and(|filename| filename < thresholds.filename)
        {
            return false;
        }
    }
    true
}

/// None when the field is empty on either side (absent for this pair).
fn text_field(a: &str, b: &str) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        None
    } else {
        Some(text_similarity(a, b))
    }
}

/// Artist similarity, lifted by the album-artist comparison when both sides
/// carry one. Rescues albums tagged with per-track guest artists.
fn artist_similarity(a: &TrackRecord, b: &TrackRecord) -> Option<f64> {
    let base = text_field(&a.artist, &b.artist);
    let assist = text_field(&a.album_artist, &b.album_artist);
    match (base, assist) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}
