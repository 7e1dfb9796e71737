//! Metadata canonicalization.
//!
//! Raw cache records arrive with list-valued tags, stringified numbers, and
//! inconsistent casing. Everything downstream of this module sees exactly one
//! cleaned string per text field and zero-defaulted numerics, so nothing else
//! ever branches on field shape.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::record::{AudioFormat, RawNumber, RawTrackMetadata, TagValue, TrackRecord};

/// Joined onto multi-valued tags before normalization.
const LIST_SEPARATOR: &str = "; ";

/// Dropped during normalization so articles and connectives never decide a
/// match ("The Beatles" and "Beatles" normalize equal).
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A normalized record plus how many of its numeric fields were present but
/// unusable (bad parse, negative, non-finite). Absent fields just default
/// and are not counted.
#[derive(Debug)]
pub struct NormalizedRecord {
    pub record: TrackRecord,
    pub malformed_fields: usize,
}

/// Lowercase, strip punctuation, drop stop words, collapse whitespace.
pub fn normalize_text(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
    collapsed
        .split(' ')
        .filter(|word| !word.is_empty() && !STOP_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produce the canonical record for one raw cache entry. Pure: a bad field
/// degrades to its default and bumps the malformed counter instead of
/// failing the record.
pub fn normalize_record(raw: &RawTrackMetadata) -> NormalizedRecord {
    let mut malformed = 0usize;

    let duration_raw = raw
        .duration
        .as_ref()
        .or(raw.length.as_ref())
        .or(raw.time.as_ref());
    let duration_seconds = coerce_or_default(duration_raw, &mut malformed);
    let file_size_bytes = coerce_or_default(raw.file_size.as_ref(), &mut malformed) as u64;
    let bitrate_kbps = coerce_or_default(raw.bitrate.as_ref(), &mut malformed) as u32;

    let format = raw
        .format
        .as_deref()
        .map(AudioFormat::from_name)
        .filter(|f| *f != AudioFormat::Unknown)
        .unwrap_or_else(|| AudioFormat::from_path(&raw.filepath));

    let record = TrackRecord {
        title: normalize_tag(raw.title.as_ref()),
        artist: normalize_tag(raw.artist.as_ref()),
        album: normalize_tag(raw.album.as_ref()),
        album_artist: normalize_tag(raw.album_artist.as_ref()),
        normalized_filename: normalize_filename(&raw.filepath),
        filepath: raw.filepath.clone(),
        duration_seconds,
        file_size_bytes,
        bitrate_kbps,
        format,
    };

    NormalizedRecord {
        record,
        malformed_fields: malformed,
    }
}

/// Normalized stem of the file name, extension dropped.
pub fn normalize_filename(filepath: &str) -> String {
    let stem = Path::new(filepath)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    normalize_text(stem)
}

fn normalize_tag(tag: Option<&TagValue>) -> String {
    match tag {
        Some(TagValue::One(value)) => normalize_text(value),
        Some(TagValue::Many(values)) => normalize_text(&values.join(LIST_SEPARATOR)),
        None => String::new(),
    }
}

fn coerce_or_default(value: Option<&RawNumber>, malformed: &mut usize) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    match coerce_f64(value) {
        Some(parsed) => parsed,
        None => {
            *malformed += 1;
            0.0
        }
    }
}

fn coerce_f64(value: &RawNumber) -> Option<f64> {
    let parsed = match value {
        RawNumber::Int(v) => Some(*v as f64),
        RawNumber::Float(v) => Some(*v),
        RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dedupe::record::AudioFormat;

    fn raw(filepath: &str) -> RawTrackMetadata {
        RawTrackMetadata {
            filepath: filepath.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn text_is_lowercased_and_punctuation_stripped() {
        assert_eq!(normalize_text("Hello, World!"), "hello world");
        assert_eq!(normalize_text("  AC/DC  "), "acdc");
        assert_eq!(normalize_text("Don't Stop"), "dont stop");
    }

    #[test]
    fn stop_words_are_dropped() {
        assert_eq!(normalize_text("The Dark Side of the Moon"), "dark side moon");
        assert_eq!(normalize_text("A Night at the Opera"), "night opera");
        // A title made entirely of stop words collapses to empty.
        assert_eq!(normalize_text("The And Of"), "");
    }

    #[test]
    fn whitespace_collapses_to_single_spaces() {
        assert_eq!(normalize_text("one   two\tthree"), "one two three");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn list_valued_tags_are_joined_before_normalization() {
        let mut entry = raw("/music/x.mp3");
        entry.artist = Some(TagValue::Many(vec![
            "Band X".to_string(),
            "Guest Y".to_string(),
        ]));
        let normalized = normalize_record(&entry);
        assert_eq!(normalized.record.artist, "band x guest y");
    }

    #[test]
    fn duration_falls_back_through_legacy_keys() {
        let mut entry = raw("/music/x.mp3");
        entry.length = Some(RawNumber::Text("245.5".to_string()));
        let normalized = normalize_record(&entry);
        assert_eq!(normalized.record.duration_seconds, 245.5);
        assert_eq!(normalized.malformed_fields, 0);

        // An explicit `duration` wins over `length`.
        entry.duration = Some(RawNumber::Int(200));
        let normalized = normalize_record(&entry);
        assert_eq!(normalized.record.duration_seconds, 200.0);
    }

    #[test]
    fn malformed_numerics_default_and_count() {
        let mut entry = raw("/music/x.mp3");
        entry.duration = Some(RawNumber::Text("not a number".to_string()));
        entry.file_size = Some(RawNumber::Int(-12));
        entry.bitrate = Some(RawNumber::Float(f64::NAN));
        let normalized = normalize_record(&entry);
        assert_eq!(normalized.record.duration_seconds, 0.0);
        assert_eq!(normalized.record.file_size_bytes, 0);
        assert_eq!(normalized.record.bitrate_kbps, 0);
        assert_eq!(normalized.malformed_fields, 3);
    }

    #[test]
    fn absent_numerics_default_without_counting() {
        let normalized = normalize_record(&raw("/music/x.mp3"));
        assert_eq!(normalized.record.duration_seconds, 0.0);
        assert_eq!(normalized.record.file_size_bytes, 0);
        assert_eq!(normalized.record.bitrate_kbps, 0);
        assert_eq!(normalized.malformed_fields, 0);
    }

    #[test]
    fn filename_is_normalized_stem() {
        assert_eq!(
            normalize_filename("/music/Band X/01 - Song A (Remastered).mp3"),
            "01 song remastered"
        );
        assert_eq!(normalize_filename("relative/track.flac"), "track");
    }

    #[test]
    fn format_prefers_tag_over_extension() {
        let mut entry = raw("/music/x.mp3");
        entry.format = Some("FLAC".to_string());
        assert_eq!(normalize_record(&entry).record.format, AudioFormat::Flac);

        entry.format = Some("weird".to_string());
        assert_eq!(normalize_record(&entry).record.format, AudioFormat::Mp3);

        entry.format = None;
        assert_eq!(normalize_record(&entry).record.format, AudioFormat::Mp3);
    }

    #[test]
    fn unicode_text_survives_normalization() {
        assert_eq!(normalize_text("Björk — Jóga"), "björk jóga");
    }
}
