//! Coarse pre-grouping of records so the scorer never sees the full O(n^2)
//! pair space.
//!
//! A signature is only a performance index: equal or adjacent signatures make
//! two records candidates, nothing more. Bucketing must stay a conservative
//! over-approximation, so candidate generation always includes the adjacent
//! buckets in both dimensions; duplicates straddling a boundary (299.9s vs
//! 300.1s) would otherwise be lost.

use std::collections::BTreeMap;

use super::record::TrackRecord;

/// Width of one duration bucket, in seconds.
pub const DURATION_BUCKET_SECS: f64 = 5.0;

/// Width of one size bucket, in bytes (1 MiB).
pub const SIZE_BUCKET_BYTES: u64 = 1024 * 1024;

/// Coarse grouping key: `(duration bucket, size bucket)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature {
    pub duration_bucket: i64,
    pub size_bucket: i64,
}

impl Signature {
    pub fn of(record: &TrackRecord) -> Self {
        Self {
            duration_bucket: (record.duration_seconds / DURATION_BUCKET_SECS).floor() as i64,
            size_bucket: (record.file_size_bytes / SIZE_BUCKET_BYTES) as i64,
        }
    }

    /// Equal or within one bucket in both dimensions.
    pub fn is_adjacent(&self, other: &Signature) -> bool {
        (self.duration_bucket - other.duration_bucket).abs() <= 1
            && (self.size_bucket - other.size_bucket).abs() <= 1
    }
}

/// Signature -> member indices. A `BTreeMap` keeps unit scheduling and pair
/// generation in sorted signature order, which keeps scans reproducible.
pub type BucketIndex = BTreeMap<Signature, Vec<usize>>;

pub fn build_index(records: &[TrackRecord]) -> BucketIndex {
    let mut index = BucketIndex::new();
    for (idx, record) in records.iter().enumerate() {
        index.entry(Signature::of(record)).or_default().push(idx);
    }
    index
}

/// One unit of candidate generation: a home bucket plus the members of its
/// occupied neighbor buckets that are strictly greater in signature order.
/// Processing every unit yields every candidate pair exactly once: in-bucket
/// pairs come from the home bucket, cross-bucket pairs only from the lesser
/// side of each bucket pair.
#[derive(Debug)]
pub struct BucketUnit {
    pub signature: Signature,
    pub members: Vec<usize>,
    pub later_neighbors: Vec<usize>,
}

pub fn bucket_units(index: &BucketIndex) -> Vec<BucketUnit> {
    index
        .iter()
        .map(|(signature, members)| {
            let mut later_neighbors = Vec::new();
            for neighbor in greater_neighbors(*signature) {
                if let Some(other) = index.get(&neighbor) {
                    later_neighbors.extend_from_slice(other);
                }
            }
            BucketUnit {
                signature: *signature,
                members: members.clone(),
                later_neighbors,
            }
        })
        .collect()
}

/// The adjacent signatures strictly greater than `s`: (d, sz+1), (d+1, sz-1),
/// (d+1, sz), (d+1, sz+1) under the derived lexicographic order.
fn greater_neighbors(s: Signature) -> [Signature; 4] {
    let Signature {
        duration_bucket: d,
        size_bucket: sz,
    } = s;
    [
        Signature { duration_bucket: d, size_bucket: sz + 1 },
        Signature { duration_bucket: d + 1, size_bucket: sz - 1 },
        Signature { duration_bucket: d + 1, size_bucket: sz },
        Signature { duration_bucket: d + 1, size_bucket: sz + 1 },
    ]
}
