//! Connected-component grouping of candidate pairs and best-match selection.
//!
//! Grouping is transitive on purpose: if A~B and B~C pass the gates, A, B,
//! and C land in one group even when A~C does not. Components of one are
//! dropped. Every ordering rule here is total, so repeated scans over the
//! same input produce byte-identical group lists.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::record::TrackRecord;

/// Disjoint-set forest over record indices. Union by size, path halving.
#[derive(Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (mut root_a, mut root_b) = (self.find(a), self.find(b));
        if root_a == root_b {
            return;
        }
        if self.size[root_a] < self.size[root_b] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b] = root_a;
        self.size[root_a] += self.size[root_b];
    }
}

/// One member of a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    #[serde(flatten)]
    pub track: TrackRecord,
    pub best_match: bool,
}

/// Records believed to be the same logical track. Always has at least two
/// members; the first member is the best-match anchor, everything after it
/// is removable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub id: String,
    pub members: Vec<GroupMember>,
    pub reclaimable_bytes: u64,
}

impl DuplicateGroup {
    pub fn anchor(&self) -> &GroupMember {
        &self.members[0]
    }
}

/// Quality ordering used for both anchor selection and member ordering:
/// highest bitrate, then largest size, then lexicographically smallest
/// filepath.
fn quality_order(a: &TrackRecord, b: &TrackRecord) -> Ordering {
    b.bitrate_kbps
        .cmp(&a.bitrate_kbps)
        .then_with(|| b.file_size_bytes.cmp(&a.file_size_bytes))
        .then_with(|| a.filepath.cmp(&b.filepath))
}

/// Build the final group list from candidate-pair edges.
pub fn build_groups(records: &[TrackRecord], edges: &[(usize, usize)]) -> Vec<DuplicateGroup> {
    let mut forest = UnionFind::new(records.len());
    for &(a, b) in edges {
        forest.union(a, b);
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..records.len() {
        components.entry(forest.find(idx)).or_default().push(idx);
    }

    let mut groups: Vec<DuplicateGroup> = components
        .into_values()
        .filter(|indices| indices.len() >= 2)
        .map(|indices| {
            let mut tracks: Vec<TrackRecord> =
                indices.iter().map(|&i| records[i].clone()).collect();
            tracks.sort_by(quality_order);
            let reclaimable_bytes = tracks[1..].iter().map(|t| t.file_size_bytes).sum();
            let id = group_id(&tracks[0].filepath);
            let members = tracks
                .into_iter()
                .enumerate()
                .map(|(pos, track)| GroupMember {
                    track,
                    best_match: pos == 0,
                })
                .collect();
            DuplicateGroup {
                id,
                members,
                reclaimable_bytes,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.reclaimable_bytes
            .cmp(&a.reclaimable_bytes)
            .then_with(|| b.members.len().cmp(&a.members.len()))
            .then_with(|| a.anchor().track.filepath.cmp(&b.anchor().track.filepath))
    });
    groups
}

/// Deterministic short id derived from the anchor path, stable across runs.
fn group_id(anchor_path: &str) -> String {
    let digest = md5::compute(anchor_path.as_bytes());
    format!("{:x}", digest)[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::record::AudioFormat;

    fn make_track(filepath: &str, file_size_bytes: u64, bitrate_kbps: u32) -> TrackRecord {
        TrackRecord {
            filepath: filepath.to_string(),
            title: "song".to_string(),
            artist: "band".to_string(),
            album: String::new(),
            album_artist: String::new(),
            normalized_filename: "song".to_string(),
            duration_seconds: 200.0,
            file_size_bytes,
            bitrate_kbps,
            format: AudioFormat::Mp3,
        }
    }

    #[test]
    fn transitive_edges_form_one_group() {
        let records = vec![
            make_track("/a.mp3", 5_000_000, 320),
            make_track("/b.mp3", 5_000_000, 320),
            make_track("/c.mp3", 5_000_000, 320),
        ];
        // A~B and B~C, no A~C edge.
        let groups = build_groups(&records, &[(0, 1), (1, 2)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn singletons_never_appear() {
        let records = vec![
            make_track("/a.mp3", 5_000_000, 320),
            make_track("/b.mp3", 5_000_000, 320),
            make_track("/lonely.mp3", 9_000_000, 320),
        ];
        let groups = build_groups(&records, &[(0, 1)]);
        assert_eq!(groups.len(), 1);
        assert!(
            groups[0]
                .members
                .iter()
                .all(|m| m.track.filepath != "/lonely.mp3")
        );
    }

    #[test]
    fn no_edges_means_no_groups() {
        let records = vec![
            make_track("/a.mp3", 5_000_000, 320),
            make_track("/b.mp3", 5_000_000, 320),
        ];
        assert!(build_groups(&records, &[]).is_empty());
    }

    #[test]
    fn anchor_prefers_bitrate_then_size_then_path() {
        let records = vec![
            make_track("/low.mp3", 9_000_000, 128),
            make_track("/high.mp3", 5_000_000, 320),
        ];
        let groups = build_groups(&records, &[(0, 1)]);
        assert_eq!(groups[0].anchor().track.filepath, "/high.mp3");

        let records = vec![
            make_track("/small.mp3", 5_000_000, 320),
            make_track("/big.mp3", 6_000_000, 320),
        ];
        let groups = build_groups(&records, &[(0, 1)]);
        assert_eq!(groups[0].anchor().track.filepath, "/big.mp3");
    }

    #[test]
    fn anchor_tie_breaks_on_lexicographically_smaller_path() {
        let records = vec![
            make_track("/z.mp3", 5_000_000, 320),
            make_track("/a.mp3", 5_000_000, 320),
        ];
        let groups = build_groups(&records, &[(0, 1)]);
        assert_eq!(groups[0].anchor().track.filepath, "/a.mp3");
        assert!(groups[0].anchor().best_match);
        assert!(!groups[0].members[1].best_match);
    }

    #[test]
    fn exactly_one_best_match_per_group() {
        let records = vec![
            make_track("/a.mp3", 5_000_000, 320),
            make_track("/b.mp3", 6_000_000, 256),
            make_track("/c.mp3", 7_000_000, 192),
        ];
        let groups = build_groups(&records, &[(0, 1), (1, 2)]);
        let flagged = groups[0].members.iter().filter(|m| m.best_match).count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn reclaimable_bytes_sums_non_anchor_sizes() {
        let records = vec![
            make_track("/keep.mp3", 5_000_000, 320),
            make_track("/dup1.mp3", 4_000_000, 128),
            make_track("/dup2.mp3", 3_000_000, 128),
        ];
        let groups = build_groups(&records, &[(0, 1), (0, 2)]);
        assert_eq!(groups[0].reclaimable_bytes, 7_000_000);
    }

    #[test]
    fn groups_sort_by_savings_then_size_then_anchor_path() {
        let records = vec![
            // Group 1: anchor /g1a, savings 2_000_000.
            make_track("/g1a.mp3", 5_000_000, 320),
            make_track("/g1b.mp3", 2_000_000, 128),
            // Group 2: anchor /g2a, savings 8_000_000.
            make_track("/g2a.mp3", 9_000_000, 320),
            make_track("/g2b.mp3", 8_000_000, 128),
        ];
        let groups = build_groups(&records, &[(0, 1), (2, 3)]);
        assert_eq!(groups[0].anchor().track.filepath, "/g2a.mp3");
        assert_eq!(groups[1].anchor().track.filepath, "/g1a.mp3");

        // Equal savings: the larger group wins.
        let records = vec![
            make_track("/h1a.mp3", 5_000_000, 320),
            make_track("/h1b.mp3", 1_000_000, 128),
            make_track("/h1c.mp3", 1_000_000, 96),
            make_track("/h2a.mp3", 5_000_000, 320),
            make_track("/h2b.mp3", 2_000_000, 128),
        ];
        let groups = build_groups(&records, &[(0, 1), (0, 2), (3, 4)]);
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn members_are_ordered_by_quality_after_the_anchor() {
        let records = vec![
            make_track("/mid.mp3", 5_000_000, 256),
            make_track("/best.mp3", 5_000_000, 320),
            make_track("/worst.mp3", 5_000_000, 128),
        ];
        let groups = build_groups(&records, &[(0, 1), (1, 2)]);
        let paths: Vec<&str> = groups[0]
            .members
            .iter()
            .map(|m| m.track.filepath.as_str())
            .collect();
        assert_eq!(paths, vec!["/best.mp3", "/mid.mp3", "/worst.mp3"]);
    }

    #[test]
    fn group_ids_are_stable_and_short() {
        let records = vec![
            make_track("/a.mp3", 5_000_000, 320),
            make_track("/b.mp3", 5_000_000, 128),
        ];
        let first = build_groups(&records, &[(0, 1)]);
        let second = build_groups(&records, &[(0, 1)]);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].id.len(), 8);
        assert!(first[0].id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn union_find_merges_and_finds() {
        let mut forest = UnionFind::new(5);
        forest.union(0, 1);
        forest.union(3, 4);
        assert_eq!(forest.find(0), forest.find(1));
        assert_ne!(forest.find(1), forest.find(3));
        forest.union(1, 3);
        assert_eq!(forest.find(0), forest.find(4));
        assert_ne!(forest.find(2), forest.find(0));
    }
}
