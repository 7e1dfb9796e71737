//! Near-duplicate detection engine.
//!
//! The pipeline runs in four stages: `normalize` turns loosely shaped
//! metadata into comparable records, `signature` buckets records so only
//! plausible pairs are compared, `score` rates each candidate pair, and
//! `cluster` folds accepted pairs into duplicate groups. `scanner` drives
//! the stages and owns all scan state.

pub mod cluster;
pub mod normalize;
pub mod record;
pub mod scanner;
pub mod score;
pub mod signature;
