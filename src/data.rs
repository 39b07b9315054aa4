//! Training records and batch sampling.
//!
//! The training data is a flat binary file of little-endian `f32` with no
//! header: each record is 9 values, 8 input features (the six control-point
//! coordinates of a quadratic curve plus a query point) followed by 1 target
//! field value. `RecordSet` holds the whole file in a contiguous row-major
//! buffer; `sample_batch` draws rows independently and uniformly with
//! replacement.

use std::fs;
use std::path::Path;

use rand::Rng;

use crate::{Error, Result};

/// Per-record input features.
pub const FEATURE_DIM: usize = 8;
/// Full record width: features plus the target field value.
pub const RECORD_DIM: usize = 9;

#[derive(Debug, Clone)]
pub struct RecordSet {
    values: Vec<f32>,
    len: usize,
}

impl RecordSet {
    /// Load records from a flat binary file of little-endian `f32`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;

        if bytes.len() % 4 != 0 {
            return Err(Error::InvalidData(format!(
                "{}: length {} is not a multiple of 4 bytes",
                path.display(),
                bytes.len()
            )));
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Self::from_flat(values)
            .map_err(|e| Error::InvalidData(format!("{}: {e}", path.display())))
    }

    /// Build a record set from an in-memory flat buffer with shape `(len, 9)`.
    pub fn from_flat(values: Vec<f32>) -> Result<Self> {
        if values.len() % RECORD_DIM != 0 {
            return Err(Error::InvalidData(format!(
                "value count {} is not a multiple of the record width {RECORD_DIM}",
                values.len()
            )));
        }
        let len = values.len() / RECORD_DIM;
        if len == 0 {
            return Err(Error::InvalidData("record set must not be empty".to_owned()));
        }

        Ok(Self { values, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the `idx`-th record (shape: `(9,)`). Panics if `idx >= len`.
    #[inline]
    pub fn record(&self, idx: usize) -> &[f32] {
        let start = idx * RECORD_DIM;
        &self.values[start..start + RECORD_DIM]
    }

    /// Draw a batch of `batch_size` records, independently and uniformly with
    /// replacement.
    pub fn sample_batch<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Batch {
        let mut rows = Vec::with_capacity(batch_size * RECORD_DIM);
        for _ in 0..batch_size {
            let idx = rng.gen_range(0..self.len);
            rows.extend_from_slice(self.record(idx));
        }
        Batch {
            rows,
            len: batch_size,
        }
    }
}

/// A sampled batch with shape `(len, 9)`.
#[derive(Debug, Clone)]
pub struct Batch {
    rows: Vec<f32>,
    len: usize,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `idx`-th full record (shape: `(9,)`).
    #[inline]
    pub fn record(&self, idx: usize) -> &[f32] {
        let start = idx * RECORD_DIM;
        &self.rows[start..start + RECORD_DIM]
    }

    /// The `idx`-th input row (shape: `(8,)`).
    #[inline]
    pub fn features(&self, idx: usize) -> &[f32] {
        &self.record(idx)[..FEATURE_DIM]
    }

    /// The `idx`-th target (shape: `(1,)`).
    #[inline]
    pub fn target(&self, idx: usize) -> &[f32] {
        &self.record(idx)[FEATURE_DIM..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_records(n: usize) -> RecordSet {
        let mut values = Vec::with_capacity(n * RECORD_DIM);
        for i in 0..n {
            for j in 0..RECORD_DIM {
                values.push((i * RECORD_DIM + j) as f32);
            }
        }
        RecordSet::from_flat(values).unwrap()
    }

    #[test]
    fn from_flat_validates_shape() {
        assert!(RecordSet::from_flat(vec![0.0; 9]).is_ok());
        assert!(RecordSet::from_flat(vec![0.0; 10]).is_err());
        assert!(RecordSet::from_flat(vec![]).is_err());
    }

    #[test]
    fn batch_has_requested_shape() {
        let records = toy_records(4);
        let mut rng = StdRng::seed_from_u64(1);

        for &n in &[1_usize, 7, 32] {
            let batch = records.sample_batch(&mut rng, n);
            assert_eq!(batch.len(), n);
            for i in 0..n {
                assert_eq!(batch.record(i).len(), RECORD_DIM);
                assert_eq!(batch.features(i).len(), FEATURE_DIM);
                assert_eq!(batch.target(i).len(), 1);
            }
        }
    }

    #[test]
    fn every_batch_row_comes_from_the_source_set() {
        let records = toy_records(5);
        let mut rng = StdRng::seed_from_u64(2);

        let batch = records.sample_batch(&mut rng, 64);
        for i in 0..batch.len() {
            let row = batch.record(i);
            let found = (0..records.len()).any(|j| records.record(j) == row);
            assert!(found, "batch row {i} not present in source records");
        }
    }

    #[test]
    fn features_and_target_split_the_record() {
        let records = toy_records(1);
        let mut rng = StdRng::seed_from_u64(3);
        let batch = records.sample_batch(&mut rng, 1);

        assert_eq!(batch.features(0), &batch.record(0)[..8]);
        assert_eq!(batch.target(0), &batch.record(0)[8..]);
    }
}
