//! Exact (brute-force) nearest-neighbor index over squared L2 distance.
//!
//! Vectors are stored row-major in one contiguous `Vec<f32>`. Search scans
//! every row, which is the right trade-off for corpora of a few thousand
//! chunks.
//!
//! ## Blob format
//!
//! All integers and floats little-endian:
//!
//! | bytes      | field                      |
//! |------------|----------------------------|
//! | 4          | magic `MQIX`               |
//! | 4 (u32)    | format version (1)         |
//! | 4 (u32)    | dimension                  |
//! | 8 (u64)    | row count                  |
//! | rows*dim*4 | row-major `f32` data       |

use thiserror::Error;

const MAGIC: &[u8; 4] = b"MQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("vector {row} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("query has dimension {actual}, index has dimension {expected}")]
    QueryDimension { expected: usize, actual: usize },

    #[error("corrupt index blob: {0}")]
    Corrupt(String),
}

/// One search result: squared L2 distance and row number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub distance: f32,
    pub row: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// An index with no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from equal-length vectors; row `i` is `vectors[i]`
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let Some(dimension) = vectors.first().map(Vec::len) else {
            return Ok(Self::empty());
        };

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (row, vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    row,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend(vector);
        }

        Ok(Self { dimension, data })
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `k` rows closest to `query`, nearest first.
    ///
    /// Equal distances are ordered by row number. Returns fewer than `k`
    /// results only when the index has fewer than `k` rows.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| Neighbor {
                distance: squared_l2(query, vector),
                row,
            })
            .collect();

        let order = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.row.cmp(&b.row))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(order);

        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());

        if cfg!(target_endian = "little") {
            bytes.extend_from_slice(bytemuck::cast_slice(&self.data));
        } else {
            for value in &self.data {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);

        if &header[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes(le_array(&header[4..8]));
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = u32::from_le_bytes(le_array(&header[8..12])) as usize;
        let rows = usize::try_from(u64::from_le_bytes(le_array(&header[12..20])))
            .map_err(|_| IndexError::Corrupt("row count does not fit in memory".to_string()))?;

        if dimension == 0 && rows != 0 {
            return Err(IndexError::Corrupt(format!(
                "{rows} rows with dimension 0"
            )));
        }
        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("payload size overflows".to_string()))?;
        if payload.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "payload is {} bytes, header promises {expected}",
                payload.len()
            )));
        }

        let mut data = vec![0.0f32; rows * dimension];
        bytemuck::cast_slice_mut::<f32, u8>(&mut data).copy_from_slice(payload);
        if cfg!(target_endian = "big") {
            for value in &mut data {
                *value = f32::from_bits(value.to_bits().swap_bytes());
            }
        }

        Ok(Self { dimension, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorIndex {
        VectorIndex::build(vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 2.0],
            vec![1.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_search_orders_by_distance_then_row() {
        let neighbors = sample().search(&[1.0, 0.0], 3).unwrap();
        let rows: Vec<_> = neighbors.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![1, 3, 0]);
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[2].distance, 1.0);
    }

    #[test]
    fn test_k_larger_than_index_returns_every_row() {
        let neighbors = sample().search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(neighbors.len(), 4);
        assert_eq!(neighbors.last().unwrap().row, 2);
        assert_eq!(neighbors.last().unwrap().distance, 4.0);
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        assert!(VectorIndex::empty().search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
        assert!(sample().search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert!(VectorIndex::build(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatches_are_rejected() {
        let err = VectorIndex::build(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                row: 1,
                expected: 2,
                actual: 1
            }
        );

        let err = sample().search(&[1.0, 2.0, 3.0], 1).unwrap_err();
        assert!(matches!(err, IndexError::QueryDimension { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_blob_round_trip_preserves_rows() {
        let index = sample();
        let restored = VectorIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored, index);
        assert_eq!(restored.search(&[0.0, 2.0], 1).unwrap()[0].row, 2);
    }

    #[test]
    fn test_blob_header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], b"MQIX");
        assert_eq!(u32::from_le_bytes(le_array(&bytes[8..12])), 2);
        assert_eq!(u64::from_le_bytes(le_array(&bytes[12..20])), 4);
        assert_eq!(bytes.len(), HEADER_LEN + 4 * 2 * 4);
    }

    #[test]
    fn test_corrupt_blobs_are_rejected() {
        let bytes = sample().to_bytes();

        assert!(VectorIndex::from_bytes(&bytes[..10]).is_err());
        assert!(VectorIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(VectorIndex::from_bytes(&bad_magic).is_err());

        let mut bad_version = bytes;
        bad_version[4] = 9;
        assert!(matches!(
            VectorIndex::from_bytes(&bad_version),
            Err(IndexError::Corrupt(msg)) if msg.contains("version")
        ));
    }
}
