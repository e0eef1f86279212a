//! Matrix Codec
//!
//! A square, row-major `f32` matrix and its flat byte encoding.
//!
//! # Wire Format
//!
//! ```text
//! +------------+------------+-----+----------------------+
//! | elem[0][0] | elem[0][1] | ... | elem[edge-1][edge-1] |
//! | f32 (4)    | f32 (4)    |     | f32 (4)              |
//! +------------+------------+-----+----------------------+
//! ```
//!
//! Elements are written in host byte order with no header. The edge length
//! travels separately (frame header, pipe size prefix, shared-memory header).

use crate::transport::TransportError;

/// Size in bytes of one matrix element
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// A square matrix of 32-bit floats stored in row-major order
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    edge: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Create a zero-filled matrix with the given edge length
    #[must_use]
    pub fn zeros(edge: usize) -> Self {
        Self {
            edge,
            data: vec![0.0; edge * edge],
        }
    }

    /// Build a matrix from row-major elements
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Codec` if `data.len()` is not `edge * edge`.
    pub fn from_vec(edge: usize, data: Vec<f32>) -> Result<Self, TransportError> {
        if data.len() != edge * edge {
            return Err(TransportError::Codec {
                expected: edge * edge * ELEMENT_SIZE,
                actual: data.len() * ELEMENT_SIZE,
            });
        }
        Ok(Self { edge, data })
    }

    /// Edge length (number of rows, equal to number of columns)
    #[must_use]
    pub fn edge(&self) -> usize {
        self.edge
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the encoded payload in bytes
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len() * ELEMENT_SIZE
    }

    /// Row-major elements
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major elements
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Element at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.edge || col >= self.edge {
            return None;
        }
        self.data.get(row * self.edge + col).copied()
    }

    /// Consume the matrix, returning its elements
    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Number of payload bytes for a matrix with the given edge length
#[must_use]
pub fn payload_len(edge: usize) -> usize {
    edge * edge * ELEMENT_SIZE
}

/// Flatten a matrix into its byte encoding
#[must_use]
pub fn serialize(matrix: &Matrix) -> Vec<u8> {
    let mut buf = Vec::with_capacity(matrix.byte_len());
    for value in &matrix.data {
        buf.extend_from_slice(&value.to_ne_bytes());
    }
    buf
}

/// Rebuild a matrix from its byte encoding
///
/// The input is only read. Callers pass byte counts they produced themselves
/// or already validated against a length header.
///
/// # Errors
///
/// Returns `TransportError::Codec` if `bytes.len()` is not `edge² × 4`.
pub fn deserialize(bytes: &[u8], edge: usize) -> Result<Matrix, TransportError> {
    let expected = payload_len(edge);
    if bytes.len() != expected {
        return Err(TransportError::Codec {
            expected,
            actual: bytes.len(),
        });
    }

    let data = bytes
        .chunks_exact(ELEMENT_SIZE)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(Matrix { edge, data })
}

/// Decode `bytes` into an existing element slice of matching size
pub(crate) fn decode_into(bytes: &[u8], out: &mut [f32]) {
    for (value, chunk) in out.iter_mut().zip(bytes.chunks_exact(ELEMENT_SIZE)) {
        *value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

/// Encode an element slice into `out`, which must hold `values.len() * 4` bytes
pub(crate) fn encode_into(values: &[f32], out: &mut [u8]) {
    for (value, chunk) in values.iter().zip(out.chunks_exact_mut(ELEMENT_SIZE)) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_length() {
        let m = Matrix::zeros(3);
        assert_eq!(serialize(&m).len(), 9 * ELEMENT_SIZE);
        assert_eq!(m.byte_len(), 36);
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let values = vec![
            0.0,
            -0.0,
            1.5,
            f32::MIN_POSITIVE,
            f32::MAX,
            -3.25,
            f32::EPSILON,
            1.0e-30,
            f32::NAN,
        ];
        let m = Matrix::from_vec(3, values.clone()).unwrap();

        let bytes = serialize(&m);
        let back = deserialize(&bytes, 3).unwrap();

        let original_bits: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        let decoded_bits: Vec<u32> = back.as_slice().iter().map(|v| v.to_bits()).collect();
        assert_eq!(original_bits, decoded_bits);
        assert_eq!(back.edge(), 3);
    }

    #[test]
    fn test_deserialize_does_not_mutate_input() {
        let m = Matrix::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let bytes = serialize(&m);
        let snapshot = bytes.clone();

        let _ = deserialize(&bytes, 2).unwrap();
        assert_eq!(bytes, snapshot);
    }

    #[test]
    fn test_deserialize_rejects_wrong_length() {
        let result = deserialize(&[0u8; 15], 2);
        assert!(matches!(
            result,
            Err(TransportError::Codec {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn test_from_vec_rejects_non_square() {
        assert!(Matrix::from_vec(2, vec![1.0; 5]).is_err());
    }

    #[test]
    fn test_row_major_indexing() {
        let m = Matrix::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(0, 1), Some(2.0));
        assert_eq!(m.get(1, 0), Some(3.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_encode_decode_into_slices() {
        let values = [1.0f32, -2.0, 0.5];
        let mut bytes = [0u8; 12];
        encode_into(&values, &mut bytes);

        let mut out = [0f32; 3];
        decode_into(&bytes, &mut out);
        assert_eq!(out, values);
    }
}
