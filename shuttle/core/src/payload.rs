//! Payload Producer and Validator
//!
//! Random matrix generation, the reference elementwise transform the worker
//! applies, and tolerance-based comparison of results.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::matrix::Matrix;

/// Default absolute tolerance for [`approximately_equal`]
pub const DEFAULT_ABS_TOLERANCE: f32 = 1e-4;

/// Default relative tolerance for [`approximately_equal`]
pub const DEFAULT_REL_TOLERANCE: f32 = 1e-6;

/// Generate a matrix of uniform values in `[0, 1)` from the thread RNG
#[must_use]
pub fn generate(edge: usize) -> Matrix {
    generate_with(edge, &mut rand::thread_rng())
}

/// Generate a reproducible matrix from a fixed seed
#[must_use]
pub fn generate_seeded(edge: usize, seed: u64) -> Matrix {
    generate_with(edge, &mut StdRng::seed_from_u64(seed))
}

fn generate_with<R: Rng + ?Sized>(edge: usize, rng: &mut R) -> Matrix {
    let mut matrix = Matrix::zeros(edge);
    for value in matrix.as_mut_slice() {
        *value = rng.gen::<f32>();
    }
    matrix
}

/// The worker's transform: square every element
#[must_use]
pub fn transform(matrix: &Matrix) -> Matrix {
    let mut out = matrix.clone();
    transform_in_place(out.as_mut_slice());
    out
}

/// Square every element of `values` in place
pub fn transform_in_place(values: &mut [f32]) {
    for value in values {
        *value *= *value;
    }
}

/// Compare two matrices within the default tolerances
#[must_use]
pub fn approximately_equal(actual: &Matrix, expected: &Matrix) -> bool {
    approximately_equal_with(
        actual,
        expected,
        DEFAULT_ABS_TOLERANCE,
        DEFAULT_REL_TOLERANCE,
    )
}

/// Compare two matrices elementwise: `|a - b| <= abs_tol + rel_tol * |b|`
///
/// Matrices of different shape are never equal.
#[must_use]
pub fn approximately_equal_with(
    actual: &Matrix,
    expected: &Matrix,
    abs_tol: f32,
    rel_tol: f32,
) -> bool {
    if actual.edge() != expected.edge() {
        return false;
    }

    actual
        .as_slice()
        .iter()
        .zip(expected.as_slice())
        .all(|(a, b)| (a - b).abs() <= abs_tol + rel_tol * b.abs())
}
