//! SIMD scoring kernels for the exhaustive scan.
//!
//! Uses portable 8-lane f32 SIMD (`wide::f32x8`) with a scalar tail for
//! dimensions that are not a multiple of the lane width. The contract is
//! numerical equivalence with the scalar implementation within floating
//! point tolerance, not a specific instruction sequence: `wide` lowers to
//! the widest vector unit the target supports.

use wide::f32x8;

const LANES: usize = 8;

/// Dot product of two equal-length slices.
///
/// Callers must validate lengths; mismatched slices are a logic error
/// upstream, so this truncates to the shorter length like `zip` would.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let simd_len = len - (len % LANES);

    let mut acc = f32x8::splat(0.0);
    for (ca, cb) in a[..simd_len]
        .chunks_exact(LANES)
        .zip(b[..simd_len].chunks_exact(LANES))
    {
        let va = f32x8::new(ca.try_into().expect("chunk is LANES wide"));
        let vb = f32x8::new(cb.try_into().expect("chunk is LANES wide"));
        acc += va * vb;
    }
    let mut total = acc.reduce_add();

    for i in simd_len..len {
        total += a[i] * b[i];
    }
    total
}

/// Euclidean norm of a vector.
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine similarity between two vectors given their precomputed norms.
///
/// Returns 0.0 when either vector is (numerically) zero, which keeps
/// degenerate chunks out of the top of the ranking instead of producing
/// NaN scores.
#[must_use]
pub fn cosine_with_norms(a: &[f32], b: &[f32], norm_a: f32, norm_b: f32) -> f32 {
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Cosine similarity between two vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, b, norm(a), norm(b))
}
