//! Vector normalization for cosine scoring.

/// Scale `v` to unit length. Near-zero vectors are left unchanged.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Normalize each `dim`-wide row of a flat row-major matrix.
///
/// A trailing partial row is normalized on its own; `dim == 0` is a no-op.
pub fn normalize_rows(matrix: &mut [f32], dim: usize) {
    if dim == 0 {
        return;
    }
    matrix.chunks_mut(dim).for_each(l2_normalize_in_place);
}
