//! Fixed-length vector math used for similarity ranking.
//!
//! Vectors from different embedding models are never comparable; callers
//! are expected to filter by model before calling into this module. A
//! length mismatch between vectors of the same model still surfaces as
//! [`Error::DimensionMismatch`].

use crate::error::{Error, Result};

/// Euclidean norm of a vector.
///
/// Accumulated in `f64`, so components whose squares under- or overflow
/// `f32` still yield their true norm.
pub fn magnitude(v: &[f32]) -> f32 {
    norm(v) as f32
}

fn norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|&x| {
            let x = f64::from(x);
            x * x
        })
        .sum::<f64>()
        .sqrt()
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Scale `v` to unit Euclidean norm.
///
/// # Errors
///
/// Returns [`Error::DegenerateVector`] for empty or zero-magnitude input.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let norm = norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::DegenerateVector);
    }
    Ok(v.iter().map(|&x| (f64::from(x) / norm) as f32).collect())
}

/// Cosine similarity of two vectors, in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    let a = normalize(a)?;
    let b = normalize(b)?;
    Ok(dot(&a, &b)?.clamp(-1.0, 1.0))
}

/// Similarity remapped to `[0, 1]` as `(cos + 1) / 2`.
pub fn score(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(remap(cosine_similarity(a, b)?))
}

/// Score for a pair of vectors that are already unit length.
pub(crate) fn score_normalized(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(remap(dot(a, b)?.clamp(-1.0, 1.0)))
}

#[inline]
fn remap(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_normalize_unit_length() {
        let v = normalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < EPS);
        assert!((v[1] - 0.8).abs() < EPS);
        assert!((magnitude(&v) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_normalize_zero_vector_is_degenerate() {
        assert!(matches!(normalize(&[0.0, 0.0]), Err(Error::DegenerateVector)));
        assert!(matches!(normalize(&[]), Err(Error::DegenerateVector)));
    }

    #[test]
    fn test_normalize_tiny_and_huge_components() {
        for v in [[1e-30f32, 0.0], [1e20, 0.0], [0.0, -1e-40], [f32::MAX, f32::MAX]] {
            let n = normalize(&v).unwrap();
            assert!((magnitude(&n) - 1.0).abs() < EPS, "{:?} -> {:?}", v, n);
        }
        let n = normalize(&[3e-30, 4e-30]).unwrap();
        assert!((n[0] - 0.6).abs() < EPS);
        assert!((n[1] - 0.8).abs() < EPS);
    }

    #[test]
    fn test_score_with_extreme_magnitudes() {
        assert!((score(&[1e20, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < EPS);
        assert!((score(&[1e-30, 0.0], &[0.0, 1e20]).unwrap() - 0.5).abs() < EPS);
    }

    #[test]
    fn test_cosine_identical_and_opposite() {
        let same = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((same - 1.0).abs() < EPS);

        let opposite = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((opposite + 1.0).abs() < EPS);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn test_score_range() {
        assert!((score(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < EPS);
        assert!((score(&[1.0, 0.0], &[0.0, 1.0]).unwrap() - 0.5).abs() < EPS);
        assert!(score(&[1.0, 0.0], &[-1.0, 0.0]).unwrap().abs() < EPS);
    }

    #[test]
    fn test_score_degenerate_input() {
        assert!(matches!(
            score(&[0.0, 0.0], &[1.0, 0.0]),
            Err(Error::DegenerateVector)
        ));
    }

    #[test]
    fn test_score_normalized_matches_score() {
        let a = [0.3, -0.7, 1.1];
        let b = [0.9, 0.2, -0.4];
        let expected = score(&a, &b).unwrap();
        let got = score_normalized(&normalize(&a).unwrap(), &normalize(&b).unwrap()).unwrap();
        assert!((expected - got).abs() < EPS);
    }
}
