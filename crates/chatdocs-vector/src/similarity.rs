use chatdocs_core::{ChatDocsError, Result};

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length. Rejects NaN, infinite and zero vectors.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(ChatDocsError::InvalidVector(
            "vector contains NaN or infinite values".to_string(),
        ));
    }
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(ChatDocsError::InvalidVector(
            "vector has zero magnitude".to_string(),
        ));
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ChatDocsError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    Ok(dot(a, b) / (na * nb))
}
