//! Vector math over embedding vectors
//!
//! Comparing two non-empty vectors of different length is a caller bug and
//! fails loudly. A zero-norm or empty side is a data condition and yields 0.

use crate::error::{MnemoError, Result};

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if !a.is_empty() && !b.is_empty() && a.len() != b.len() {
        return Err(MnemoError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Calculate cosine similarity between two vectors
///
/// Returns 0.0 when either vector is empty or has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    if a.is_empty() || b.is_empty() {
        return Ok(0.0);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    // Rounding can push identical vectors a hair past 1.0
    Ok((dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}

/// Calculate Euclidean distance between two optional vectors
///
/// Returns `f32::INFINITY` when either side is absent.
pub fn euclidean_distance(a: Option<&[f32]>, b: Option<&[f32]>) -> Result<f32> {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(f32::INFINITY),
    };
    check_dimensions(a, b)?;
    if a.len() != b.len() {
        return Ok(f32::INFINITY);
    }

    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt())
}
