use std::fmt::Write as _;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor has {actual} values, expected {expected}")]
    Length { expected: usize, actual: usize },
    #[error("descriptor value at {0} is not finite")]
    NonFinite(usize),
}

/// Fixed-length face embedding produced by an [`EmbeddingExtractor`].
///
/// [`EmbeddingExtractor`]: super::embedding_extractor::EmbeddingExtractor
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// Validates length and finiteness up front so nothing malformed ever
    /// reaches the match service.
    pub fn new(values: Vec<f32>, expected_len: usize) -> Result<Self, DescriptorError> {
        if values.len() != expected_len {
            return Err(DescriptorError::Length {
                expected: expected_len,
                actual: values.len(),
            });
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite(i));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    /// Sign pattern of the first 64 dimensions. Near-identical descriptors
    /// usually share it, so it serves as a cheap first-pass cache key.
    pub fn coarse_hash(&self) -> u64 {
        self.values
            .iter()
            .take(64)
            .enumerate()
            .fold(0u64, |acc, (i, v)| if *v >= 0.0 { acc | (1 << i) } else { acc })
    }

    /// Comma-separated fixed-point rendering. The match service rejects
    /// exponent notation, so values are never printed as `1e-5`.
    pub fn to_query_string(&self) -> String {
        let mut out = String::with_capacity(self.values.len() * 10);
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{v:.6}");
        }
        out
    }
}
