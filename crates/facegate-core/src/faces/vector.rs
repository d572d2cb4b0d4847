use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{AppError, AppResult};

/// Fixed-length face embedding produced by the external extractor.
///
/// Construction guarantees the vector is non-empty and every component is
/// finite. The norm may still be zero; similarity scoring rejects that case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f64>);

impl EmbeddingVector {
    pub fn new(values: Vec<f64>) -> AppResult<Self> {
        if values.is_empty() {
            return Err(AppError::EmptyVector);
        }
        if let Some(idx) = values.iter().position(|value| !value.is_finite()) {
            return Err(AppError::InvalidVector {
                reason: format!("component {idx} is not a finite number"),
            });
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|value| value * value).sum::<f64>().sqrt()
    }

    /// True when every component is exactly zero; such a vector has no direction.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|value| *value == 0.0)
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl TryFrom<Vec<f64>> for EmbeddingVector {
    type Error = AppError;

    fn try_from(values: Vec<f64>) -> AppResult<Self> {
        Self::new(values)
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<f64>::deserialize(deserializer)?;
        EmbeddingVector::new(values).map_err(serde::de::Error::custom)
    }
}
