//! Type-safe wrappers and core types for vector search functionality.
//!
//! This module provides newtypes and error types following the project's
//! strict type safety guidelines. All types implement necessary traits
//! for ergonomic usage while preventing primitive obsession.

use half::f16;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default vector dimension for code embeddings (all-MiniLM-L6-v2 model).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for cosine similarity scores.
///
/// Scores are in the range [-1.0, 1.0] where:
/// - 1.0 indicates identical direction (perfect similarity)
/// - 0.0 indicates orthogonal vectors
/// - -1.0 indicates opposite direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Score(f32);

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// Returns an error if the score is not in the range [-1.0, 1.0] or is NaN.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in range [-1.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Creates a score from a raw cosine value, clamping rounding noise
    /// back into range. NaN still fails.
    pub fn from_cosine(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        Ok(Self(value.clamp(-1.0, 1.0)))
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Score values should never be NaN")
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent
/// dimension mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Per-dimension byte width used to encode an embedding.
///
/// The precision is always carried explicitly alongside the bytes, never
/// inferred from buffer length alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorPrecision {
    /// 4 bytes per dimension. Default and the only encoding validated
    /// for production use.
    Full,
    /// 2 bytes per dimension (IEEE 754 half). Representable in the data
    /// model but rejected at configuration validation until adequate
    /// hardware-accelerated half math lands.
    Half,
}

impl VectorPrecision {
    /// Bytes per dimension for this encoding.
    #[must_use]
    pub const fn element_width(&self) -> usize {
        match self {
            Self::Full => 4,
            Self::Half => 2,
        }
    }

    /// Stable lowercase name for display and serialization.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Half => "half",
        }
    }
}

impl std::fmt::Display for VectorPrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An embedding encoded as a precision-tagged opaque byte buffer.
///
/// Conversion between precisions is explicit and pure; round-tripping
/// through half precision loses the low mantissa bits by design.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingData {
    precision: VectorPrecision,
    bytes: Vec<u8>,
}

impl EmbeddingData {
    /// Encode an f32 slice at the given precision.
    #[must_use]
    pub fn encode(vector: &[f32], precision: VectorPrecision) -> Self {
        let bytes = match precision {
            VectorPrecision::Full => vector.iter().flat_map(|v| v.to_le_bytes()).collect(),
            VectorPrecision::Half => vector
                .iter()
                .flat_map(|v| f16::from_f32(*v).to_le_bytes())
                .collect(),
        };
        Self { precision, bytes }
    }

    /// Decode into f32 values regardless of stored precision.
    #[must_use]
    pub fn decode(&self) -> Vec<f32> {
        match self.precision {
            VectorPrecision::Full => self
                .bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            VectorPrecision::Half => self
                .bytes
                .chunks_exact(2)
                .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
        }
    }

    /// Pure conversion to another precision.
    #[must_use]
    pub fn convert(&self, target: VectorPrecision) -> Self {
        if self.precision == target {
            return self.clone();
        }
        Self::encode(&self.decode(), target)
    }

    /// Number of dimensions encoded in this buffer.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.bytes.len() / self.precision.element_width()
    }

    /// The encoding this buffer is tagged with.
    #[must_use]
    pub fn precision(&self) -> VectorPrecision {
        self.precision
    }

    /// Raw encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },

    #[error(
        "Half-precision vectors are not validated for production use\nSuggestion: Set embedding.precision = \"full\" in the configuration"
    )]
    HalfPrecisionUnsupported,

    #[error("Failed to build scan thread pool: {0}\nSuggestion: Lower search.max_threads")]
    ThreadPool(String),
}
