use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::vector::EmbeddingVector;

/// Black-box face embedding model.
pub trait EmbeddingExtractor: Send + Sync {
    /// Returns the embedding of the primary face in `image`, failing with
    /// `NoFaceDetected` when no face is present.
    fn embed(&self, image: &[u8]) -> AppResult<EmbeddingVector>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceDetection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default = "default_detection_score")]
    pub detection_score: f64,
    pub embedding: Vec<f64>,
}

fn default_detection_score() -> f64 {
    1.0
}

/// Detection payload written by an external face pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub faces: Vec<FaceDetection>,
}

impl FeatureFile {
    pub fn parse(bytes: &[u8], origin: &Path) -> AppResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| AppError::InvalidFeatureFile {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let bytes = fs::read(path).map_err(|source| AppError::FeatureRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes, path)
    }

    /// Validated embeddings of every detected face, in file order.
    pub fn embeddings(&self, origin: &Path) -> AppResult<Vec<EmbeddingVector>> {
        ensure_valid_faces(&self.faces, origin)?;
        self.faces
            .iter()
            .map(|face| EmbeddingVector::new(face.embedding.clone()))
            .collect()
    }
}

/// Highest detection score wins; equal scores keep the earlier face.
pub fn select_primary_face<'a>(
    faces: &'a [FaceDetection],
    origin: &Path,
) -> AppResult<&'a FaceDetection> {
    let mut best: Option<&FaceDetection> = None;
    for face in faces {
        let better = best.map_or(true, |current| {
            face.detection_score
                .partial_cmp(&current.detection_score)
                .unwrap_or(Ordering::Less)
                == Ordering::Greater
        });
        if better {
            best = Some(face);
        }
    }
    best.ok_or_else(|| AppError::NoFaceDetected {
        source_name: origin.display().to_string(),
    })
}

pub fn ensure_valid_faces(faces: &[FaceDetection], path: &Path) -> AppResult<usize> {
    let Some(first) = faces.first() else {
        return Err(AppError::NoFaceDetected {
            source_name: path.display().to_string(),
        });
    };

    let expected_len = first.embedding.len();
    if expected_len == 0 {
        return Err(AppError::InvalidFeatureFile {
            path: path.to_path_buf(),
            message: "embedding vectors are empty".into(),
        });
    }

    for (idx, face) in faces.iter().enumerate() {
        if face.embedding.len() != expected_len {
            return Err(AppError::InvalidFeatureFile {
                path: path.to_path_buf(),
                message: format!(
                    "embedding length mismatch at face index {} (expected {}, found {})",
                    idx,
                    expected_len,
                    face.embedding.len()
                ),
            });
        }

        let unusable = face.embedding.iter().all(|value| *value == 0.0)
            || face.embedding.iter().any(|value| !value.is_finite());
        if unusable {
            return Err(AppError::InvalidFeatureFile {
                path: path.to_path_buf(),
                message: format!("face index {idx} has an unusable embedding"),
            });
        }
    }

    Ok(expected_len)
}

/// Treats the "image" as an already-extracted feature file.
#[derive(Debug, Clone, Default)]
pub struct FeatureFileExtractor {
    origin: PathBuf,
}

impl FeatureFileExtractor {
    pub fn new(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
        }
    }

    pub fn embed_path(path: &Path) -> AppResult<EmbeddingVector> {
        let bytes = fs::read(path).map_err(|source| AppError::FeatureRead {
            path: path.to_path_buf(),
            source,
        })?;
        FeatureFileExtractor::new(path).embed(&bytes)
    }
}

impl EmbeddingExtractor for FeatureFileExtractor {
    fn embed(&self, image: &[u8]) -> AppResult<EmbeddingVector> {
        let file = FeatureFile::parse(image, &self.origin)?;
        ensure_valid_faces(&file.faces, &self.origin)?;
        let primary = select_primary_face(&file.faces, &self.origin)?;
        debug!(
            faces = file.faces.len(),
            detection_score = primary.detection_score,
            dim = primary.embedding.len(),
            "selected primary face"
        );
        EmbeddingVector::new(primary.embedding.clone())
    }
}
