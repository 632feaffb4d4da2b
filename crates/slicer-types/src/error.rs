use crate::pricing::Technology;
use thiserror::Error;

/// The service's closed error taxonomy. Each variant knows its own wire
/// `errorCode` and HTTP status so handlers never have to re-derive them.
#[derive(Error, Debug)]
pub enum SlicerError {
    #[error("layer height must be a positive finite number, got {value}")]
    InvalidLayerHeight { value: f64 },

    #[error("layer height {value} is not valid for {technology}")]
    InvalidLayerHeightForTechnology { technology: Technology, value: f64 },

    #[error("model ({measured_x}, {measured_y}, {measured_z}) mm exceeds {technology} build volume ({limit_x}, {limit_y}, {limit_z}) mm")]
    ModelExceedsBuildVolume {
        technology: Technology,
        measured_x: f64,
        measured_y: f64,
        measured_z: f64,
        limit_x: f64,
        limit_y: f64,
        limit_z: f64,
    },

    #[error("source geometry rejected by converter: {detail}")]
    InvalidSourceGeometry { detail: String },

    #[error("rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("slice queue is full")]
    QueueFull,

    #[error("timed out waiting for a free slicing worker")]
    QueueTimeout,

    #[error("no supported file found in archive")]
    UnsupportedUpload,

    #[error("archive rejected: {reason}")]
    ArchiveRejected { reason: String },

    #[error("admin API key is not configured")]
    AdminKeyUnset,

    #[error("missing or invalid admin API key")]
    Unauthorized,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("material {material} not found for {technology}")]
    MaterialNotFound {
        technology: Technology,
        material: String,
    },

    #[error("no such print artifact: {name}")]
    ArtifactNotFound { name: String },

    #[error("material {material} already exists for {technology}")]
    MaterialAlreadyExists {
        technology: Technology,
        material: String,
    },

    #[error("cannot delete the default material fallback")]
    CannotDeleteDefault,

    #[error("internal processing error: {0}")]
    Internal(String),
}

pub type SlicerResult<T> = Result<T, SlicerError>;

impl SlicerError {
    /// Wire `errorCode`, as returned in the JSON error envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            SlicerError::InvalidLayerHeight { .. } => "INVALID_LAYER_HEIGHT",
            SlicerError::InvalidLayerHeightForTechnology { .. } => {
                "INVALID_LAYER_HEIGHT_FOR_TECHNOLOGY"
            }
            SlicerError::ModelExceedsBuildVolume { .. } => "MODEL_EXCEEDS_BUILD_VOLUME",
            SlicerError::InvalidSourceGeometry { .. } => "INVALID_SOURCE_GEOMETRY",
            SlicerError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            SlicerError::QueueFull => "QUEUE_FULL",
            SlicerError::QueueTimeout => "QUEUE_TIMEOUT",
            SlicerError::UnsupportedUpload => "INVALID_SOURCE_GEOMETRY",
            SlicerError::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            SlicerError::ArchiveRejected { .. } => "INVALID_SOURCE_GEOMETRY",
            SlicerError::AdminKeyUnset => "ADMIN_KEY_UNSET",
            SlicerError::Unauthorized => "UNAUTHORIZED",
            SlicerError::Validation(_) => "VALIDATION_ERROR",
            SlicerError::MaterialNotFound { .. } => "MATERIAL_NOT_FOUND",
            SlicerError::MaterialAlreadyExists { .. } => "MATERIAL_ALREADY_EXISTS",
            SlicerError::CannotDeleteDefault => "CANNOT_DELETE_DEFAULT",
            SlicerError::Internal(_) => "INTERNAL_PROCESSING_ERROR",
        }
    }

    /// HTTP status code for this error, per the error taxonomy in the spec.
    pub fn status_code(&self) -> u16 {
        match self {
            SlicerError::InvalidLayerHeight { .. }
            | SlicerError::InvalidLayerHeightForTechnology { .. }
            | SlicerError::ModelExceedsBuildVolume { .. }
            | SlicerError::InvalidSourceGeometry { .. }
            | SlicerError::UnsupportedUpload
            | SlicerError::ArchiveRejected { .. }
            | SlicerError::Validation(_) => 400,
            SlicerError::Unauthorized => 401,
            SlicerError::MaterialNotFound { .. } => 404,
            SlicerError::ArtifactNotFound { .. } => 404,
            SlicerError::MaterialAlreadyExists { .. } => 409,
            SlicerError::RateLimitExceeded { .. } => 429,
            SlicerError::AdminKeyUnset | SlicerError::QueueFull | SlicerError::QueueTimeout => 503,
            SlicerError::CannotDeleteDefault => 400,
            SlicerError::Internal(_) => 500,
        }
    }

    /// True for errors that must never be written to the rolling error log
    /// (client-caused rejections), per the propagation policy. `QueueFull`,
    /// `QueueTimeout`, and `AdminKeyUnset` carry a 503 status but are
    /// operator/client-facing admission rejections, not server faults, so
    /// this matches against the closed set of true internal-fault variants
    /// rather than thresholding on the HTTP status.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SlicerError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(SlicerError::QueueFull.status_code(), 503);
        assert_eq!(SlicerError::QueueTimeout.status_code(), 503);
        assert_eq!(
            SlicerError::RateLimitExceeded {
                retry_after_seconds: 10
            }
            .status_code(),
            429
        );
        assert_eq!(SlicerError::Internal("boom".into()).status_code(), 500);
        assert!(!SlicerError::Internal("boom".into()).is_client_error());
        assert!(SlicerError::QueueFull.is_client_error());
    }

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(
            SlicerError::ModelExceedsBuildVolume {
                technology: Technology::Fdm,
                measured_x: 300.0,
                measured_y: 100.0,
                measured_z: 50.0,
                limit_x: 250.0,
                limit_y: 210.0,
                limit_z: 210.0,
            }
            .error_code(),
            "MODEL_EXCEEDS_BUILD_VOLUME"
        );
    }
}
