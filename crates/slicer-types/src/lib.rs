//! Core types, error taxonomy, and data structures for the print slicing service.
//!
//! This crate has no I/O of its own: it defines the domain vocabulary shared
//! by configuration, the slicing core, and the HTTP surface.

pub mod error;
pub mod pricing;
pub mod upload;

pub use error::{SlicerError, SlicerResult};
pub use pricing::{Material, PricingMap, Technology};
pub use upload::{BuildVolume, UploadContext};

use serde::{Deserialize, Serialize};

/// Vertical resolution of one printed slice, in millimeters.
///
/// Equality is by tolerance (1e-9) rather than bit-for-bit float equality,
/// because layer heights arrive as request strings parsed through `f64`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerHeight(pub f64);

impl LayerHeight {
    const EPSILON: f64 = 1e-9;

    pub fn new(value: f64) -> SlicerResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(SlicerError::InvalidLayerHeight { value });
        }
        Ok(Self(value))
    }

    /// Allowed layer heights for a technology, per the build-volume/profile contract.
    pub fn allowed_for(tech: Technology) -> &'static [f64] {
        match tech {
            Technology::Fdm => &[0.1, 0.2, 0.3],
            Technology::Sla => &[0.025, 0.05],
        }
    }

    pub fn validate_for(self, tech: Technology) -> SlicerResult<Self> {
        let allowed = Self::allowed_for(tech);
        if allowed.iter().any(|a| (a - self.0).abs() < Self::EPSILON) {
            Ok(self)
        } else {
            Err(SlicerError::InvalidLayerHeightForTechnology {
                technology: tech,
                value: self.0,
            })
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for LayerHeight {
    fn eq(&self, other: &Self) -> bool {
        (self.0 - other.0).abs() < Self::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_layer_height() {
        assert!(LayerHeight::new(0.0).is_err());
        assert!(LayerHeight::new(-0.2).is_err());
        assert!(LayerHeight::new(f64::NAN).is_err());
    }

    #[test]
    fn validates_against_technology_allowed_set() {
        let h = LayerHeight::new(0.2).unwrap();
        assert!(h.validate_for(Technology::Fdm).is_ok());
        assert!(LayerHeight::new(0.2).unwrap().validate_for(Technology::Sla).is_err());

        let h = LayerHeight::new(0.05).unwrap();
        assert!(h.validate_for(Technology::Sla).is_ok());
    }

    #[test]
    fn tolerance_equality() {
        let a = LayerHeight::new(0.2).unwrap();
        let b = LayerHeight::new(0.2 + 1e-12).unwrap();
        assert_eq!(a, b);
    }
}
