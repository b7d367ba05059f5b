use crate::core::classifier::Classification;
use crate::core::features::{RadiometricFeatures, ShapeDescriptors};
use crate::core::geometry::Polygon;
use crate::types::Polarization;
use serde::{Deserialize, Serialize};

/// One detected object with its measurements, area estimates and test results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcebergRecord {
    pub index: usize,
    pub geometry: Polygon,
    /// Planar area of the CFAR outline
    pub cfar_area: f64,
    /// Area from the root-length regression, NaN when features were incomplete
    pub predicted_area: f64,
    /// Blend of predicted and CFAR area weighted towards CFAR for large objects
    pub synthesized_area: f64,
    pub radiometry: RadiometricFeatures,
    pub shape: ShapeDescriptors,
    pub detection_channel: Polarization,
    pub classification: Option<Classification>,
}

impl IcebergRecord {
    /// False until classified
    pub fn is_iceberg(&self) -> bool {
        self.classification.as_ref().map_or(false, |c| c.is_iceberg)
    }
}
