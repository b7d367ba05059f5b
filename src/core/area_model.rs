//! Backscatter root-length area retrieval
//!
//! A regression model maps the outline and radiometry of a candidate to its
//! root length (square root of area). Models are injected per polarization.

use crate::core::features::CandidateFeatures;
use crate::core::record::IcebergRecord;
use crate::types::{Polarization, SarError, SarResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Model input columns, in order
pub const FEATURE_NAMES: [&str; 8] = [
    "root_area",
    "hh_mean",
    "hh_clutter_mean",
    "hh_contrast_mean",
    "hv_mean",
    "hv_clutter_mean",
    "hv_contrast_mean",
    "ia_mean",
];

/// Root length at which the synthesized area is fully the CFAR area
const FULL_CFAR_ROOT_LENGTH: f64 = 440.0;

/// Root-length regression over the `FEATURE_NAMES` columns
pub trait RootLengthModel: Send + Sync {
    /// One root length per feature row
    fn predict(&self, features: &Array2<f64>) -> SarResult<Array1<f64>>;

    fn version(&self) -> &str;
}

/// Linear root-length model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRootLengthModel {
    pub version: String,
    pub intercept: f64,
    pub coefficients: [f64; 8],
}

impl RootLengthModel for LinearRootLengthModel {
    fn predict(&self, features: &Array2<f64>) -> SarResult<Array1<f64>> {
        if features.ncols() != self.coefficients.len() {
            return Err(SarError::Model(format!(
                "Expected {} feature columns, got {}",
                self.coefficients.len(),
                features.ncols()
            )));
        }
        let weights = Array1::from(self.coefficients.to_vec());
        Ok(features.dot(&weights) + self.intercept)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// HH and HV area models
pub struct AreaModels {
    pub hh: Box<dyn RootLengthModel>,
    pub hv: Box<dyn RootLengthModel>,
}

impl AreaModels {
    pub fn new(hh: Box<dyn RootLengthModel>, hv: Box<dyn RootLengthModel>) -> Self {
        Self { hh, hv }
    }

    pub fn for_polarization(&self, pol: Polarization) -> &dyn RootLengthModel {
        match pol {
            Polarization::HH => self.hh.as_ref(),
            Polarization::HV => self.hv.as_ref(),
        }
    }
}

/// Model input row of one candidate
pub fn feature_row(features: &CandidateFeatures) -> [f64; 8] {
    let r = &features.radiometry;
    [
        features.candidate.area.sqrt(),
        r.hh_mean,
        r.hh_clutter_mean,
        r.hh_contrast_mean,
        r.hv_mean,
        r.hv_clutter_mean,
        r.hv_contrast_mean,
        r.ia_mean,
    ]
}

/// Predicted area blended towards the CFAR area as objects grow
pub fn synthesized_area(predicted_area: f64, cfar_area: f64) -> f64 {
    let percent = predicted_area.sqrt() / FULL_CFAR_ROOT_LENGTH * 100.0;
    let ratio = (percent * percent / 10_000.0).clamp(0.0, 1.0);
    (1.0 - ratio) * predicted_area + ratio * cfar_area
}

/// Applies the channel's area model to measured candidates
pub struct AreaPredictor<'a> {
    models: &'a AreaModels,
}

impl<'a> AreaPredictor<'a> {
    pub fn new(models: &'a AreaModels) -> Self {
        Self { models }
    }

    pub fn predict(&self, pol: Polarization, candidates: Vec<CandidateFeatures>) -> SarResult<Vec<IcebergRecord>> {
        let model = self.models.for_polarization(pol);
        let rows: Vec<[f64; 8]> = candidates.iter().map(feature_row).collect();
        let complete: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect();

        log::debug!(
            "{} area model {}: {} of {} candidates with complete features",
            pol,
            model.version(),
            complete.len(),
            rows.len()
        );

        let mut predicted = vec![f64::NAN; rows.len()];
        if !complete.is_empty() {
            let matrix = Array2::from_shape_fn((complete.len(), FEATURE_NAMES.len()), |(i, j)| rows[complete[i]][j]);
            let root_lengths = model.predict(&matrix)?;
            if root_lengths.len() != complete.len() {
                return Err(SarError::Model(format!(
                    "Model {} returned {} predictions for {} rows",
                    model.version(),
                    root_lengths.len(),
                    complete.len()
                )));
            }
            for (&i, root) in complete.iter().zip(root_lengths.iter()) {
                predicted[i] = root * root;
            }
        }

        Ok(candidates
            .into_iter()
            .zip(predicted)
            .map(|(features, predicted_area)| {
                let cfar_area = features.candidate.area;
                IcebergRecord {
                    index: features.candidate.index,
                    geometry: features.candidate.polygon,
                    cfar_area,
                    predicted_area,
                    synthesized_area: synthesized_area(predicted_area, cfar_area),
                    radiometry: features.radiometry,
                    shape: features.shape,
                    detection_channel: pol,
                    classification: None,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::{RadiometricFeatures, ShapeDescriptors};
    use crate::core::geometry::Polygon;
    use crate::core::polygonize::CandidatePolygon;
    use approx::assert_relative_eq;

    struct FixedRows(usize);

    impl RootLengthModel for FixedRows {
        fn predict(&self, _features: &Array2<f64>) -> SarResult<Array1<f64>> {
            Ok(Array1::from_elem(self.0, 10.0))
        }

        fn version(&self) -> &str {
            "fixed"
        }
    }

    fn root_area_model() -> LinearRootLengthModel {
        let mut coefficients = [0.0; 8];
        coefficients[0] = 1.0;
        LinearRootLengthModel {
            version: "identity-1".to_string(),
            intercept: 0.0,
            coefficients,
        }
    }

    fn candidate(index: usize, side: f64, hh_mean: f64) -> CandidateFeatures {
        let polygon = Polygon::new(vec![(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)]).unwrap();
        CandidateFeatures {
            candidate: CandidatePolygon {
                index,
                area: polygon.area(),
                polygon,
            },
            radiometry: RadiometricFeatures {
                hh_mean,
                hv_mean: -20.0,
                ia_mean: 35.0,
                hh_clutter_mean: -18.0,
                hh_contrast_mean: 8.0,
                hv_clutter_mean: -28.0,
                hv_contrast_mean: 8.0,
            },
            shape: ShapeDescriptors {
                perimeter_index: 0.88,
                max_chord_length: side * 2f64.sqrt(),
                length_root_area_ratio: 2f64.sqrt(),
            },
        }
    }

    #[test]
    fn test_predicted_area_is_squared_root_length() {
        let models = AreaModels::new(Box::new(root_area_model()), Box::new(root_area_model()));
        let records = AreaPredictor::new(&models)
            .predict(Polarization::HH, vec![candidate(0, 80.0, -10.0)])
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_relative_eq!(records[0].predicted_area, 6400.0, epsilon = 1e-9);
        assert_relative_eq!(records[0].cfar_area, 6400.0);
        assert_eq!(records[0].detection_channel, Polarization::HH);
        assert!(!records[0].is_iceberg());
    }

    #[test]
    fn test_incomplete_features_get_nan() {
        let models = AreaModels::new(Box::new(root_area_model()), Box::new(root_area_model()));
        let records = AreaPredictor::new(&models)
            .predict(
                Polarization::HV,
                vec![candidate(0, 80.0, f64::NAN), candidate(1, 100.0, -12.0)],
            )
            .unwrap();
        assert!(records[0].predicted_area.is_nan());
        assert!(records[0].synthesized_area.is_nan());
        assert_relative_eq!(records[1].predicted_area, 10_000.0, epsilon = 1e-9);
        assert_eq!(records[1].index, 1);
    }

    #[test]
    fn test_row_count_mismatch_is_model_error() {
        let models = AreaModels::new(Box::new(FixedRows(3)), Box::new(FixedRows(3)));
        let result = AreaPredictor::new(&models).predict(Polarization::HH, vec![candidate(0, 80.0, -10.0)]);
        assert!(matches!(result, Err(SarError::Model(_))));
    }

    #[test]
    fn test_synthesized_area_blend() {
        // Small objects keep the model estimate almost unchanged
        assert_relative_eq!(synthesized_area(1936.0, 3000.0), 0.99 * 1936.0 + 0.01 * 3000.0, epsilon = 1e-9);
        // At and beyond 440 m root length the CFAR area takes over
        assert_relative_eq!(synthesized_area(440.0 * 440.0, 1.0e5), 1.0e5, epsilon = 1e-9);
        assert_relative_eq!(synthesized_area(1.0e6, 2.0e5), 2.0e5, epsilon = 1e-9);
    }
}
