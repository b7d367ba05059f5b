use crate::core::cfar::DualChannelDetection;
use crate::core::geometry::Polygon;
use crate::core::polygonize::CandidatePolygon;
use crate::types::{GeoTransform, Polarization, SarRealImage, SarResult, SceneRaster};
use serde::{Deserialize, Serialize};

/// Shape descriptor parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShapeParams {
    /// Douglas–Peucker tolerance applied before measuring the longest chord
    pub simplify_tolerance: f64,
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            simplify_tolerance: 20.0,
        }
    }
}

/// Zonal means of a candidate, backscatter terms in dB and incidence in degrees
///
/// NaN marks a statistic without any valid pixel under the polygon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiometricFeatures {
    pub hh_mean: f64,
    pub hv_mean: f64,
    pub ia_mean: f64,
    pub hh_clutter_mean: f64,
    pub hh_contrast_mean: f64,
    pub hv_clutter_mean: f64,
    pub hv_contrast_mean: f64,
}

impl RadiometricFeatures {
    pub fn backscatter(&self, pol: Polarization) -> f64 {
        match pol {
            Polarization::HH => self.hh_mean,
            Polarization::HV => self.hv_mean,
        }
    }
}

/// Geometry descriptors of a candidate outline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptors {
    /// 2√(π·area) / perimeter, 1 for a circle
    pub perimeter_index: f64,
    pub max_chord_length: f64,
    /// max_chord_length / √area
    pub length_root_area_ratio: f64,
}

impl ShapeDescriptors {
    pub fn from_polygon(polygon: &Polygon, params: &ShapeParams) -> Self {
        let area = polygon.area();
        let max_chord_length = polygon.max_chord_length(params.simplify_tolerance);
        Self {
            perimeter_index: 2.0 * (std::f64::consts::PI * area).sqrt() / polygon.perimeter(),
            max_chord_length,
            length_root_area_ratio: max_chord_length / area.sqrt(),
        }
    }
}

/// Candidate polygon with its measured features
#[derive(Debug, Clone)]
pub struct CandidateFeatures {
    pub candidate: CandidatePolygon,
    pub radiometry: RadiometricFeatures,
    pub shape: ShapeDescriptors,
}

/// Zonal statistics and shape descriptors for candidate polygons
pub struct FeatureExtractor {
    params: ShapeParams,
}

impl FeatureExtractor {
    pub fn new(params: ShapeParams) -> Self {
        Self { params }
    }

    pub fn extract(
        &self,
        candidates: Vec<CandidatePolygon>,
        scene: &SceneRaster,
        detection: &DualChannelDetection,
    ) -> SarResult<Vec<CandidateFeatures>> {
        log::debug!("Measuring {} candidates", candidates.len());

        #[cfg(feature = "parallel")]
        let measured: SarResult<Vec<CandidateFeatures>> = {
            use rayon::prelude::*;
            candidates
                .into_par_iter()
                .map(|candidate| self.measure(candidate, scene, detection))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let measured: SarResult<Vec<CandidateFeatures>> = candidates
            .into_iter()
            .map(|candidate| self.measure(candidate, scene, detection))
            .collect();

        measured
    }

    fn measure(
        &self,
        candidate: CandidatePolygon,
        scene: &SceneRaster,
        detection: &DualChannelDetection,
    ) -> SarResult<CandidateFeatures> {
        let footprint = pixel_footprint(&candidate.polygon, &scene.geo_transform, scene.dim())?;
        let linear_mean = |raster: &SarRealImage| zonal_mean_linear(raster, &footprint);

        let radiometry = RadiometricFeatures {
            hh_mean: linear_mean(scene.band(Polarization::HH)),
            hv_mean: linear_mean(scene.band(Polarization::HV)),
            ia_mean: zonal_mean(&scene.ia, &footprint),
            hh_clutter_mean: linear_mean(&detection.hh.clutter_db),
            hh_contrast_mean: linear_mean(&detection.hh.contrast_db),
            hv_clutter_mean: linear_mean(&detection.hv.clutter_db),
            hv_contrast_mean: linear_mean(&detection.hv.contrast_db),
        };
        let shape = ShapeDescriptors::from_polygon(&candidate.polygon, &self.params);

        Ok(CandidateFeatures {
            candidate,
            radiometry,
            shape,
        })
    }
}

/// Pixels whose centre falls inside the polygon, as (row, col)
pub fn pixel_footprint(
    polygon: &Polygon,
    geo_transform: &GeoTransform,
    shape: (usize, usize),
) -> SarResult<Vec<(usize, usize)>> {
    let (height, width) = shape;
    let bbox = polygon.bounding_box();

    let mut col_range = (f64::INFINITY, f64::NEG_INFINITY);
    let mut row_range = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
    ] {
        let (col, row) = geo_transform.invert(x, y)?;
        col_range = (col_range.0.min(col), col_range.1.max(col));
        row_range = (row_range.0.min(row), row_range.1.max(row));
    }

    let clamp = |value: f64, limit: usize| value.max(0.0).min(limit as f64) as usize;
    let (col0, col1) = (clamp(col_range.0.floor(), width), clamp(col_range.1.ceil(), width));
    let (row0, row1) = (clamp(row_range.0.floor(), height), clamp(row_range.1.ceil(), height));

    let mut pixels = Vec::new();
    for row in row0..row1 {
        for col in col0..col1 {
            let centre = geo_transform.apply(col as f64 + 0.5, row as f64 + 0.5);
            if polygon.contains_point(centre) {
                pixels.push((row, col));
            }
        }
    }
    Ok(pixels)
}

/// Mean of the non-NaN samples under the footprint
pub fn zonal_mean(raster: &SarRealImage, footprint: &[(usize, usize)]) -> f64 {
    let (sum, count) = footprint
        .iter()
        .map(|&(row, col)| raster[[row, col]])
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + v as f64, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// dB raster averaged in linear intensity, result back in dB
pub fn zonal_mean_linear(raster_db: &SarRealImage, footprint: &[(usize, usize)]) -> f64 {
    let (sum, count) = footprint
        .iter()
        .map(|&(row, col)| raster_db[[row, col]])
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + 10f64.powf(v as f64 / 10.0), count + 1));
    if count == 0 {
        f64::NAN
    } else {
        10.0 * (sum / count as f64).log10()
    }
}
