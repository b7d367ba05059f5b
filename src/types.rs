use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Real-valued raster sample (dB, degrees or linear intensity)
pub type SarReal = f32;

/// 2D real SAR data array (rows x columns)
pub type SarRealImage = Array2<SarReal>;

/// Binary mask, 1 = set
pub type SarMask = Array2<u8>;

/// Coordinate system enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (latitude, longitude)
    Geographic,
    /// Projected coordinates (e.g., EPSG:3996 polar stereographic)
    Projected { epsg: u32 },
}

/// Polarization channels of a dual-pol HH/HV acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    HH,
    HV,
}

impl Polarization {
    pub const ALL: [Polarization; 2] = [Polarization::HH, Polarization::HV];
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::HH => write!(f, "HH"),
            Polarization::HV => write!(f, "HV"),
        }
    }
}

/// Geospatial transformation parameters (GDAL affine ordering)
///
/// Map coordinates of the pixel corner `(col, row)`:
/// `x = top_left_x + col * pixel_width + row * rotation_x`,
/// `y = top_left_y + col * rotation_y + row * pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Pixel-space `(col, row)` to map `(x, y)`
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.top_left_x + col * self.pixel_width + row * self.rotation_x,
            self.top_left_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// Map `(x, y)` to fractional pixel-space `(col, row)`
    pub fn invert(&self, x: f64, y: f64) -> SarResult<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return Err(SarError::InvalidFormat(format!(
                "Geotransform is not invertible: {:?}",
                self
            )));
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (-self.rotation_y * dx + self.pixel_width * dy) / det;
        Ok((col, row))
    }

    /// Ground area covered by one pixel
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y).abs()
    }
}

/// Preprocessed dual-pol scene: HH and HV in dB, incidence angle in degrees
#[derive(Debug, Clone)]
pub struct SceneRaster {
    pub hh: SarRealImage,
    pub hv: SarRealImage,
    pub ia: SarRealImage,
    pub geo_transform: GeoTransform,
    pub crs: CoordinateSystem,
}

impl SceneRaster {
    pub fn new(
        hh: SarRealImage,
        hv: SarRealImage,
        ia: SarRealImage,
        geo_transform: GeoTransform,
        crs: CoordinateSystem,
    ) -> SarResult<Self> {
        if hh.dim() != hv.dim() || hh.dim() != ia.dim() {
            return Err(SarError::InvalidFormat(format!(
                "Band shapes differ: HH {:?}, HV {:?}, IA {:?}",
                hh.dim(),
                hv.dim(),
                ia.dim()
            )));
        }
        Ok(Self { hh, hv, ia, geo_transform, crs })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.hh.dim()
    }

    /// Backscatter band of one polarization
    pub fn band(&self, pol: Polarization) -> &SarRealImage {
        match pol {
            Polarization::HH => &self.hh,
            Polarization::HV => &self.hv,
        }
    }

    /// Copy of the scene with every band set to NaN where the incidence
    /// angle is below `min_incidence_deg` (scene edge)
    pub fn masked_below_incidence(&self, min_incidence_deg: f32) -> Self {
        let edge = self.ia.mapv(|angle| angle < min_incidence_deg);
        let mask_band = |band: &SarRealImage| {
            Zip::from(band)
                .and(&edge)
                .map_collect(|&value, &is_edge| if is_edge { SarReal::NAN } else { value })
        };
        Self {
            hh: mask_band(&self.hh),
            hv: mask_band(&self.hv),
            ia: mask_band(&self.ia),
            geo_transform: self.geo_transform,
            crs: self.crs.clone(),
        }
    }
}

/// dB to linear intensity
pub fn db_to_linear(db: SarReal) -> SarReal {
    10.0f32.powf(db / 10.0)
}

/// Linear intensity to dB (magnitude taken first, 0 maps to -inf)
pub fn linear_to_db(linear: SarReal) -> SarReal {
    10.0 * linear.abs().log10()
}

/// Error types for SAR processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Unsupported outer window size {0}; expected 29 or 49")]
    InvalidWindowSize(usize),

    #[error("Area model error: {0}")]
    Model(String),
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_db_conversion_roundtrip_points() {
        assert_relative_eq!(db_to_linear(20.0), 100.0, max_relative = 1e-6);
        assert_relative_eq!(db_to_linear(-13.0), 0.050_118_72, max_relative = 1e-6);
        assert_relative_eq!(linear_to_db(0.01), -20.0, epsilon = 1e-5);
        assert_relative_eq!(linear_to_db(-1000.0), 30.0, epsilon = 1e-5);
        assert!(linear_to_db(0.0).is_infinite());
    }

    #[test]
    fn test_geotransform_inverse() {
        let gt = GeoTransform::north_up(1000.0, 5000.0, 40.0);
        let (x, y) = gt.apply(3.5, 7.25);
        let (col, row) = gt.invert(x, y).unwrap();
        assert_relative_eq!(col, 3.5, epsilon = 1e-9);
        assert_relative_eq!(row, 7.25, epsilon = 1e-9);
        assert_relative_eq!(gt.pixel_area(), 1600.0);
    }

    #[test]
    fn test_scene_shape_mismatch_rejected() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0);
        let result = SceneRaster::new(
            Array2::zeros((4, 4)),
            Array2::zeros((4, 5)),
            Array2::zeros((4, 4)),
            gt,
            CoordinateSystem::Projected { epsg: 3996 },
        );
        assert!(matches!(result, Err(SarError::InvalidFormat(_))));
    }

    #[test]
    fn test_low_incidence_masking() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0);
        let mut ia = Array2::from_elem((2, 2), 30.0f32);
        ia[[0, 1]] = 19.0;
        let scene = SceneRaster::new(
            Array2::from_elem((2, 2), -15.0),
            Array2::from_elem((2, 2), -25.0),
            ia,
            gt,
            CoordinateSystem::Projected { epsg: 3996 },
        )
        .unwrap();

        let masked = scene.masked_below_incidence(19.6);
        assert!(masked.hh[[0, 1]].is_nan());
        assert!(masked.hv[[0, 1]].is_nan());
        assert!(masked.ia[[0, 1]].is_nan());
        assert_eq!(masked.hh[[1, 1]], -15.0);
        assert_eq!(masked.band(Polarization::HH)[[1, 1]], -15.0);
        assert_eq!(masked.band(Polarization::HV)[[1, 1]], -25.0);
    }
}
