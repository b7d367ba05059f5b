use crate::core::optimize::NelderMead;
use crate::core::special::regularized_gamma_q;
use crate::core::window_stats::WindowStatsEngine;
use crate::types::{db_to_linear, linear_to_db, Polarization, SarError, SarMask, SarRealImage, SarResult};
use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The outlier mask is cleared this many pixels short of the outer window size
/// along every raster edge
pub const EDGE_MARGIN_REDUCTION: usize = 4;

/// Probability of false alarm, either one value for the scene or one per pixel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pfa {
    Scalar(f64),
    Grid(Array2<f64>),
}

/// Gamma CFAR parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfarParams {
    pub pfa: Pfa,
    /// Outer window side length in pixels (29 or 49)
    pub outer_window_size: usize,
}

impl Default for CfarParams {
    fn default() -> Self {
        Self {
            pfa: Pfa::Scalar(1e-6),
            outer_window_size: 49,
        }
    }
}

/// Parameters of the threshold-multiplier search
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverParams {
    pub initial_guess: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            initial_guess: 3.0,
            tolerance: 1e-6,
            max_iterations: 200,
        }
    }
}

/// Threshold multiplier matching the `Pfa` variant it was solved for
#[derive(Debug, Clone, PartialEq)]
pub enum GammaMultiplier {
    Scalar(f64),
    Grid(Array2<f64>),
}

/// CFAR products of one channel
#[derive(Debug, Clone)]
pub struct ChannelDetection {
    /// 1 = outlier
    pub outliers: SarMask,
    /// Local background mean in dB
    pub clutter_db: SarRealImage,
    /// Source minus clutter in dB
    pub contrast_db: SarRealImage,
    pub enl: f64,
    pub multiplier: GammaMultiplier,
}

/// CFAR products of both channels
#[derive(Debug, Clone)]
pub struct DualChannelDetection {
    pub hh: ChannelDetection,
    pub hv: ChannelDetection,
}

impl DualChannelDetection {
    pub fn channel(&self, pol: Polarization) -> &ChannelDetection {
        match pol {
            Polarization::HH => &self.hh,
            Polarization::HV => &self.hv,
        }
    }
}

/// Gamma-distribution CFAR detector
pub struct GammaCfarDetector {
    params: CfarParams,
    solver: SolverParams,
    window: WindowStatsEngine,
}

impl GammaCfarDetector {
    pub fn new(params: CfarParams, solver: SolverParams) -> SarResult<Self> {
        let window = WindowStatsEngine::new(params.outer_window_size)?;
        Ok(Self { params, solver, window })
    }

    pub fn params(&self) -> &CfarParams {
        &self.params
    }

    /// Run the detector on both channels independently
    pub fn detect_dual(&self, hh_db: &SarRealImage, hv_db: &SarRealImage) -> SarResult<DualChannelDetection> {
        log::info!("Running gamma CFAR on HH");
        let hh = self.detect(hh_db)?;
        log::info!("Running gamma CFAR on HV");
        let hv = self.detect(hv_db)?;
        Ok(DualChannelDetection { hh, hv })
    }

    /// Run the detector on one channel given in decibels
    pub fn detect(&self, channel_db: &SarRealImage) -> SarResult<ChannelDetection> {
        if let Pfa::Grid(grid) = &self.params.pfa {
            if grid.dim() != channel_db.dim() {
                return Err(SarError::InvalidFormat(format!(
                    "PFA grid {:?} does not match channel {:?}",
                    grid.dim(),
                    channel_db.dim()
                )));
            }
        }

        let linear = channel_db.mapv(db_to_linear);
        let valid = linear.mapv(|v| !v.is_nan());

        let enl = Self::estimate_enl(&linear)?;
        let multiplier = self.gamma_multiplier(enl);
        log::debug!("ENL {:.3}, multiplier {}", enl, summarize(&multiplier));

        let clutter = self.window.annulus_mean(&linear, &valid)?;

        let mut outliers = match &multiplier {
            GammaMultiplier::Scalar(t) => Zip::from(&linear)
                .and(&clutter)
                .par_map_collect(|&value, &background| exceeds(value, background, *t)),
            GammaMultiplier::Grid(grid) => Zip::from(&linear)
                .and(&clutter)
                .and(grid)
                .par_map_collect(|&value, &background, &t| exceeds(value, background, t)),
        };
        mask_edges(&mut outliers, self.window.outer_window_size() - EDGE_MARGIN_REDUCTION);

        let clutter_db = clutter.mapv(linear_to_db);
        let contrast_db = Zip::from(channel_db)
            .and(&clutter_db)
            .map_collect(|&source, &background| source - background);

        log::debug!("{} outlier pixels", outliers.iter().filter(|&&v| v == 1).count());

        Ok(ChannelDetection {
            outliers,
            clutter_db,
            contrast_db,
            enl,
            multiplier,
        })
    }

    /// Equivalent number of looks by the method of moments
    ///
    /// Only samples strictly below twice the median enter the estimate so
    /// that bright targets do not inflate the variance. Flat clutter has zero
    /// variance and yields an infinite ENL, which the multiplier search treats
    /// as non-convergent rather than fatal.
    pub fn estimate_enl(linear: &SarRealImage) -> SarResult<f64> {
        let mut samples: Vec<f64> = linear.iter().filter(|v| !v.is_nan()).map(|&v| v as f64).collect();
        if samples.is_empty() {
            return Err(SarError::Processing("No valid pixels for ENL estimation".to_string()));
        }

        let cutoff = 2.0 * median(&mut samples);
        let clutter: Vec<f64> = samples.into_iter().filter(|&v| v < cutoff).collect();
        if clutter.is_empty() {
            log::warn!("No clutter samples below twice the median, ENL undefined");
            return Ok(f64::NAN);
        }

        let n = clutter.len() as f64;
        let mean = clutter.iter().sum::<f64>() / n;
        let variance = clutter.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let enl = mean * mean / variance;

        if !enl.is_finite() {
            log::warn!("Degenerate ENL {} (mean {}, variance {})", enl, mean, variance);
        }
        Ok(enl)
    }

    /// Multiplier for the configured PFA, solved once per distinct value
    pub fn gamma_multiplier(&self, enl: f64) -> GammaMultiplier {
        match &self.params.pfa {
            Pfa::Scalar(pfa) => GammaMultiplier::Scalar(solve_multiplier(*pfa, enl, &self.solver)),
            Pfa::Grid(grid) => {
                let mut solved: HashMap<u64, f64> = HashMap::new();
                let multipliers = grid.mapv(|pfa| {
                    *solved
                        .entry(pfa.to_bits())
                        .or_insert_with(|| solve_multiplier(pfa, enl, &self.solver))
                });
                log::debug!("Solved {} distinct PFA values", solved.len());
                GammaMultiplier::Grid(multipliers)
            }
        }
    }
}

/// Probability that gamma clutter with `enl` looks exceeds `t` times its mean
pub fn gamma_pfa(t: f64, enl: f64) -> f64 {
    regularized_gamma_q(enl, t * enl)
}

/// Find `t` with `Q(enl, t * enl) = pfa` by minimizing the absolute residual
pub fn solve_multiplier(pfa: f64, enl: f64, solver: &SolverParams) -> f64 {
    if !enl.is_finite() || enl <= 0.0 {
        log::warn!(
            "Gamma CFAR multiplier may not have converged (pfa {}, ENL {}), using {}",
            pfa,
            enl,
            solver.initial_guess
        );
        return solver.initial_guess;
    }

    let search = NelderMead::new(solver.tolerance, solver.max_iterations);
    let result = search.minimize(|x| (gamma_pfa(x[0], enl) - pfa).abs(), &[solver.initial_guess]);
    let t = result.x[0];

    // TODO: retry from another starting point (or bracket the root) instead of only warning
    if t == solver.initial_guess {
        log::warn!("Gamma CFAR multiplier may not have converged (pfa {}, ENL {:.3})", pfa, enl);
    } else if !result.converged {
        log::warn!(
            "Gamma CFAR multiplier search stopped after {} iterations (pfa {}, t {:.6})",
            result.iterations,
            pfa,
            t
        );
    }
    t
}

fn exceeds(value: f32, background: f32, t: f64) -> u8 {
    (value as f64 > background as f64 * t) as u8
}

/// Clear a margin of `n` pixels along every edge
fn mask_edges(mask: &mut SarMask, n: usize) {
    let (height, width) = mask.dim();
    let rows = n.min(height);
    let cols = n.min(width);
    mask.slice_mut(s![..rows, ..]).fill(0);
    mask.slice_mut(s![height - rows.., ..]).fill(0);
    mask.slice_mut(s![.., ..cols]).fill(0);
    mask.slice_mut(s![.., width - cols..]).fill(0);
}

/// Median of the samples, averaging the two middle values for even counts
fn median(samples: &mut [f64]) -> f64 {
    let n = samples.len();
    let mid = n / 2;
    let (_, upper, _) = samples.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 1 {
        upper
    } else {
        let lower = samples[..mid].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        0.5 * (lower + upper)
    }
}

fn summarize(multiplier: &GammaMultiplier) -> String {
    match multiplier {
        GammaMultiplier::Scalar(t) => format!("{:.6}", t),
        GammaMultiplier::Grid(grid) => format!("grid {:?}", grid.dim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic textured clutter around `level` (linear) in dB
    fn textured_clutter_db(height: usize, width: usize, level: f32) -> SarRealImage {
        Array2::from_shape_fn((height, width), |(i, j)| {
            let texture = 1.0 + 0.3 * (i as f32 * 0.7).sin() * (j as f32 * 1.3).cos();
            linear_to_db(level * texture)
        })
    }

    #[test]
    fn test_rejects_unsupported_window() {
        let params = CfarParams { pfa: Pfa::Scalar(1e-6), outer_window_size: 35 };
        assert!(matches!(
            GammaCfarDetector::new(params, SolverParams::default()),
            Err(SarError::InvalidWindowSize(35))
        ));
    }

    #[test]
    fn test_solved_multiplier_matches_pfa() {
        let solver = SolverParams::default();
        for &(enl, pfa) in &[(1.0, 1e-6), (4.7, 1e-6), (12.0, 1e-4), (44.0, 1e-6)] {
            let t = solve_multiplier(pfa, enl, &solver);
            assert!((gamma_pfa(t, enl) - pfa).abs() <= 1e-6);
            assert_relative_eq!(gamma_pfa(t, enl), pfa, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_single_look_multiplier_is_log_pfa() {
        // Exponential clutter: Q(1, t) = exp(-t)
        let t = solve_multiplier(1e-6, 1.0, &SolverParams::default());
        assert_relative_eq!(t, -(1e-6f64).ln(), max_relative = 1e-4);
    }

    #[test]
    fn test_enl_excludes_bright_targets() {
        let mut linear = Array2::from_shape_fn((50, 50), |(i, j)| if (i + j) % 2 == 0 { 1.0f32 } else { 3.0 });
        let reference = GammaCfarDetector::estimate_enl(&linear).unwrap();
        linear[[10, 10]] = 1000.0;
        linear[[20, 20]] = f32::NAN;
        let with_target = GammaCfarDetector::estimate_enl(&linear).unwrap();
        // mean 2, variance 1
        assert_relative_eq!(reference, 4.0, max_relative = 1e-9);
        assert_relative_eq!(with_target, 4.0, max_relative = 0.01);
    }

    #[test]
    fn test_enl_of_flat_clutter_is_infinite() {
        let flat = Array2::from_elem((10, 10), 0.5f32);
        let enl = GammaCfarDetector::estimate_enl(&flat).unwrap();
        assert!(enl.is_infinite());

        let empty = Array2::from_elem((10, 10), f32::NAN);
        assert!(matches!(GammaCfarDetector::estimate_enl(&empty), Err(SarError::Processing(_))));
    }

    #[test]
    fn test_undefined_enl_falls_back_to_initial_guess() {
        let solver = SolverParams::default();
        for enl in [f64::INFINITY, f64::NAN, 0.0] {
            assert_eq!(solve_multiplier(1e-6, enl, &solver), solver.initial_guess);
        }
    }

    #[test]
    fn test_flat_clutter_detects_with_initial_guess() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut channel = Array2::from_elem((100, 100), linear_to_db(0.01f32));
        // 4x block is above the fallback multiplier, 2.5x block is below it
        channel.slice_mut(s![30..36, 30..36]).fill(linear_to_db(0.04));
        channel.slice_mut(s![60..66, 60..66]).fill(linear_to_db(0.025));

        let params = CfarParams { pfa: Pfa::Scalar(1e-6), outer_window_size: 29 };
        let detector = GammaCfarDetector::new(params, SolverParams::default()).unwrap();
        let detection = detector.detect(&channel).unwrap();

        assert!(detection.enl.is_infinite());
        assert_eq!(detection.multiplier, GammaMultiplier::Scalar(3.0));
        assert!(detection.outliers.slice(s![30..36, 30..36]).iter().all(|&v| v == 1));
        assert_eq!(detection.outliers.iter().map(|&v| v as usize).sum::<usize>(), 36);
    }

    #[test]
    fn test_mask_shape_and_border() {
        let mut channel = textured_clutter_db(120, 140, 0.01);
        // isolated bright pixels inside the border margin and one in the interior
        for &(i, j) in &[(3, 3), (10, 70), (60, 2), (118, 139), (100, 130), (60, 70)] {
            channel[[i, j]] = linear_to_db(0.2);
        }
        let params = CfarParams { pfa: Pfa::Scalar(1e-6), outer_window_size: 29 };
        let detector = GammaCfarDetector::new(params, SolverParams::default()).unwrap();
        let detection = detector.detect(&channel).unwrap();

        assert_eq!(detection.outliers.dim(), channel.dim());
        assert_eq!(detection.clutter_db.dim(), channel.dim());
        assert_eq!(detection.contrast_db.dim(), channel.dim());
        let margin = 29 - EDGE_MARGIN_REDUCTION;
        for ((i, j), &v) in detection.outliers.indexed_iter() {
            if i < margin || j < margin || i >= 120 - margin || j >= 140 - margin {
                assert_eq!(v, 0, "border pixel ({}, {}) set", i, j);
            }
        }
        assert_eq!(detection.outliers[[60, 70]], 1);
        assert_relative_eq!(
            detection.contrast_db[[60, 70]],
            channel[[60, 70]] - detection.clutter_db[[60, 70]]
        );
    }

    #[test]
    fn test_nan_pixels_never_outliers() {
        let mut channel = textured_clutter_db(80, 80, 0.01);
        channel[[40, 40]] = f32::NAN;
        let params = CfarParams { pfa: Pfa::Scalar(1e-6), outer_window_size: 29 };
        let detector = GammaCfarDetector::new(params, SolverParams::default()).unwrap();
        let detection = detector.detect(&channel).unwrap();
        assert_eq!(detection.outliers[[40, 40]], 0);
        assert!(detection.clutter_db[[40, 40]].is_nan());
    }

    #[test]
    fn test_pfa_grid_solves_each_value() {
        let channel = textured_clutter_db(60, 60, 0.01);
        let grid = Array2::from_shape_fn((60, 60), |(_, j)| if j < 30 { 1e-6 } else { 1e-3 });
        let params = CfarParams { pfa: Pfa::Grid(grid), outer_window_size: 29 };
        let detector = GammaCfarDetector::new(params, SolverParams::default()).unwrap();
        let detection = detector.detect(&channel).unwrap();

        let GammaMultiplier::Grid(multipliers) = &detection.multiplier else {
            panic!("expected a multiplier grid");
        };
        let strict = multipliers[[0, 0]];
        let loose = multipliers[[0, 59]];
        assert!(strict > loose);
        assert!(multipliers.slice(s![.., ..30]).iter().all(|&t| t == strict));
        assert!(multipliers.slice(s![.., 30..]).iter().all(|&t| t == loose));
        assert!((gamma_pfa(strict, detection.enl) - 1e-6).abs() <= 1e-6);
        assert!((gamma_pfa(loose, detection.enl) - 1e-3).abs() <= 1e-6);
    }

    #[test]
    fn test_pfa_grid_shape_mismatch() {
        let channel = textured_clutter_db(60, 60, 0.01);
        let params = CfarParams { pfa: Pfa::Grid(Array2::from_elem((10, 10), 1e-6)), outer_window_size: 29 };
        let detector = GammaCfarDetector::new(params, SolverParams::default()).unwrap();
        assert!(matches!(detector.detect(&channel), Err(SarError::InvalidFormat(_))));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
