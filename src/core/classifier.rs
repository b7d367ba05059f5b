//! Statistical iceberg / false-alarm classification
//!
//! Each candidate is compared against a population of confirmed icebergs
//! seen in the same channel. Three deviations are standardized, squared and
//! mapped through the chi-square(1) survival function; a candidate is an
//! iceberg only if all three survival probabilities reach their thresholds.

use crate::core::record::IcebergRecord;
use crate::core::special::chi_square_sf;
use crate::types::Polarization;
use serde::{Deserialize, Serialize};

/// Classifier thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Reference samples with incidence in [ia - w, ia + w) enter the backscatter test
    pub ia_half_width: f64,
    pub backscatter_min_p: f64,
    pub compactness_min_p: f64,
    pub elongation_min_p: f64,
    /// Bound on the one-sided standardized deviation before squaring
    pub max_deviation: f64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            ia_half_width: 2.0,
            backscatter_min_p: 0.05,
            compactness_min_p: 0.005,
            elongation_min_p: 0.005,
            max_deviation: 10.0,
        }
    }
}

/// One confirmed iceberg measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub hh_mean: f64,
    pub hv_mean: f64,
    pub ia_mean: f64,
    pub perimeter_index: f64,
    pub length_root_area_ratio: f64,
}

impl ReferenceSample {
    pub fn backscatter(&self, pol: Polarization) -> f64 {
        match pol {
            Polarization::HH => self.hh_mean,
            Polarization::HV => self.hv_mean,
        }
    }
}

/// Mean and population standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStat {
    pub mean: f64,
    pub std: f64,
}

impl ReferenceStat {
    /// NaN statistics for an empty sample
    pub fn from_values(values: impl Iterator<Item = f64> + Clone) -> Self {
        let n = values.clone().count();
        if n == 0 {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let mean = values.clone().sum::<f64>() / n as f64;
        let variance = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }

    /// (x - mean) / std, NaN when the spread is zero or undefined
    pub fn standardize(&self, x: f64) -> f64 {
        if !(self.std > 0.0) || !self.std.is_finite() {
            return f64::NAN;
        }
        (x - self.mean) / self.std
    }
}

/// Confirmed icebergs of one detection channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePopulation {
    pub samples: Vec<ReferenceSample>,
    pub perimeter_index: ReferenceStat,
    pub length_root_area_ratio: ReferenceStat,
}

impl ReferencePopulation {
    /// Shape statistics computed from the samples
    pub fn new(samples: Vec<ReferenceSample>) -> Self {
        let perimeter_index = ReferenceStat::from_values(samples.iter().map(|s| s.perimeter_index));
        let length_root_area_ratio = ReferenceStat::from_values(samples.iter().map(|s| s.length_root_area_ratio));
        Self {
            samples,
            perimeter_index,
            length_root_area_ratio,
        }
    }

    /// Samples with externally calibrated shape statistics
    pub fn with_shape_stats(
        samples: Vec<ReferenceSample>,
        perimeter_index: ReferenceStat,
        length_root_area_ratio: ReferenceStat,
    ) -> Self {
        Self {
            samples,
            perimeter_index,
            length_root_area_ratio,
        }
    }

    /// Backscatter statistics of the samples with incidence in [ia - half_width, ia + half_width)
    pub fn backscatter_near(&self, pol: Polarization, ia: f64, half_width: f64) -> ReferenceStat {
        let (low, high) = (ia - half_width, ia + half_width);
        ReferenceStat::from_values(
            self.samples
                .iter()
                .filter(move |s| s.ia_mean >= low && s.ia_mean < high)
                .map(move |s| s.backscatter(pol)),
        )
    }
}

/// Reference populations for both channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub hh: ReferencePopulation,
    pub hv: ReferencePopulation,
}

impl ReferenceSet {
    pub fn for_polarization(&self, pol: Polarization) -> &ReferencePopulation {
        match pol {
            Polarization::HH => &self.hh,
            Polarization::HV => &self.hv,
        }
    }
}

/// Result of one chi-square test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Standardized deviation after clipping
    pub deviation: f64,
    /// Squared deviation
    pub score: f64,
    /// chi-square(1) survival probability of the score
    pub probability: f64,
    pub passed: bool,
}

impl TestOutcome {
    fn from_deviation(deviation: f64, min_probability: f64) -> Self {
        let score = deviation * deviation;
        let probability = chi_square_sf(score, 1.0);
        Self {
            deviation,
            score,
            probability,
            // NaN never passes
            passed: probability >= min_probability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub backscatter: TestOutcome,
    pub compactness: TestOutcome,
    pub elongation: TestOutcome,
    pub is_iceberg: bool,
}

pub struct StatisticalClassifier<'a> {
    params: ClassifierParams,
    references: &'a ReferenceSet,
}

impl<'a> StatisticalClassifier<'a> {
    pub fn new(params: ClassifierParams, references: &'a ReferenceSet) -> Self {
        Self { params, references }
    }

    /// Attach a classification to every record of one channel
    pub fn classify(&self, pol: Polarization, records: Vec<IcebergRecord>) -> Vec<IcebergRecord> {
        let classify_record = |mut record: IcebergRecord| {
            record.classification = Some(self.classify_one(pol, &record));
            record
        };

        #[cfg(feature = "parallel")]
        let classified: Vec<IcebergRecord> = {
            use rayon::prelude::*;
            records.into_par_iter().map(classify_record).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let classified: Vec<IcebergRecord> = records.into_iter().map(classify_record).collect();

        log::info!(
            "{} - {} of {} candidates classified as icebergs",
            pol,
            classified.iter().filter(|r| r.is_iceberg()).count(),
            classified.len()
        );
        classified
    }

    pub fn classify_one(&self, pol: Polarization, record: &IcebergRecord) -> Classification {
        let reference = self.references.for_polarization(pol);
        let one_sided = |z: f64| z.clamp(-self.params.max_deviation, 0.0);

        let backscatter_stat = reference.backscatter_near(pol, record.radiometry.ia_mean, self.params.ia_half_width);
        let backscatter = TestOutcome::from_deviation(
            one_sided(backscatter_stat.standardize(record.radiometry.backscatter(pol))),
            self.params.backscatter_min_p,
        );
        let compactness = TestOutcome::from_deviation(
            one_sided(reference.perimeter_index.standardize(record.shape.perimeter_index)),
            self.params.compactness_min_p,
        );
        let elongation = TestOutcome::from_deviation(
            reference
                .length_root_area_ratio
                .standardize(record.shape.length_root_area_ratio)
                .abs(),
            self.params.elongation_min_p,
        );

        Classification {
            is_iceberg: backscatter.passed && compactness.passed && elongation.passed,
            backscatter,
            compactness,
            elongation,
        }
    }
}
