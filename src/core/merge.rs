use crate::core::record::IcebergRecord;
use serde::{Deserialize, Serialize};

/// Cross-channel merge parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MergeParams {
    /// HH and HV detections closer than this (map units) describe the same object
    pub search_distance: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            search_distance: 20.0,
        }
    }
}

/// Resolves duplicate HH/HV detections of the same object
pub struct ChannelMerger {
    params: MergeParams,
}

impl ChannelMerger {
    pub fn new(params: MergeParams) -> Self {
        Self { params }
    }

    /// Merge classified HH and HV records into one collection
    ///
    /// Each HH record competes with the HV records still present within the
    /// search distance; only the member with the largest CFAR area survives,
    /// with ties going to HH. Surviving HH records come first, then HV, and
    /// the result is re-indexed.
    pub fn merge(&self, hh: Vec<IcebergRecord>, hv: Vec<IcebergRecord>) -> Vec<IcebergRecord> {
        if hh.is_empty() || hv.is_empty() {
            return reindex(hh.into_iter().chain(hv).collect());
        }

        let mut hh_alive = vec![true; hh.len()];
        let mut hv_alive = vec![true; hv.len()];

        for (i, hh_record) in hh.iter().enumerate() {
            let near: Vec<usize> = (0..hv.len())
                .filter(|&j| hv_alive[j])
                .filter(|&j| {
                    hh_record
                        .geometry
                        .within_distance(&hv[j].geometry, self.params.search_distance)
                })
                .collect();
            if near.is_empty() {
                continue;
            }

            // First maximum, NaN areas never win
            let (largest, largest_area) = near.iter().fold((near[0], f64::NAN), |(best, best_area), &j| {
                let area = hv[j].cfar_area;
                if area > best_area || (best_area.is_nan() && !area.is_nan()) {
                    (j, area)
                } else {
                    (best, best_area)
                }
            });

            if largest_area > hh_record.cfar_area {
                hh_alive[i] = false;
                for &j in near.iter().filter(|&&j| j != largest) {
                    hv_alive[j] = false;
                }
            } else {
                for &j in &near {
                    hv_alive[j] = false;
                }
            }
        }

        let survivors: Vec<IcebergRecord> = hh
            .into_iter()
            .zip(hh_alive)
            .chain(hv.into_iter().zip(hv_alive))
            .filter_map(|(record, alive)| alive.then_some(record))
            .collect();
        log::info!("Merged channels into {} records", survivors.len());
        reindex(survivors)
    }
}

fn reindex(mut records: Vec<IcebergRecord>) -> Vec<IcebergRecord> {
    for (index, record) in records.iter_mut().enumerate() {
        record.index = index;
    }
    records
}
