//! Scene-level orchestration of detection, measurement and classification

use crate::core::area_model::{AreaModels, AreaPredictor};
use crate::core::cfar::{CfarParams, GammaCfarDetector, SolverParams};
use crate::core::classifier::{ClassifierParams, ReferenceSet, StatisticalClassifier};
use crate::core::features::{FeatureExtractor, ShapeParams};
use crate::core::merge::{ChannelMerger, MergeParams};
use crate::core::polygonize::{PolygonExtractor, PolygonParams};
use crate::core::record::IcebergRecord;
use crate::types::{CoordinateSystem, Polarization, SarError, SarResult, SceneRaster};
use serde::{Deserialize, Serialize};

/// Complete processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub cfar: CfarParams,
    pub solver: SolverParams,
    pub polygons: PolygonParams,
    pub shape: ShapeParams,
    pub classifier: ClassifierParams,
    pub merge: MergeParams,
    /// Worker threads for the parallel stages
    pub workers: usize,
    /// Pixels below this incidence angle (degrees) are treated as no-data
    pub min_incidence_angle: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cfar: CfarParams::default(),
            solver: SolverParams::default(),
            polygons: PolygonParams::default(),
            shape: ShapeParams::default(),
            classifier: ClassifierParams::default(),
            merge: MergeParams::default(),
            workers: 4,
            min_incidence_angle: 19.6,
        }
    }
}

/// Per-channel and merged detections of one scene
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub crs: CoordinateSystem,
    /// `None` when the channel had no candidate
    pub hh: Option<Vec<IcebergRecord>>,
    pub hv: Option<Vec<IcebergRecord>>,
    /// `None` only when both channels had no candidate
    pub merged: Option<Vec<IcebergRecord>>,
}

impl PipelineOutput {
    pub fn channel(&self, pol: Polarization) -> Option<&[IcebergRecord]> {
        match pol {
            Polarization::HH => self.hh.as_deref(),
            Polarization::HV => self.hv.as_deref(),
        }
    }
}

/// Iceberg detection and area retrieval for dual-pol scenes
pub struct IcebergPipeline {
    config: PipelineConfig,
    models: AreaModels,
    references: ReferenceSet,
}

impl IcebergPipeline {
    pub fn new(config: PipelineConfig, models: AreaModels, references: ReferenceSet) -> Self {
        Self {
            config,
            models,
            references,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full chain on a scene, on a dedicated worker pool
    pub fn run(&self, scene: &SceneRaster) -> SarResult<PipelineOutput> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| SarError::Processing(format!("Failed to build worker pool: {}", e)))?;
        pool.install(|| self.run_scene(scene))
    }

    fn run_scene(&self, scene: &SceneRaster) -> SarResult<PipelineOutput> {
        let (height, width) = scene.dim();
        log::info!("Processing {}x{} scene with {} workers", height, width, self.config.workers);
        let scene = scene.masked_below_incidence(self.config.min_incidence_angle);

        let detector = GammaCfarDetector::new(self.config.cfar.clone(), self.config.solver)?;
        log::info!("Running CFAR");
        let detection = detector.detect_dual(&scene.hh, &scene.hv)?;

        let extractor = PolygonExtractor::new(self.config.polygons);
        let features = FeatureExtractor::new(self.config.shape);
        let predictor = AreaPredictor::new(&self.models);
        let classifier = StatisticalClassifier::new(self.config.classifier, &self.references);

        let mut channels: Vec<Option<Vec<IcebergRecord>>> = Vec::with_capacity(2);
        for pol in Polarization::ALL {
            let candidates = extractor.extract(&detection.channel(pol).outliers, &scene.geo_transform)?;
            if candidates.is_empty() {
                log::info!("{} - No candidates, skipping channel", pol);
                channels.push(None);
                continue;
            }

            log::info!("{} - Extracting statistics", pol);
            let measured = features.extract(candidates, &scene, &detection)?;
            log::info!("{} - Predicting area", pol);
            let records = predictor.predict(pol, measured)?;
            log::info!("{} - Classifying icebergs", pol);
            channels.push(Some(classifier.classify(pol, records)));
        }
        let hv = channels.pop().flatten();
        let hh = channels.pop().flatten();

        log::info!("Merging channels");
        let merged = match (&hh, &hv) {
            (None, None) => None,
            _ => {
                let merger = ChannelMerger::new(self.config.merge);
                Some(merger.merge(hh.clone().unwrap_or_default(), hv.clone().unwrap_or_default()))
            }
        };

        log::info!("Finished iceberg detection and area retrieval");
        Ok(PipelineOutput {
            crs: scene.crs.clone(),
            hh,
            hv,
            merged,
        })
    }
}
