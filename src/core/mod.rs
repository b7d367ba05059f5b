//! Core detection and classification modules

pub mod special;
pub mod optimize;
pub mod window_stats;
pub mod cfar;
pub mod geometry;
pub mod polygonize;
pub mod features;
pub mod record;
pub mod area_model;
pub mod classifier;
pub mod merge;

// Re-export main types
pub use window_stats::WindowStatsEngine;
pub use cfar::{CfarParams, ChannelDetection, DualChannelDetection, GammaCfarDetector, GammaMultiplier, Pfa, SolverParams};
pub use geometry::Polygon;
pub use polygonize::{CandidatePolygon, PolygonExtractor, PolygonParams};
pub use features::{CandidateFeatures, FeatureExtractor, RadiometricFeatures, ShapeDescriptors, ShapeParams};
pub use record::IcebergRecord;
pub use area_model::{AreaModels, AreaPredictor, LinearRootLengthModel, RootLengthModel};
pub use classifier::{
    Classification, ClassifierParams, ReferencePopulation, ReferenceSample, ReferenceSet, ReferenceStat,
    StatisticalClassifier, TestOutcome,
};
pub use merge::{ChannelMerger, MergeParams};
