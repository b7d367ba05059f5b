//! bergscan: iceberg detection, area retrieval and classification for
//! dual-polarisation (HH/HV) SAR scenes
//!
//! A gamma-distribution CFAR flags bright outliers against their local sea-ice
//! or open-water background. Connected outliers become candidate polygons,
//! which are measured, given a regression-based area estimate and tested
//! against a reference population of confirmed icebergs. Detections from the
//! two channels are finally merged into one collection.

pub mod types;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    CoordinateSystem, GeoTransform, Polarization, SarError, SarMask, SarReal, SarRealImage, SarResult, SceneRaster,
};

pub use crate::core::{
    AreaModels, CfarParams, ClassifierParams, GammaCfarDetector, IcebergRecord, MergeParams, Pfa, PolygonParams,
    ReferencePopulation, ReferenceSet, RootLengthModel, ShapeParams, SolverParams,
};
pub use pipeline::{IcebergPipeline, PipelineConfig, PipelineOutput};
