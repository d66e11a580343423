//! Threat detection module
//!
//! Converts recent traffic into fixed-length feature vectors and runs a
//! three-detector ensemble over them:
//!
//! - `FeatureExtractor`: temporal/behavioral/packet/statistical/network
//!   feature groups concatenated to a 29-dimension vector
//! - `ThreatDetector`: consensus voting (≥2/3), averaged confidence,
//!   classification, and primary threat-type inference

mod features;
mod ensemble;

pub use ensemble::{
    BayesianPosteriorModel, DetectorModel, DetectorParams, DetectorVote, IsolationScoreModel,
    SequenceReconstructionModel, ThreatDetector, ThreatDetectorStats,
};
pub use features::{FeatureExtractor, FeatureSet};
