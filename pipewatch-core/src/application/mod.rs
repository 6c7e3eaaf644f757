// pipewatch-core/src/application/mod.rs

pub mod audit;
pub mod detector;
pub mod extractor;

// --- RE-EXPORTS (FACADE) ---
// `use pipewatch_core::application::{run_detection, DetectionOptions};`

pub use audit::{DEFAULT_LOG_LIMIT, recent_findings};
pub use detector::{
    DetectionOptions, EntityOutcome, EntityPhase, EntityReport, RunReport, run_detection,
};
pub use extractor::extract;
