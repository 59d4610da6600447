//! firewatch
//!
//! Fire, smoke and thermal detection fusion with an incident-evidence policy.
//!
//! # Architecture
//!
//! One synchronous loop per run:
//!
//! 1. A `FrameSource` yields frames with increasing sequence numbers.
//! 2. The primary detector, then the optional thermal detector, return raw
//!    detections for the frame.
//! 3. `FusionEngine` resolves each raw class id to a role through a taxonomy
//!    bound at startup and concatenates primary-then-thermal.
//! 4. Resolved detections are drawn onto the frame.
//! 5. `EventPolicy` decides log records, captures and whether to stop.
//! 6. An `EvidenceStore` appends the log lines and writes capture images.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame buffer
//! - `ingest`: frame sources (synthetic, image directory, V4L2)
//! - `detect`: detector port, backends and model loading
//! - `fusion`: taxonomy binding and per-frame fusion
//! - `policy`: single-shot and continuous evidence policy
//! - `evidence`: log and capture persistence
//! - `render`: box annotation
//! - `pipeline`: the orchestrator, cancellation and run summary
//! - `config`: file and environment configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod evidence;
pub mod frame;
pub mod fusion;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod render;

pub use config::{FirewatchConfig, ModelSettings, PolicyModeKind, PolicySettings};
pub use detect::{
    load_detectors, BoundingBox, ClassRole, Detection, DetectionBatch, DetectorPort,
    DetectorSource, Detectors, RawDetection,
};
pub use error::PipelineError;
pub use evidence::{EvidenceStore, FilesystemEvidenceStore, InMemoryEvidenceStore};
pub use frame::Frame;
pub use fusion::{FusionEngine, MatchKind, TaxonomyPolicy};
pub use ingest::{open_source, FrameSource, SourceSettings};
pub use pipeline::{
    CancelToken, Clock, Orchestrator, PipelineContext, RunSummary, StopReason, SystemClock,
};
pub use policy::{CaptureEvent, EventPolicy, LogRecord, PolicyMode, PolicyStatus};
