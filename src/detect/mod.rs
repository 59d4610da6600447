mod backend;
pub mod backends;
mod loader;
mod result;

pub use backend::{ClassTaxonomy, DetectorPort};
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use loader::{load_detector, load_detectors, Detectors};
pub use result::{
    confidence_percent, BoundingBox, ClassRole, Detection, DetectionBatch, DetectorSource,
    RawDetection,
};
