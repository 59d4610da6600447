//! Fatal pipeline errors.
//!
//! Every variant names the component that failed and why. Nothing here is
//! retried: a failing camera or model ends the run so the operator sees it.

use std::path::PathBuf;

use thiserror::Error;

use crate::detect::DetectorSource;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame source {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("frame source {device} failed while reading frame {frame}: {reason}")]
    FrameRead {
        device: String,
        frame: u64,
        reason: String,
    },

    #[error("no {role} model path configured")]
    ModelPathMissing { role: DetectorSource },

    #[error("failed to load {role} model {}: {reason}", path.display())]
    ModelLoad {
        role: DetectorSource,
        path: PathBuf,
        reason: String,
    },

    #[error("{role} taxonomy rejected: {reason}")]
    Taxonomy { role: DetectorSource, reason: String },

    #[error("{role} detector failed on frame {frame}: {reason}")]
    Inference {
        role: DetectorSource,
        frame: u64,
        reason: String,
    },

    #[error("evidence store failed: {0}")]
    Evidence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Component label used when reporting to the operator.
    pub fn component(&self) -> &'static str {
        match self {
            PipelineError::DeviceUnavailable { .. } | PipelineError::FrameRead { .. } => {
                "frame-source"
            }
            PipelineError::ModelPathMissing { .. } | PipelineError::ModelLoad { .. } => {
                "model-loader"
            }
            PipelineError::Taxonomy { .. } => "fusion",
            PipelineError::Inference { .. } => "detector",
            PipelineError::Evidence(_) => "evidence-store",
            PipelineError::Config(_) => "config",
        }
    }
}

/// Render an error chain on one line, `outer: inner: root`.
pub(crate) fn chain(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_error_names_detector_and_frame() {
        let err = PipelineError::Inference {
            role: DetectorSource::Thermal,
            frame: 3,
            reason: "tensor shape mismatch".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("thermal"));
        assert!(msg.contains("frame 3"));
        assert!(msg.contains("tensor shape mismatch"));
        assert_eq!(err.component(), "detector");
    }

    #[test]
    fn model_path_missing_is_a_loader_failure() {
        let err = PipelineError::ModelPathMissing {
            role: DetectorSource::Primary,
        };
        assert_eq!(err.to_string(), "no primary model path configured");
        assert_eq!(err.component(), "model-loader");
    }

    #[test]
    fn chain_flattens_context() {
        let err = anyhow::anyhow!("root cause").context("outer");
        assert_eq!(chain(&err), "outer: root cause");
    }
}
