//! Detector loading from already-resolved model paths.
//!
//! Paths are chosen by configuration before the pipeline starts; nothing here
//! scans directories. The backend is picked from the file extension:
//! - `.json`: scripted replay
//! - `.onnx`: tract (feature: backend-tract)

use std::path::Path;

use crate::config::ModelSettings;
use crate::detect::backend::DetectorPort;
use crate::detect::backends::ScriptedBackend;
use crate::detect::result::DetectorSource;
use crate::error::PipelineError;

/// The two model roles. The thermal detector is optional for the whole run.
pub struct Detectors {
    pub primary: Box<dyn DetectorPort>,
    pub thermal: Option<Box<dyn DetectorPort>>,
}

/// Load the primary (required) and thermal (optional) detectors.
///
/// A missing primary path is `ModelPathMissing`. A thermal path that is not
/// configured, or points at a file that does not exist, disables the thermal
/// branch with a warning. Any model that exists but fails to load is fatal.
pub fn load_detectors(
    primary: Option<&ModelSettings>,
    thermal: Option<&ModelSettings>,
) -> Result<Detectors, PipelineError> {
    let primary = primary.ok_or(PipelineError::ModelPathMissing {
        role: DetectorSource::Primary,
    })?;
    let primary = load_detector(DetectorSource::Primary, primary)?;

    let thermal = match thermal {
        Some(settings) if !settings.path.exists() => {
            log::warn!(
                "thermal model {} not found; thermal detection disabled for this run",
                settings.path.display()
            );
            None
        }
        Some(settings) => Some(load_detector(DetectorSource::Thermal, settings)?),
        None => {
            log::info!("no thermal model configured; thermal detection disabled");
            None
        }
    };

    Ok(Detectors { primary, thermal })
}

/// Load one detector and run its warm-up hook.
pub fn load_detector(
    role: DetectorSource,
    settings: &ModelSettings,
) -> Result<Box<dyn DetectorPort>, PipelineError> {
    let path = settings.path.as_path();
    let load_err = |reason: String| PipelineError::ModelLoad {
        role,
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_file() {
        return Err(load_err("file does not exist".to_string()));
    }

    let mut detector: Box<dyn DetectorPort> = match extension(path).as_deref() {
        Some("json") => {
            let backend = ScriptedBackend::from_path(path)
                .map_err(|e| load_err(crate::error::chain(&e)))?;
            Box::new(backend)
        }
        Some("onnx") => load_onnx(role, settings)?,
        other => {
            return Err(load_err(format!(
                "unsupported model format {}",
                other.unwrap_or("<none>")
            )))
        }
    };

    detector
        .warm_up()
        .map_err(|e| load_err(format!("warm-up failed: {}", crate::error::chain(&e))))?;

    log::info!(
        "{} model loaded from {} (backend={}, classes={:?})",
        role,
        path.display(),
        detector.name(),
        detector.class_taxonomy().values().collect::<Vec<_>>()
    );
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(
    role: DetectorSource,
    settings: &ModelSettings,
) -> Result<Box<dyn DetectorPort>, PipelineError> {
    use crate::detect::backends::TractBackend;

    let classes = settings
        .classes
        .iter()
        .enumerate()
        .map(|(idx, name)| (idx as u32, name.clone()))
        .collect();
    let backend = TractBackend::new(&settings.path, classes, settings.input_size)
        .map_err(|e| PipelineError::ModelLoad {
            role,
            path: settings.path.clone(),
            reason: crate::error::chain(&e),
        })?
        .with_thresholds(settings.confidence_threshold, settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(
    role: DetectorSource,
    settings: &ModelSettings,
) -> Result<Box<dyn DetectorPort>, PipelineError> {
    Err(PipelineError::ModelLoad {
        role,
        path: settings.path.clone(),
        reason: "ONNX models require the backend-tract feature".to_string(),
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
