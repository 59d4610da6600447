use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::{ClassTaxonomy, DetectorPort};
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

/// Replays a fixed detection script keyed by frame sequence number.
///
/// Frames without an entry yield no detections. Used for drills, the demo
/// binary and tests; it never looks at pixels.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    classes: ClassTaxonomy,
    frames: BTreeMap<u64, Vec<RawDetection>>,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    classes: Vec<String>,
    #[serde(default)]
    frames: Vec<ScriptFrame>,
}

#[derive(Debug, Deserialize)]
struct ScriptFrame {
    frame: u64,
    #[serde(default)]
    detections: Vec<ScriptDetection>,
}

#[derive(Debug, Deserialize)]
struct ScriptDetection {
    class_id: u32,
    confidence: f32,
    bbox: [f32; 4],
}

impl ScriptedBackend {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes = classes
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (idx as u32, name.into()))
            .collect();
        Self {
            classes,
            frames: BTreeMap::new(),
        }
    }

    /// Append detections for a frame.
    pub fn with_frame(mut self, seq: u64, detections: Vec<RawDetection>) -> Self {
        self.frames.entry(seq).or_default().extend(detections);
        self
    }

    /// Load a JSON replay script.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ScriptFile = serde_json::from_str(raw)?;
        if file.classes.is_empty() {
            return Err(anyhow!("script declares no classes"));
        }
        let class_count = file.classes.len() as u32;
        let mut backend = Self::new(file.classes);
        for entry in file.frames {
            let mut detections = Vec::with_capacity(entry.detections.len());
            for det in entry.detections {
                if det.class_id >= class_count {
                    return Err(anyhow!(
                        "frame {} references class {} but only {} classes are declared",
                        entry.frame,
                        det.class_id,
                        class_count
                    ));
                }
                if !(0.0..=1.0).contains(&det.confidence) {
                    return Err(anyhow!(
                        "frame {} has confidence {} outside [0, 1]",
                        entry.frame,
                        det.confidence
                    ));
                }
                let [x1, y1, x2, y2] = det.bbox;
                detections.push(RawDetection {
                    class_id: det.class_id,
                    confidence: det.confidence,
                    bbox: BoundingBox::new(x1, y1, x2, y2),
                });
            }
            backend = backend.with_frame(entry.frame, detections);
        }
        Ok(backend)
    }
}

impl DetectorPort for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn class_taxonomy(&self) -> &ClassTaxonomy {
        &self.classes
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(self.frames.get(&frame.seq()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "classes": ["fire", "smoke"],
        "frames": [
            { "frame": 2, "detections": [
                { "class_id": 1, "confidence": 0.4, "bbox": [1, 2, 30, 40] }
            ] },
            { "frame": 5, "detections": [
                { "class_id": 0, "confidence": 0.92, "bbox": [10, 10, 60, 60] }
            ] }
        ]
    }"#;

    #[test]
    fn replays_detections_by_frame() -> Result<()> {
        let mut backend = ScriptedBackend::from_json(SCRIPT)?;
        assert_eq!(backend.class_taxonomy().get(&0).map(String::as_str), Some("fire"));

        assert!(backend.detect(&Frame::blank(64, 64, 1))?.is_empty());
        let hits = backend.detect(&Frame::blank(64, 64, 5))?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].class_id, 0);
        assert_eq!(hits[0].bbox, BoundingBox::new(10.0, 10.0, 60.0, 60.0));
        Ok(())
    }

    #[test]
    fn rejects_undeclared_class() {
        let raw = r#"{ "classes": ["fire"], "frames": [
            { "frame": 1, "detections": [ { "class_id": 3, "confidence": 0.5, "bbox": [0,0,1,1] } ] }
        ] }"#;
        let err = ScriptedBackend::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("class 3"));
    }

    #[test]
    fn rejects_empty_class_list() {
        assert!(ScriptedBackend::from_json(r#"{ "classes": [] }"#).is_err());
    }
}
