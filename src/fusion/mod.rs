//! Per-frame detection fusion.
//!
//! Raw detections from each detector are resolved through that detector's
//! bound taxonomy and concatenated primary-then-thermal, preserving each
//! detector's own order. Fusion is a pure function of its inputs.

mod taxonomy;

pub use taxonomy::{BoundTaxonomy, LabelResolver, MatchKind, RoleRule, TaxonomyPolicy};

use crate::detect::{DetectionBatch, DetectorSource, Detectors, RawDetection};
use crate::error::PipelineError;

pub struct FusionEngine {
    primary: BoundTaxonomy,
    thermal: Option<BoundTaxonomy>,
}

impl FusionEngine {
    pub fn new(primary: BoundTaxonomy, thermal: Option<BoundTaxonomy>) -> Self {
        Self { primary, thermal }
    }

    /// Bind both policies against the loaded detectors' class lists.
    pub fn bind(
        detectors: &Detectors,
        primary: &TaxonomyPolicy,
        thermal: &TaxonomyPolicy,
    ) -> Result<Self, PipelineError> {
        let primary = compile(DetectorSource::Primary, primary)?
            .bind(DetectorSource::Primary, detectors.primary.class_taxonomy())?;
        let thermal = match detectors.thermal.as_ref() {
            Some(detector) => Some(
                compile(DetectorSource::Thermal, thermal)?
                    .bind(DetectorSource::Thermal, detector.class_taxonomy())?,
            ),
            None => None,
        };
        Ok(Self::new(primary, thermal))
    }

    pub fn has_thermal(&self) -> bool {
        self.thermal.is_some()
    }

    /// Merge one frame's raw detections into a batch.
    ///
    /// Thermal detections are dropped when no thermal taxonomy is bound.
    pub fn fuse(
        &self,
        frame_seq: u64,
        primary: &[RawDetection],
        thermal: Option<&[RawDetection]>,
    ) -> DetectionBatch {
        let mut detections: Vec<_> = primary.iter().map(|raw| self.primary.resolve(raw)).collect();
        match (self.thermal.as_ref(), thermal) {
            (Some(taxonomy), Some(raw)) => {
                detections.extend(raw.iter().map(|raw| taxonomy.resolve(raw)));
            }
            (None, Some(raw)) if !raw.is_empty() => {
                log::debug!(
                    "frame {}: dropping {} thermal detections with no thermal taxonomy",
                    frame_seq,
                    raw.len()
                );
            }
            _ => {}
        }
        DetectionBatch::new(frame_seq, detections)
    }
}

fn compile(source: DetectorSource, policy: &TaxonomyPolicy) -> Result<LabelResolver, PipelineError> {
    policy.compile().map_err(|reason| PipelineError::Taxonomy {
        role: source,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ClassRole, ClassTaxonomy};

    fn taxonomy(labels: &[&str]) -> ClassTaxonomy {
        labels
            .iter()
            .enumerate()
            .map(|(idx, l)| (idx as u32, l.to_string()))
            .collect()
    }

    fn engine() -> FusionEngine {
        let primary = TaxonomyPolicy::default_primary()
            .compile()
            .unwrap()
            .bind(DetectorSource::Primary, &taxonomy(&["fire", "smoke", "person"]))
            .unwrap();
        let thermal = TaxonomyPolicy::default_thermal()
            .compile()
            .unwrap()
            .bind(DetectorSource::Thermal, &taxonomy(&["fire_thermal"]))
            .unwrap();
        FusionEngine::new(primary, Some(thermal))
    }

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(5.0, 5.0, 25.0, 25.0),
        }
    }

    #[test]
    fn concatenates_primary_then_thermal_in_order() {
        let batch = engine().fuse(
            7,
            &[raw(1, 0.4), raw(0, 0.85), raw(2, 0.9)],
            Some(&[raw(0, 0.5)]),
        );
        assert_eq!(batch.frame_seq(), 7);
        let roles: Vec<_> = batch.iter().map(|d| d.class_role()).collect();
        assert_eq!(
            roles,
            vec![ClassRole::Smoke, ClassRole::Fire, ClassRole::Unknown, ClassRole::Thermal]
        );
        let sources: Vec<_> = batch.iter().map(|d| d.source()).collect();
        assert_eq!(
            sources,
            vec![
                DetectorSource::Primary,
                DetectorSource::Primary,
                DetectorSource::Primary,
                DetectorSource::Thermal
            ]
        );
    }

    #[test]
    fn fusion_is_deterministic() {
        let engine = engine();
        let primary = [raw(0, 0.3), raw(2, 0.6), raw(1, 0.99)];
        let thermal = [raw(0, 0.1), raw(4, 0.8)];
        let first = engine.fuse(3, &primary, Some(&thermal));
        for _ in 0..10 {
            assert_eq!(engine.fuse(3, &primary, Some(&thermal)), first);
        }
    }

    #[test]
    fn thermal_without_taxonomy_is_dropped() {
        let primary = TaxonomyPolicy::default_primary()
            .compile()
            .unwrap()
            .bind(DetectorSource::Primary, &taxonomy(&["fire"]))
            .unwrap();
        let engine = FusionEngine::new(primary, None);
        assert!(!engine.has_thermal());
        let batch = engine.fuse(1, &[raw(0, 0.9)], Some(&[raw(0, 0.9)]));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn empty_inputs_give_empty_batch() {
        let batch = engine().fuse(1, &[], None);
        assert!(batch.is_empty());
    }
}
