pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::detect::result::RawDetection;

/// Greedy per-class non-maximum suppression, highest confidence first.
#[cfg_attr(not(feature = "backend-tract"), allow(dead_code))]
pub(crate) fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn raw(class_id: u32, confidence: f32, x: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(x, 0.0, x + 10.0, 10.0),
        }
    }

    #[test]
    fn suppresses_overlapping_same_class() {
        let kept = non_max_suppression(vec![raw(0, 0.6, 1.0), raw(0, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn keeps_overlapping_boxes_of_different_classes() {
        let kept = non_max_suppression(vec![raw(0, 0.6, 0.0), raw(1, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn keeps_disjoint_boxes() {
        let kept = non_max_suppression(vec![raw(0, 0.6, 0.0), raw(0, 0.9, 50.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }
}
