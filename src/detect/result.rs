use std::fmt;

use serde::{Deserialize, Serialize};

/// Which detector produced a detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorSource {
    Primary,
    Thermal,
}

impl fmt::Display for DetectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorSource::Primary => f.write_str("primary"),
            DetectorSource::Thermal => f.write_str("thermal"),
        }
    }
}

/// Canonical semantic category a raw model label resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRole {
    Fire,
    Smoke,
    Thermal,
    Unknown,
}

impl ClassRole {
    /// Name used in log lines and capture keys.
    pub fn display_name(self) -> &'static str {
        match self {
            ClassRole::Fire => "Fire",
            ClassRole::Smoke => "Smoke",
            ClassRole::Thermal => "Thermal",
            ClassRole::Unknown => "Unknown",
        }
    }

    pub fn is_resolved(self) -> bool {
        self != ClassRole::Unknown
    }
}

impl fmt::Display for ClassRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union; 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        inter / union
    }
}

/// Detection as reported by a model, before taxonomy resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Normalized detection. Confidence is clamped into [0, 1] at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    class_label: String,
    class_role: ClassRole,
    confidence: f32,
    bbox: BoundingBox,
    source: DetectorSource,
}

impl Detection {
    pub fn new(
        class_label: impl Into<String>,
        class_role: ClassRole,
        confidence: f32,
        bbox: BoundingBox,
        source: DetectorSource,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            class_label: class_label.into(),
            class_role,
            confidence,
            bbox,
            source,
        }
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn class_role(&self) -> ClassRole {
        self.class_role
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn confidence_percent(&self) -> u8 {
        confidence_percent(self.confidence)
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn source(&self) -> DetectorSource {
        self.source
    }
}

/// `floor(confidence * 100)`, saturated into 0..=100.
pub fn confidence_percent(confidence: f32) -> u8 {
    if !confidence.is_finite() {
        return 0;
    }
    let scaled = (f64::from(confidence) * 100.0).floor();
    scaled.clamp(0.0, 100.0) as u8
}

/// All detections for one frame, primary detector first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    frame_seq: u64,
    detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(frame_seq: u64, detections: Vec<Detection>) -> Self {
        Self {
            frame_seq,
            detections,
        }
    }

    pub fn frame_seq(&self) -> u64 {
        self.frame_seq
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    /// First detection whose role is not UNKNOWN.
    pub fn first_resolved(&self) -> Option<&Detection> {
        self.detections.iter().find(|d| d.class_role().is_resolved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(10.0, 10.0, 50.0, 40.0)
    }

    #[test]
    fn confidence_percent_floors() {
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(0.799), 79);
        assert_eq!(confidence_percent(0.8), 80);
        assert_eq!(confidence_percent(0.92), 92);
        assert_eq!(confidence_percent(0.999), 99);
        assert_eq!(confidence_percent(1.0), 100);
    }

    #[test]
    fn confidence_percent_stays_in_range() {
        let mut c = 0.0f32;
        while c <= 1.0 {
            let pct = confidence_percent(c);
            assert!(pct <= 100);
            assert_eq!(u32::from(pct), (f64::from(c) * 100.0).floor() as u32);
            c += 0.0137;
        }
        assert_eq!(confidence_percent(f32::NAN), 0);
    }

    #[test]
    fn detection_clamps_confidence() {
        let high = Detection::new("fire", ClassRole::Fire, 1.7, bbox(), DetectorSource::Primary);
        assert_eq!(high.confidence(), 1.0);
        assert_eq!(high.confidence_percent(), 100);

        let low = Detection::new("fire", ClassRole::Fire, -0.2, bbox(), DetectorSource::Primary);
        assert_eq!(low.confidence(), 0.0);

        let nan = Detection::new("fire", ClassRole::Fire, f32::NAN, bbox(), DetectorSource::Primary);
        assert_eq!(nan.confidence(), 0.0);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = bbox();
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let far = BoundingBox::new(100.0, 100.0, 120.0, 120.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn first_resolved_skips_unknown() {
        let batch = DetectionBatch::new(
            1,
            vec![
                Detection::new("class_7", ClassRole::Unknown, 0.9, bbox(), DetectorSource::Primary),
                Detection::new("smoke", ClassRole::Smoke, 0.3, bbox(), DetectorSource::Primary),
            ],
        );
        assert_eq!(batch.first_resolved().map(|d| d.class_role()), Some(ClassRole::Smoke));
    }
}
