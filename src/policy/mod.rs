//! Event/capture policy.
//!
//! `EventPolicy` is the only component with memory across frames. It runs in
//! one of two modes:
//!
//! - **Single-shot**: the first batch holding any resolved detection produces
//!   one capture of the current frame and stops the run.
//! - **Continuous**: every detection is logged; each detection at or above the
//!   critical threshold is captured. Captures are not deduplicated unless a
//!   cooldown is configured explicitly.
//!
//! States are `Running` and `Stopped`. Once stopped, evaluation is a no-op.

mod record;

pub use record::{CaptureEvent, LogRecord, CRITICAL_REMARK, TIMESTAMP_FORMAT};

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::detect::{ClassRole, Detection, DetectionBatch};
use crate::frame::Frame;

pub const DEFAULT_CRITICAL_THRESHOLD: u8 = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyMode {
    SingleShot,
    Continuous {
        critical_threshold: u8,
        /// Minimum spacing between captures of one role. `None` captures
        /// every critical detection.
        cooldown: Option<Duration>,
    },
}

impl PolicyMode {
    pub fn continuous() -> Self {
        PolicyMode::Continuous {
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            cooldown: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyStatus {
    Running,
    Stopped,
}

/// Cross-frame memory of the policy.
#[derive(Clone, Debug, Default)]
pub struct PolicyState {
    pub has_captured_any: bool,
    pub last_capture_by_role: HashMap<ClassRole, DateTime<Local>>,
    pub stop_requested: bool,
}

/// What the orchestrator must do for one batch.
#[derive(Debug, Default)]
pub struct Verdict {
    pub log_records: Vec<LogRecord>,
    pub captures: Vec<CaptureEvent>,
    /// Critical detections whose capture was withheld by the cooldown.
    pub suppressed: usize,
    pub stop: bool,
}

impl Verdict {
    pub fn is_empty(&self) -> bool {
        self.log_records.is_empty() && self.captures.is_empty() && !self.stop
    }
}

pub struct EventPolicy {
    mode: PolicyMode,
    status: PolicyStatus,
    state: PolicyState,
}

impl EventPolicy {
    pub fn new(mode: PolicyMode) -> Self {
        Self {
            mode,
            status: PolicyStatus::Running,
            state: PolicyState::default(),
        }
    }

    pub fn single_shot() -> Self {
        Self::new(PolicyMode::SingleShot)
    }

    pub fn continuous(critical_threshold: u8) -> Self {
        Self::new(PolicyMode::Continuous {
            critical_threshold,
            cooldown: None,
        })
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn status(&self) -> PolicyStatus {
        self.status
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    /// External cancellation.
    pub fn cancel(&mut self) {
        self.status = PolicyStatus::Stopped;
    }

    /// Decide logs, captures and stop for one frame's batch.
    ///
    /// `frame` is the (annotated) frame the batch was computed from; it is
    /// cloned into any capture.
    pub fn evaluate(
        &mut self,
        batch: &DetectionBatch,
        frame: &Frame,
        now: DateTime<Local>,
    ) -> Verdict {
        if self.status == PolicyStatus::Stopped {
            return Verdict::default();
        }
        if batch.frame_seq() != frame.seq() {
            log::warn!(
                "batch for frame {} evaluated against frame {}; ignoring",
                batch.frame_seq(),
                frame.seq()
            );
            return Verdict::default();
        }

        match self.mode {
            PolicyMode::SingleShot => self.evaluate_single_shot(batch, frame, now),
            PolicyMode::Continuous {
                critical_threshold,
                cooldown,
            } => self.evaluate_continuous(batch, frame, now, critical_threshold, cooldown),
        }
    }

    fn evaluate_single_shot(
        &mut self,
        batch: &DetectionBatch,
        frame: &Frame,
        now: DateTime<Local>,
    ) -> Verdict {
        let Some(detection) = batch.first_resolved() else {
            return Verdict::default();
        };

        let capture = self.capture(detection, frame, now);
        self.state.stop_requested = true;
        self.status = PolicyStatus::Stopped;
        Verdict {
            captures: vec![capture],
            stop: true,
            ..Verdict::default()
        }
    }

    fn evaluate_continuous(
        &mut self,
        batch: &DetectionBatch,
        frame: &Frame,
        now: DateTime<Local>,
        critical_threshold: u8,
        cooldown: Option<Duration>,
    ) -> Verdict {
        let mut verdict = Verdict::default();
        for detection in batch.iter() {
            let pct = detection.confidence_percent();
            let critical = detection.class_role().is_resolved() && pct >= critical_threshold;

            verdict.log_records.push(LogRecord {
                timestamp: now,
                class_role: detection.class_role(),
                confidence_percent: pct,
                remark: if critical {
                    CRITICAL_REMARK.to_string()
                } else {
                    String::new()
                },
            });

            if !critical {
                continue;
            }
            if self.cooling_down(detection.class_role(), now, cooldown) {
                log::info!(
                    "frame {}: {} {} capture withheld by cooldown",
                    batch.frame_seq(),
                    detection.class_role(),
                    pct
                );
                verdict.suppressed += 1;
                continue;
            }
            let capture = self.capture(detection, frame, now);
            verdict.captures.push(capture);
        }
        verdict
    }

    fn cooling_down(
        &self,
        role: ClassRole,
        now: DateTime<Local>,
        cooldown: Option<Duration>,
    ) -> bool {
        let Some(cooldown) = cooldown else {
            return false;
        };
        let Some(last) = self.state.last_capture_by_role.get(&role) else {
            return false;
        };
        match (now - *last).to_std() {
            Ok(elapsed) => elapsed < cooldown,
            // Clock went backwards; treat as inside the window.
            Err(_) => true,
        }
    }

    fn capture(&mut self, detection: &Detection, frame: &Frame, now: DateTime<Local>) -> CaptureEvent {
        self.state.has_captured_any = true;
        self.state
            .last_capture_by_role
            .insert(detection.class_role(), now);
        CaptureEvent {
            timestamp: now,
            class_role: detection.class_role(),
            confidence_percent: detection.confidence_percent(),
            snapshot: frame.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectorSource};
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    fn det(role: ClassRole, confidence: f32, source: DetectorSource) -> Detection {
        Detection::new(
            role.display_name().to_lowercase(),
            role,
            confidence,
            BoundingBox::new(1.0, 1.0, 9.0, 9.0),
            source,
        )
    }

    fn fire(confidence: f32) -> Detection {
        det(ClassRole::Fire, confidence, DetectorSource::Primary)
    }

    fn batch(seq: u64, detections: Vec<Detection>) -> (DetectionBatch, Frame) {
        (DetectionBatch::new(seq, detections), Frame::blank(4, 4, seq))
    }

    #[test]
    fn single_shot_stops_once_at_first_resolved_frame() {
        let mut policy = EventPolicy::single_shot();
        let mut stops = Vec::new();
        let mut captures = 0;
        for seq in 1..=8u64 {
            let detections = if seq >= 5 { vec![fire(0.92)] } else { vec![] };
            let (b, f) = batch(seq, detections);
            let verdict = policy.evaluate(&b, &f, at(seq as u32));
            if verdict.stop {
                stops.push(seq);
            }
            captures += verdict.captures.len();
            assert!(verdict.log_records.is_empty());
        }
        assert_eq!(stops, vec![5]);
        assert_eq!(captures, 1);
        assert_eq!(policy.status(), PolicyStatus::Stopped);
        assert!(policy.state().has_captured_any);
        assert!(policy.state().stop_requested);
    }

    #[test]
    fn single_shot_capture_uses_current_frame_and_percent() {
        let mut policy = EventPolicy::single_shot();
        let (b, f) = batch(5, vec![fire(0.92)]);
        let verdict = policy.evaluate(&b, &f, at(0));
        assert_eq!(verdict.captures.len(), 1);
        let capture = &verdict.captures[0];
        assert_eq!(capture.confidence_percent, 92);
        assert_eq!(capture.class_role, ClassRole::Fire);
        assert_eq!(capture.snapshot.seq(), 5);
    }

    #[test]
    fn single_shot_ignores_confidence_but_not_unknown() {
        let mut policy = EventPolicy::single_shot();
        let (b, f) = batch(1, vec![det(ClassRole::Unknown, 0.99, DetectorSource::Primary)]);
        assert!(policy.evaluate(&b, &f, at(1)).is_empty());
        assert_eq!(policy.status(), PolicyStatus::Running);

        let (b, f) = batch(2, vec![det(ClassRole::Smoke, 0.05, DetectorSource::Primary)]);
        let verdict = policy.evaluate(&b, &f, at(2));
        assert!(verdict.stop);
        assert_eq!(verdict.captures[0].class_role, ClassRole::Smoke);
        assert_eq!(verdict.captures[0].confidence_percent, 5);
    }

    #[test]
    fn threshold_gates_critical_remark_and_capture() {
        let mut policy = EventPolicy::continuous(80);

        let (b, f) = batch(1, vec![fire(0.79)]);
        let verdict = policy.evaluate(&b, &f, at(1));
        assert_eq!(verdict.log_records.len(), 1);
        assert_eq!(verdict.log_records[0].confidence_percent, 79);
        assert_eq!(verdict.log_records[0].remark, "");
        assert!(verdict.captures.is_empty());

        let (b, f) = batch(2, vec![fire(0.80)]);
        let verdict = policy.evaluate(&b, &f, at(2));
        assert_eq!(verdict.log_records[0].confidence_percent, 80);
        assert_eq!(verdict.log_records[0].remark, CRITICAL_REMARK);
        assert_eq!(verdict.captures.len(), 1);
        assert!(!verdict.stop);
    }

    #[test]
    fn unknown_never_captures() {
        let unknown = || det(ClassRole::Unknown, 1.0, DetectorSource::Thermal);

        let mut continuous = EventPolicy::continuous(80);
        let (b, f) = batch(1, vec![unknown()]);
        let verdict = continuous.evaluate(&b, &f, at(1));
        assert!(verdict.captures.is_empty());
        assert_eq!(verdict.log_records.len(), 1);
        assert_eq!(verdict.log_records[0].remark, "");
        assert_eq!(verdict.log_records[0].class_role, ClassRole::Unknown);

        let mut single = EventPolicy::single_shot();
        let verdict = single.evaluate(&b, &f, at(1));
        assert!(verdict.captures.is_empty());
        assert!(!verdict.stop);
    }

    #[test]
    fn continuous_dual_detector_frame() {
        let mut policy = EventPolicy::continuous(DEFAULT_CRITICAL_THRESHOLD);
        let (b, f) = batch(
            1,
            vec![
                fire(0.85),
                det(ClassRole::Thermal, 0.5, DetectorSource::Thermal),
            ],
        );
        let verdict = policy.evaluate(&b, &f, at(1));
        let remarks: Vec<_> = verdict.log_records.iter().map(|r| r.remark.as_str()).collect();
        assert_eq!(remarks, vec!["CRITICAL", ""]);
        assert_eq!(verdict.captures.len(), 1);
        assert_eq!(verdict.captures[0].class_role, ClassRole::Fire);
        assert_eq!(verdict.captures[0].confidence_percent, 85);
    }

    #[test]
    fn continuous_does_not_deduplicate_by_default() {
        let mut policy = EventPolicy::continuous(80);
        let mut total = 0;
        for seq in 1..=3u64 {
            let (b, f) = batch(seq, vec![fire(0.9), fire(0.95)]);
            total += policy.evaluate(&b, &f, at(0)).captures.len();
        }
        assert_eq!(total, 6);
        assert_eq!(policy.status(), PolicyStatus::Running);
    }

    #[test]
    fn cooldown_withholds_captures_but_keeps_logging() {
        let mut policy = EventPolicy::new(PolicyMode::Continuous {
            critical_threshold: 80,
            cooldown: Some(Duration::from_secs(10)),
        });

        let (b, f) = batch(1, vec![fire(0.9), fire(0.91)]);
        let verdict = policy.evaluate(&b, &f, at(0));
        assert_eq!(verdict.captures.len(), 1);
        assert_eq!(verdict.suppressed, 1);
        assert!(verdict.log_records.iter().all(LogRecord::is_critical));

        let (b, f) = batch(2, vec![fire(0.9)]);
        let verdict = policy.evaluate(&b, &f, at(5));
        assert!(verdict.captures.is_empty());
        assert_eq!(verdict.suppressed, 1);
        assert_eq!(verdict.log_records.len(), 1);

        let (b, f) = batch(3, vec![fire(0.9), det(ClassRole::Smoke, 0.9, DetectorSource::Primary)]);
        let verdict = policy.evaluate(&b, &f, at(7));
        assert_eq!(verdict.captures.len(), 1);
        assert_eq!(verdict.captures[0].class_role, ClassRole::Smoke);

        let (b, f) = batch(4, vec![fire(0.9)]);
        assert_eq!(policy.evaluate(&b, &f, at(10)).captures.len(), 1);
    }

    #[test]
    fn cancelled_policy_is_a_no_op() {
        let mut policy = EventPolicy::continuous(80);
        policy.cancel();
        assert_eq!(policy.status(), PolicyStatus::Stopped);
        let (b, f) = batch(1, vec![fire(0.99)]);
        assert!(policy.evaluate(&b, &f, at(0)).is_empty());
    }

    #[test]
    fn stale_batch_is_ignored() {
        let mut policy = EventPolicy::continuous(80);
        let b = DetectionBatch::new(1, vec![fire(0.99)]);
        let f = Frame::blank(4, 4, 2);
        assert!(policy.evaluate(&b, &f, at(0)).is_empty());
    }
}
