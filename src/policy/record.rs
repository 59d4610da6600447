use chrono::{DateTime, Local};

use crate::detect::ClassRole;
use crate::frame::Frame;

/// Whole-second timestamp format shared by log lines and capture keys.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Remark written for detections that cross the critical threshold.
pub const CRITICAL_REMARK: &str = "CRITICAL";

/// Evidence image to persist. Written once, then handed to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureEvent {
    pub timestamp: DateTime<Local>,
    pub class_role: ClassRole,
    pub confidence_percent: u8,
    pub snapshot: Frame,
}

impl CaptureEvent {
    /// Storage key `<Role>_<timestamp>_<percent>`.
    ///
    /// Two captures of one role at one percent within the same second share a
    /// key, so the later one replaces the earlier file.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.class_role.display_name(),
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.confidence_percent
        )
    }
}

/// One append-only log line per evaluated detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub class_role: ClassRole,
    pub confidence_percent: u8,
    pub remark: String,
}

impl LogRecord {
    pub fn is_critical(&self) -> bool {
        self.remark == CRITICAL_REMARK
    }

    /// `<timestamp> <Role> <percent> <remark>`; the remark may be empty.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.class_role.display_name(),
            self.confidence_percent,
            self.remark
        )
    }
}
