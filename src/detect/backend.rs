use std::collections::BTreeMap;

use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::frame::Frame;

/// Model-local class id to human-readable class name.
pub type ClassTaxonomy = BTreeMap<u32, String>;

/// One loaded detection model.
///
/// Implementations must treat the frame as read-only. An `Err` from `detect`
/// ends the run; callers never retry.
pub trait DetectorPort {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names reported by the model.
    fn class_taxonomy(&self) -> &ClassTaxonomy;

    /// Run detection on a frame. May return an empty vector.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: DetectorPort + ?Sized> DetectorPort for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn class_taxonomy(&self) -> &ClassTaxonomy {
        (**self).class_taxonomy()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
