//! Frame sources.
//!
//! This module provides the sources a run can read frames from:
//! - Synthetic `stub://` source (drills, tests)
//! - Directory of still images, read in file-name order
//! - USB/V4L2 devices (feature: camera-v4l2)
//!
//! Every source numbers frames from 1 upward. `read` returning `Ok(None)` is
//! a clean end of stream; an `Err` is a device failure.

pub mod dir;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

pub use dir::ImageDirSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Source;

use std::path::Path;

use anyhow::Result;

use crate::error::PipelineError;
use crate::frame::Frame;

pub trait FrameSource {
    /// Device or path this source reads from.
    fn name(&self) -> &str;

    /// Connect to the device. Called once before the first `read`.
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` when the stream is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the device.
    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// `stub://name`, a directory path, or a V4L2 device node.
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
            max_frames: None,
        }
    }
}

/// Build the source named by `settings.uri` and open it.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    let unavailable = |reason: String| PipelineError::DeviceUnavailable {
        device: settings.uri.clone(),
        reason,
    };

    let mut source: Box<dyn FrameSource> = if settings.uri.starts_with("stub://") {
        Box::new(SyntheticSource::new(settings.clone()))
    } else if Path::new(&settings.uri).is_dir() {
        Box::new(ImageDirSource::new(&settings.uri).map_err(|e| unavailable(crate::error::chain(&e)))?)
    } else {
        device_source(settings)?
    };

    if let Some(limit) = settings.max_frames {
        source = Box::new(Bounded::new(source, limit));
    }

    source
        .open()
        .map_err(|e| unavailable(crate::error::chain(&e)))?;
    Ok(source)
}

#[cfg(feature = "camera-v4l2")]
fn device_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    Ok(Box::new(V4l2Source::new(settings.clone())))
}

#[cfg(not(feature = "camera-v4l2"))]
fn device_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>, PipelineError> {
    Err(PipelineError::DeviceUnavailable {
        device: settings.uri.clone(),
        reason: "not a directory or stub:// source, and camera devices require the camera-v4l2 feature"
            .to_string(),
    })
}

/// Ends the stream after a fixed number of frames.
struct Bounded {
    inner: Box<dyn FrameSource>,
    remaining: u64,
}

impl Bounded {
    fn new(inner: Box<dyn FrameSource>, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl FrameSource for Bounded {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.inner.read()
    }

    fn close(&mut self) {
        self.inner.close()
    }
}
