use anyhow::{anyhow, Result};

use super::{FrameSource, SourceSettings};
use crate::frame::Frame;

/// Synthetic `stub://` source. Produces an endless moving gradient.
pub struct SyntheticSource {
    settings: SourceSettings,
    frame_count: u64,
    scene_state: u8,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
            connected: false,
        }
    }

    /// Occasionally shifts the scene to simulate change.
    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.settings.width as usize * self.settings.height as usize * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.settings.uri
    }

    fn open(&mut self) -> Result<()> {
        if self.settings.width == 0 || self.settings.height == 0 {
            return Err(anyhow!("synthetic source needs non-zero dimensions"));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.settings.uri,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.settings.uri));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        let frame = Frame::from_rgb(
            pixels,
            self.settings.width,
            self.settings.height,
            self.frame_count,
        )?;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
