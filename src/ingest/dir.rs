//! Still-image directory source.
//!
//! Replays `.jpg`, `.jpeg` and `.png` files from a local directory in file-name
//! order, one frame per file, then reports end of stream.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    root: PathBuf,
    name: String,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(anyhow!("{} is not a directory", root.display()));
        }
        Ok(Self {
            name: root.display().to_string(),
            root,
            files: Vec::new(),
            next: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.next)
    }
}

impl FrameSource for ImageDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.root.display()));
        }
        files.sort();
        log::info!(
            "ImageDirSource: {} images queued from {}",
            files.len(),
            self.root.display()
        );
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .into_rgb8();
        Ok(Some(Frame::from_image(image, self.next as u64)))
    }

    fn close(&mut self) {
        self.files.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        RgbImage::new(4, 3).save(tmp.path().join("b.png"))?;
        RgbImage::new(6, 5).save(tmp.path().join("a.png"))?;
        std::fs::write(tmp.path().join("notes.txt"), "skip me")?;

        let mut source = ImageDirSource::new(tmp.path())?;
        source.open()?;
        assert_eq!(source.remaining(), 2);

        let first = source.read()?.expect("first frame");
        assert_eq!((first.width(), first.height(), first.seq()), (6, 5, 1));
        let second = source.read()?.expect("second frame");
        assert_eq!((second.width(), second.height(), second.seq()), (4, 3, 2));
        assert!(source.read()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_open() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut source = ImageDirSource::new(tmp.path())?;
        assert!(source.open().is_err());
        Ok(())
    }
}
