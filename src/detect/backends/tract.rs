#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::{ClassTaxonomy, DetectorPort};
use crate::detect::backends::non_max_suppression;
use crate::detect::result::{BoundingBox, RawDetection};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single `[1, 4 + classes, anchors]` output where the first four
/// rows are `cx, cy, w, h` in input pixels and the rest are per-class scores.
/// Loads the model from a local file; performs no other I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    classes: ClassTaxonomy,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        classes: ClassTaxonomy,
        input_size: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if classes.is_empty() {
            return Err(anyhow!(
                "model {} needs a class list; ONNX metadata is not read",
                model_path.display()
            ));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            classes,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence and IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = frame.to_image()?;
        let resized = imageops::resize(&rgb, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;

        let (batch, rows, anchors) = view.dim();
        let class_count = self.classes.len();
        if batch != 1 || rows != 4 + class_count {
            return Err(anyhow!(
                "unexpected output shape [{}, {}, {}] for {} classes",
                batch,
                rows,
                anchors,
                class_count
            ));
        }

        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;
        let max_x = frame.width() as f32;
        let max_y = frame.height() as f32;

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..class_count {
                let score = view[(0, 4 + class, anchor)];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if !best_score.is_finite() || best_score < self.confidence_threshold {
                continue;
            }

            let cx = view[(0, 0, anchor)];
            let cy = view[(0, 1, anchor)];
            let w = view[(0, 2, anchor)];
            let h = view[(0, 3, anchor)];
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                continue;
            }
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
                ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
            );
            if bbox.area() <= 0.0 {
                continue;
            }
            detections.push(RawDetection {
                class_id: best_class as u32,
                confidence: best_score.min(1.0),
                bbox,
            });
        }

        Ok(non_max_suppression(detections, self.iou_threshold))
    }
}

impl DetectorPort for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_taxonomy(&self) -> &ClassTaxonomy {
        &self.classes
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let frame = Frame::blank(self.input_size, self.input_size, 0);
        self.detect(&frame).map(|_| ())
    }
}
