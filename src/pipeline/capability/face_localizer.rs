use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::pipeline::error::PipelineError;
use crate::pipeline::model_config::config::FaceLocalizerConfig;
use crate::pipeline::processing::crop::BoundingBox;
use crate::pipeline::processing::nms::nms;
use crate::pipeline::utils::image::image_to_nchw;

pub const CAPABILITY: &str = "face localizer";

/// A single face found by the localizer, in relative [0, 1] coordinates.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub bounds: BoundingBox,
    pub confidence: f32,
}

/// Pluggable face localization backend. Implementations hold their model
/// state loaded once per process and must be shareable across concurrent
/// invocations without mutation.
pub trait FaceLocalizer: Send + Sync {
    fn locate(&self, image: &RgbImage) -> Result<Vec<FaceDetection>, PipelineError>;
}

fn model_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::capability_failure(CAPABILITY, e)
}

/// UltraFace-style single-stage localizer executed through ONNX Runtime.
/// The session is not reentrant, so inference serializes on a mutex.
pub struct UltraFaceLocalizer {
    session: Mutex<Session>,
    config: FaceLocalizerConfig,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h, all relative
}

impl UltraFaceLocalizer {
    pub fn load(model_path: &Path, config: FaceLocalizerConfig) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(4))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(model_err)?;

        let (width, height) = config.input_size;
        let anchors = generate_anchors(width as usize, height as usize);

        Ok(UltraFaceLocalizer {
            session: Mutex::new(session),
            config,
            anchors,
        })
    }

    /// Decode the raw score/box tensors into relative detections, apply the
    /// confidence threshold, then suppress overlaps. Survivors come back in
    /// descending confidence order.
    fn decode(&self, scores: &[f32], boxes: &[f32]) -> Vec<FaceDetection> {
        let mut rows: Vec<[f32; 5]> = Vec::new();

        for (i, anchor) in self.anchors.iter().enumerate() {
            let score = scores[i * 2 + 1];
            if score <= self.config.confidence_threshold {
                continue;
            }

            let (ax, ay, aw, ah) = *anchor;
            let cx = boxes[i * 4] * self.config.center_variance * aw + ax;
            let cy = boxes[i * 4 + 1] * self.config.center_variance * ah + ay;
            let w = (boxes[i * 4 + 2] * self.config.size_variance).exp() * aw;
            let h = (boxes[i * 4 + 3] * self.config.size_variance).exp() * ah;

            let x_min = (cx - w / 2.0).clamp(0.0, 1.0);
            let y_min = (cy - h / 2.0).clamp(0.0, 1.0);
            let x_max = (cx + w / 2.0).clamp(0.0, 1.0);
            let y_max = (cy + h / 2.0).clamp(0.0, 1.0);

            if x_max > x_min && y_max > y_min {
                rows.push([x_min, y_min, x_max, y_max, score]);
            }
        }

        if rows.is_empty() {
            return Vec::new();
        }

        let dets = Array2::from_shape_vec((rows.len(), 5), rows.concat())
            .expect("detection rows are rectangular");
        let keep = nms(&dets, self.config.iou_threshold);

        keep.into_iter()
            .map(|i| FaceDetection {
                bounds: BoundingBox {
                    x_min: rows[i][0],
                    y_min: rows[i][1],
                    width: rows[i][2] - rows[i][0],
                    height: rows[i][3] - rows[i][1],
                },
                confidence: rows[i][4],
            })
            .collect()
    }
}

impl FaceLocalizer for UltraFaceLocalizer {
    fn locate(&self, image: &RgbImage) -> Result<Vec<FaceDetection>, PipelineError> {
        let (width, height) = self.config.input_size;
        let (shape, data) = image_to_nchw(image, width, height, 127.0, 128.0);

        let input_tensor = Tensor::from_array((shape, data)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| model_err("model session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor]).map_err(model_err)?;

        let (_scores_shape, scores) = outputs["scores"].try_extract_tensor::<f32>().map_err(model_err)?;
        let (_boxes_shape, boxes) = outputs["boxes"].try_extract_tensor::<f32>().map_err(model_err)?;

        if scores.len() < self.anchors.len() * 2 || boxes.len() < self.anchors.len() * 4 {
            return Err(model_err("output tensor does not cover the anchor grid"));
        }

        Ok(self.decode(scores, boxes))
    }
}

/// UltraFace prior boxes in relative coordinates.
fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes = [
        vec![10.0, 16.0, 24.0],
        vec![32.0, 48.0],
        vec![64.0, 96.0],
        vec![128.0, 192.0, 256.0],
    ];

    let w = width as f32;
    let h = height as f32;
    let mut anchors = Vec::new();

    for (i, &shrinkage) in shrinkage_list.iter().enumerate() {
        let feature_h = (height as f32 / shrinkage as f32).ceil() as usize;
        let feature_w = (width as f32 / shrinkage as f32).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / w;
                let cy = (v as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / h;

                for &min_box in &min_boxes[i] {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_count_for_default_input() {
        // 320x240 feature maps: 40x30, 20x15, 10x8, 5x4 with 3/2/2/3
        // priors per cell.
        let anchors = generate_anchors(320, 240);
        let expected = 40 * 30 * 3 + 20 * 15 * 2 + 10 * 8 * 2 + 5 * 4 * 3;
        assert_eq!(anchors.len(), expected);
    }

    #[test]
    fn test_anchors_are_relative() {
        let anchors = generate_anchors(320, 240);
        assert!(anchors
            .iter()
            .all(|&(cx, cy, _, _)| (0.0..=1.0).contains(&cx) && (0.0..=1.0).contains(&cy)));
    }
}
