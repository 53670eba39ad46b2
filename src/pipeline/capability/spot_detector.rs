use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::Serialize;

use crate::pipeline::error::PipelineError;
use crate::pipeline::model_config::config::SpotDetectorConfig;
use crate::pipeline::processing::crop::PixelRect;
use crate::pipeline::processing::nms::nms;
use crate::pipeline::utils::image::image_to_nchw;

pub const CAPABILITY: &str = "spot detector";

/// One candidate lesion found within the cropped face region.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedSpot {
    pub bounds: PixelRect,
    pub category: Option<String>,
    pub confidence: f32,
}

/// Pluggable spot detection backend, producing localized lesion candidates
/// above the configured confidence threshold.
pub trait SpotDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedSpot>, PipelineError>;
}

fn model_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::capability_failure(CAPABILITY, e)
}

/// A decoded prediction in model input space, before rescaling back onto
/// the source image.
#[derive(Debug, Clone, Copy)]
struct RawSpot {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
    confidence: f32,
    class_index: usize,
}

/// YOLO-style single-tensor detector executed through ONNX Runtime. The
/// output tensor is laid out `[1, 4 + num_classes, num_candidates]` with
/// box centers and extents in input-pixel space.
pub struct YoloSpotDetector {
    session: Mutex<Session>,
    config: SpotDetectorConfig,
}

impl YoloSpotDetector {
    pub fn load(model_path: &Path, config: SpotDetectorConfig) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(4))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(model_err)?;

        Ok(YoloSpotDetector {
            session: Mutex::new(session),
            config,
        })
    }

    fn rescale(&self, kept: Vec<RawSpot>, image: &RgbImage) -> Vec<DetectedSpot> {
        let input_size = self.config.input_size as f32;
        let sx = image.width() as f32 / input_size;
        let sy = image.height() as f32 / input_size;

        kept.into_iter()
            .filter_map(|spot| {
                let x_min = (spot.x_min * sx).max(0.0).floor() as u32;
                let y_min = (spot.y_min * sy).max(0.0).floor() as u32;
                let x_max = ((spot.x_max * sx).ceil() as u32).min(image.width());
                let y_max = ((spot.y_max * sy).ceil() as u32).min(image.height());
                if x_max <= x_min || y_max <= y_min {
                    return None;
                }

                Some(DetectedSpot {
                    bounds: PixelRect {
                        x: x_min,
                        y: y_min,
                        width: x_max - x_min,
                        height: y_max - y_min,
                    },
                    category: self.config.class_names.get(spot.class_index).cloned(),
                    confidence: spot.confidence,
                })
            })
            .collect()
    }
}

impl SpotDetector for YoloSpotDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedSpot>, PipelineError> {
        let size = self.config.input_size;
        let (shape, data) = image_to_nchw(image, size, size, 0.0, 255.0);
        let input_tensor = Tensor::from_array((shape, data)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| model_err("model session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor]).map_err(model_err)?;

        let (_shape, predictions) = outputs[self.config.output_name]
            .try_extract_tensor::<f32>()
            .map_err(model_err)?;

        let num_classes = self.config.class_names.len().max(1);
        let candidates = decode_candidates(predictions, num_classes, self.config.confidence_threshold)?;

        let kept = suppress_overlaps(candidates, self.config.iou_threshold);
        Ok(self.rescale(kept, image))
    }
}

/// Decode the flat `[4 + num_classes, num_candidates]` prediction buffer,
/// keeping candidates whose best class score clears the threshold. Ties on
/// the best score resolve to the lowest class index.
fn decode_candidates(
    predictions: &[f32],
    num_classes: usize,
    confidence_threshold: f32,
) -> Result<Vec<RawSpot>, PipelineError> {
    let attrs = 4 + num_classes;
    if predictions.is_empty() || predictions.len() % attrs != 0 {
        return Err(model_err(format!(
            "prediction buffer of {} values is not divisible into {} attributes",
            predictions.len(),
            attrs
        )));
    }
    let num_candidates = predictions.len() / attrs;

    let mut spots = Vec::new();
    for i in 0..num_candidates {
        let mut best_score = 0.0f32;
        let mut best_class = 0usize;
        for class_index in 0..num_classes {
            let score = predictions[(4 + class_index) * num_candidates + i];
            if score > best_score {
                best_score = score;
                best_class = class_index;
            }
        }
        if best_score <= confidence_threshold {
            continue;
        }

        let cx = predictions[i];
        let cy = predictions[num_candidates + i];
        let w = predictions[2 * num_candidates + i];
        let h = predictions[3 * num_candidates + i];

        spots.push(RawSpot {
            x_min: cx - w / 2.0,
            y_min: cy - h / 2.0,
            x_max: cx + w / 2.0,
            y_max: cy + h / 2.0,
            confidence: best_score,
            class_index: best_class,
        });
    }

    Ok(spots)
}

fn suppress_overlaps(candidates: Vec<RawSpot>, iou_threshold: f32) -> Vec<RawSpot> {
    if candidates.is_empty() {
        return candidates;
    }

    let rows: Vec<f32> = candidates
        .iter()
        .flat_map(|s| [s.x_min, s.y_min, s.x_max, s.y_max, s.confidence])
        .collect();
    let dets = Array2::from_shape_vec((candidates.len(), 5), rows)
        .expect("candidate rows are rectangular");

    nms(&dets, iou_threshold)
        .into_iter()
        .map(|i| candidates[i])
        .collect()
}
