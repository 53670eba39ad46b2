use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::pipeline::error::PipelineError;
use crate::pipeline::model_config::config::LesionClassifierConfig;
use crate::pipeline::utils::image::image_to_nhwc;

pub const CAPABILITY: &str = "lesion classifier";

/// Pluggable lesion classification backend: a normalized facial crop in, a
/// probability distribution over the configured label set out.
pub trait LesionClassifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError>;
}

fn model_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::capability_failure(CAPABILITY, e)
}

/// Keras-exported classifier executed through ONNX Runtime: NHWC input at a
/// fixed square size, pixels scaled to [0, 1], softmax probabilities out.
pub struct OrtLesionClassifier {
    session: Mutex<Session>,
    config: LesionClassifierConfig,
}

impl OrtLesionClassifier {
    pub fn load(model_path: &Path, config: LesionClassifierConfig) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(4))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(model_err)?;

        Ok(OrtLesionClassifier {
            session: Mutex::new(session),
            config,
        })
    }
}

impl LesionClassifier for OrtLesionClassifier {
    fn classify(&self, image: &RgbImage) -> Result<Vec<f32>, PipelineError> {
        let (shape, data) = image_to_nhwc(image, self.config.image_size, self.config.pixel_scale);
        let input_tensor = Tensor::from_array((shape, data)).map_err(model_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| model_err("model session lock poisoned"))?;
        let outputs = session.run(ort::inputs![input_tensor]).map_err(model_err)?;

        let (_shape, probabilities) = outputs[self.config.output_name]
            .try_extract_tensor::<f32>()
            .map_err(model_err)?;

        if probabilities.is_empty() {
            return Err(model_err("model produced an empty probability vector"));
        }

        Ok(probabilities.to_vec())
    }
}
