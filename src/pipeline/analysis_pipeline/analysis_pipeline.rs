use std::sync::Arc;

use anyhow::{Context, Error};
use log::{error, info, warn};
use serde::Serialize;

use crate::config::settings::Models;
use crate::pipeline::capability::face_localizer::{FaceLocalizer, UltraFaceLocalizer};
use crate::pipeline::capability::lesion_classifier::{LesionClassifier, OrtLesionClassifier};
use crate::pipeline::capability::spot_detector::{DetectedSpot, SpotDetector, YoloSpotDetector};
use crate::pipeline::model_config::config::{
    FaceLocalizerConfig, LabelTable, LesionClassifierConfig, SpotDetectorConfig,
};
use crate::pipeline::processing::crop::{crop_face_region, DEFAULT_PADDING_FRACTION};
use crate::pipeline::report::report::{aggregate, DiagnosticReport};
use crate::pipeline::utils::image::decode_image;

/// Which capabilities are currently loaded. Exposed through the health
/// endpoint as the pre-flight signal for callers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityAvailability {
    pub face_localizer: bool,
    pub lesion_classifier: bool,
    pub spot_detector: bool,
}

/// Sequences one `analyze` invocation through face localization, region
/// cropping, classification and spot detection, and aggregates the result
/// into a `DiagnosticReport`.
///
/// The face localizer is required: nothing downstream is meaningful
/// without it, so construction fails if its model cannot be loaded. The
/// classifier and spot detector are optional; a missing model disables
/// that capability and the matching report field stays empty while the
/// report itself still succeeds.
pub struct AnalysisPipeline {
    face_localizer: Arc<dyn FaceLocalizer>,
    lesion_classifier: Option<Arc<dyn LesionClassifier>>,
    spot_detector: Option<Arc<dyn SpotDetector>>,
    labels: LabelTable,
    padding_fraction: f32,
}

impl AnalysisPipeline {
    pub fn new(models: &Models) -> Result<Self, Error> {
        let labels = LabelTable::load(&models.class_labels)?;
        if labels.is_empty() {
            return Err(Error::msg("label table is empty"));
        }

        let localizer_path = models.face_localizer_path();
        let face_localizer = UltraFaceLocalizer::load(&localizer_path, FaceLocalizerConfig::new())
            .with_context(|| format!("failed to load face localizer from {localizer_path:?}"))?;

        let classifier_path = models.lesion_classifier_path();
        let lesion_classifier: Option<Arc<dyn LesionClassifier>> = if classifier_path.is_file() {
            let classifier =
                OrtLesionClassifier::load(&classifier_path, LesionClassifierConfig::new())
                    .with_context(|| {
                        format!("failed to load lesion classifier from {classifier_path:?}")
                    })?;
            Some(Arc::new(classifier))
        } else {
            warn!("lesion classifier model not found at {classifier_path:?}, classification disabled");
            None
        };

        let detector_path = models.spot_detector_path();
        let spot_detector: Option<Arc<dyn SpotDetector>> = if detector_path.is_file() {
            let detector = YoloSpotDetector::load(&detector_path, SpotDetectorConfig::new())
                .with_context(|| format!("failed to load spot detector from {detector_path:?}"))?;
            Some(Arc::new(detector))
        } else {
            warn!("spot detector model not found at {detector_path:?}, spot detection disabled");
            None
        };

        Ok(AnalysisPipeline {
            face_localizer: Arc::new(face_localizer),
            lesion_classifier,
            spot_detector,
            labels,
            padding_fraction: DEFAULT_PADDING_FRACTION,
        })
    }

    /// Assemble a pipeline from already-constructed capability backends.
    /// This is how alternate model runtimes (and test doubles) plug in.
    pub fn with_capabilities(
        face_localizer: Arc<dyn FaceLocalizer>,
        lesion_classifier: Option<Arc<dyn LesionClassifier>>,
        spot_detector: Option<Arc<dyn SpotDetector>>,
        labels: LabelTable,
    ) -> Self {
        AnalysisPipeline {
            face_localizer,
            lesion_classifier,
            spot_detector,
            labels,
            padding_fraction: DEFAULT_PADDING_FRACTION,
        }
    }

    pub fn availability(&self) -> CapabilityAvailability {
        CapabilityAvailability {
            face_localizer: true,
            lesion_classifier: self.lesion_classifier.is_some(),
            spot_detector: self.spot_detector.is_some(),
        }
    }

    /// Run the full analysis over raw image bytes. Always returns a report:
    /// every fatal condition is converted into a failed report with a
    /// human-readable message, and each capability is called at most once.
    pub fn analyze(&self, im_bytes: &[u8]) -> DiagnosticReport {
        let image = match decode_image(im_bytes) {
            Ok(image) => image,
            Err(e) => {
                return DiagnosticReport::failed(e.to_string(), false);
            }
        };

        let detections = match self.face_localizer.locate(&image) {
            Ok(detections) => detections,
            Err(e) => {
                error!("face localization failed: {e}");
                return DiagnosticReport::failed(e.to_string(), false);
            }
        };

        // First detection wins when several faces are present.
        // TODO: confirm whether multi-face selection should prefer the
        // largest box or the highest confidence instead.
        let Some(detection) = detections.first() else {
            info!("no face detected");
            return DiagnosticReport::failed("no face detected", false);
        };

        let region = match crop_face_region(&image, &detection.bounds, self.padding_fraction) {
            Ok(region) => region,
            Err(e) => {
                error!("face region cropping failed: {e}");
                return DiagnosticReport::failed(e.to_string(), true);
            }
        };

        let probabilities = match &self.lesion_classifier {
            Some(classifier) => match classifier.classify(&region.image) {
                Ok(probabilities) => Some(probabilities),
                Err(e) => {
                    error!("lesion classification failed: {e}");
                    return DiagnosticReport::failed(e.to_string(), true);
                }
            },
            None => None,
        };

        let spots: Option<Vec<DetectedSpot>> = match &self.spot_detector {
            Some(detector) => match detector.detect(&region.image) {
                Ok(spots) => Some(spots),
                Err(e) => {
                    error!("spot detection failed: {e}");
                    return DiagnosticReport::failed(e.to_string(), true);
                }
            },
            None => None,
        };

        match aggregate(true, probabilities.as_deref(), spots.as_deref(), &self.labels) {
            Ok(report) => report,
            Err(e) => {
                error!("report aggregation failed: {e}");
                DiagnosticReport::failed(e.to_string(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::RgbImage;

    use super::*;
    use crate::pipeline::capability::face_localizer::FaceDetection;
    use crate::pipeline::error::PipelineError;
    use crate::pipeline::processing::crop::{BoundingBox, PixelRect};
    use crate::pipeline::report::report::ReportStatus;

    struct StubLocalizer {
        detections: Vec<FaceDetection>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubLocalizer {
        fn with_one_face() -> Self {
            StubLocalizer {
                detections: vec![FaceDetection {
                    bounds: BoundingBox { x_min: 0.25, y_min: 0.25, width: 0.5, height: 0.5 },
                    confidence: 0.95,
                }],
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_no_face() -> Self {
            StubLocalizer { detections: Vec::new(), fail: false, calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            StubLocalizer { detections: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
        }
    }

    impl FaceLocalizer for StubLocalizer {
        fn locate(&self, _image: &RgbImage) -> Result<Vec<FaceDetection>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::capability_failure("face localizer", "session died"));
            }
            Ok(self.detections.clone())
        }
    }

    struct StubClassifier {
        probabilities: Vec<f32>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubClassifier {
        fn with_distribution(probabilities: Vec<f32>) -> Self {
            StubClassifier { probabilities, fail: false, calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            StubClassifier { probabilities: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
        }
    }

    impl LesionClassifier for StubClassifier {
        fn classify(&self, _image: &RgbImage) -> Result<Vec<f32>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::capability_failure("lesion classifier", "inference exploded"));
            }
            Ok(self.probabilities.clone())
        }
    }

    struct StubDetector {
        spots: Vec<DetectedSpot>,
        calls: AtomicUsize,
    }

    impl StubDetector {
        fn with_spots(spots: Vec<DetectedSpot>) -> Self {
            StubDetector { spots, calls: AtomicUsize::new(0) }
        }
    }

    impl SpotDetector for StubDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedSpot>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.spots.clone())
        }
    }

    fn labels() -> LabelTable {
        LabelTable::from_json(r#"{"0": "Clear Skin", "1": "Blackheads", "2": "Papules"}"#).unwrap()
    }

    fn papule_spot() -> DetectedSpot {
        DetectedSpot {
            bounds: PixelRect { x: 5, y: 5, width: 8, height: 8 },
            category: Some("papule".to_string()),
            confidence: 0.7,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([180, 140, 120]));
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_analyze_success_with_all_capabilities() {
        let localizer = Arc::new(StubLocalizer::with_one_face());
        let classifier = Arc::new(StubClassifier::with_distribution(vec![0.1, 0.7, 0.2]));
        let detector = Arc::new(StubDetector::with_spots(vec![papule_spot(); 3]));

        let pipeline = AnalysisPipeline::with_capabilities(
            localizer.clone(),
            Some(classifier.clone()),
            Some(detector.clone()),
            labels(),
        );

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Success);
        assert!(report.face_detected);
        let diagnosis = report.primary_diagnosis.unwrap();
        assert_eq!(diagnosis.acne_type, "Blackheads");
        assert_eq!(diagnosis.confidence, 70.0);
        let summary = report.detected_spots.unwrap();
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.breakdown.get("papule"), Some(&3));

        assert_eq!(localizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_face_short_circuits_downstream_capabilities() {
        let localizer = Arc::new(StubLocalizer::with_no_face());
        let classifier = Arc::new(StubClassifier::with_distribution(vec![1.0, 0.0, 0.0]));
        let detector = Arc::new(StubDetector::with_spots(Vec::new()));

        let pipeline = AnalysisPipeline::with_capabilities(
            localizer.clone(),
            Some(classifier.clone()),
            Some(detector.clone()),
            labels(),
        );

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(!report.face_detected);
        assert!(report.message.unwrap().contains("no face detected"));

        assert_eq!(localizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unreadable_image_makes_no_capability_calls() {
        let localizer = Arc::new(StubLocalizer::with_one_face());
        let pipeline = AnalysisPipeline::with_capabilities(localizer.clone(), None, None, labels());

        let report = pipeline.analyze(b"zero-byte-ish garbage");

        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.message.as_deref(), Some("could not read image"));
        assert!(!report.face_detected);
        assert_eq!(localizer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classifier_unavailable_still_reports_spots() {
        let localizer = Arc::new(StubLocalizer::with_one_face());
        let detector = Arc::new(StubDetector::with_spots(vec![papule_spot(); 3]));

        let pipeline = AnalysisPipeline::with_capabilities(
            localizer,
            None,
            Some(detector.clone()),
            labels(),
        );

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Success);
        assert!(report.primary_diagnosis.is_none());
        let summary = report.detected_spots.unwrap();
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.breakdown.get("papule"), Some(&3));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detector_unavailable_still_reports_diagnosis() {
        let localizer = Arc::new(StubLocalizer::with_one_face());
        let classifier = Arc::new(StubClassifier::with_distribution(vec![0.9, 0.05, 0.05]));

        let pipeline =
            AnalysisPipeline::with_capabilities(localizer, Some(classifier), None, labels());

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.primary_diagnosis.unwrap().acne_type, "Clear Skin");
        assert!(report.detected_spots.is_none());
    }

    #[test]
    fn test_classifier_failure_fails_the_report() {
        let localizer = Arc::new(StubLocalizer::with_one_face());
        let classifier = Arc::new(StubClassifier::failing());
        let detector = Arc::new(StubDetector::with_spots(Vec::new()));

        let pipeline = AnalysisPipeline::with_capabilities(
            localizer,
            Some(classifier),
            Some(detector.clone()),
            labels(),
        );

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.face_detected);
        assert!(report.message.unwrap().contains("inference exploded"));
    }

    #[test]
    fn test_localizer_failure_is_fatal() {
        let localizer = Arc::new(StubLocalizer::failing());
        let classifier = Arc::new(StubClassifier::with_distribution(vec![1.0, 0.0, 0.0]));

        let pipeline = AnalysisPipeline::with_capabilities(
            localizer.clone(),
            Some(classifier.clone()),
            None,
            labels(),
        );

        let report = pipeline.analyze(&png_bytes(100, 100));

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(!report.face_detected);
        assert!(report.message.unwrap().contains("session died"));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_availability_reflects_loaded_capabilities() {
        let pipeline = AnalysisPipeline::with_capabilities(
            Arc::new(StubLocalizer::with_one_face()),
            None,
            Some(Arc::new(StubDetector::with_spots(Vec::new()))),
            labels(),
        );

        let availability = pipeline.availability();
        assert!(availability.face_localizer);
        assert!(!availability.lesion_classifier);
        assert!(availability.spot_detector);
    }
}
