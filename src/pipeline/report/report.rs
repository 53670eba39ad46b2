use std::collections::HashMap;

use serde::Serialize;

use crate::pipeline::capability::lesion_classifier;
use crate::pipeline::capability::spot_detector::DetectedSpot;
use crate::pipeline::error::PipelineError;
use crate::pipeline::model_config::config::LabelTable;

/// Terminal status of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Failed,
}

/// Arg-max diagnosis over the classifier's probability distribution, with
/// the confidence expressed on a 0-100 scale rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub acne_type: String,
    pub confidence: f64,
}

/// Count summary of the detector's output, grouped by category. Spots
/// without a category contribute to the total only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotSummary {
    pub total_count: usize,
    pub breakdown: HashMap<String, usize>,
}

impl SpotSummary {
    pub fn from_spots(spots: &[DetectedSpot]) -> Self {
        let mut breakdown: HashMap<String, usize> = HashMap::new();
        for spot in spots {
            if let Some(category) = &spot.category {
                *breakdown.entry(category.clone()).or_insert(0) += 1;
            }
        }
        SpotSummary {
            total_count: spots.len(),
            breakdown,
        }
    }
}

/// The immutable terminal output of one pipeline invocation. Constructed
/// once by the aggregator (or one of the failure shortcuts) and handed to
/// the caller; recommendation identifiers are attached by an external
/// lookup the pipeline does not interpret.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub face_detected: bool,
    pub primary_diagnosis: Option<ClassificationResult>,
    pub detected_spots: Option<SpotSummary>,
    pub recommendations: Vec<String>,
}

impl DiagnosticReport {
    pub fn failed(message: impl Into<String>, face_detected: bool) -> Self {
        DiagnosticReport {
            status: ReportStatus::Failed,
            message: Some(message.into()),
            face_detected,
            primary_diagnosis: None,
            detected_spots: None,
            recommendations: Vec::new(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

/// Combine the stage outputs into a success report. A missing probability
/// vector or spot list reflects an unavailable capability and leaves the
/// matching field empty without failing the report.
pub fn aggregate(
    face_detected: bool,
    probabilities: Option<&[f32]>,
    spots: Option<&[DetectedSpot]>,
    labels: &LabelTable,
) -> Result<DiagnosticReport, PipelineError> {
    let primary_diagnosis = match probabilities {
        Some(probabilities) => Some(classify_distribution(probabilities, labels)?),
        None => None,
    };

    Ok(DiagnosticReport {
        status: ReportStatus::Success,
        message: None,
        face_detected,
        primary_diagnosis,
        detected_spots: spots.map(SpotSummary::from_spots),
        recommendations: Vec::new(),
    })
}

fn classify_distribution(
    probabilities: &[f32],
    labels: &LabelTable,
) -> Result<ClassificationResult, PipelineError> {
    let (index, top) = arg_max(probabilities).ok_or_else(|| {
        PipelineError::capability_failure(
            lesion_classifier::CAPABILITY,
            "empty probability vector",
        )
    })?;

    let acne_type = labels.name(index).ok_or_else(|| {
        PipelineError::capability_failure(
            lesion_classifier::CAPABILITY,
            format!("label table has no entry for index {index}"),
        )
    })?;

    Ok(ClassificationResult {
        acne_type: acne_type.to_string(),
        confidence: round2(top as f64 * 100.0),
    })
}

/// Index and value of the distribution maximum; ties resolve to the lowest
/// index.
fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((index, value)),
        }
    }
    best
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
