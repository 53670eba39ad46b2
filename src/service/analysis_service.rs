use std::sync::Arc;

use anyhow::Error;
use log::error;

use crate::models::analysis_model::AnalysisInput;
use crate::pipeline::analysis_pipeline::analysis_pipeline::{AnalysisPipeline, CapabilityAvailability};
use crate::pipeline::model_config::config::RecommendationTable;
use crate::pipeline::report::report::DiagnosticReport;

#[derive(Clone)]
pub struct AnalysisService {
    analysis_pipeline: Arc<AnalysisPipeline>,
    recommendations: Arc<RecommendationTable>,
}

impl AnalysisService {
    pub fn new(
        analysis_pipeline: &Arc<AnalysisPipeline>,
        recommendations: &Arc<RecommendationTable>,
    ) -> Self {
        AnalysisService {
            analysis_pipeline: Arc::clone(analysis_pipeline),
            recommendations: Arc::clone(recommendations),
        }
    }

    /// Run one analysis on the blocking pool (model inference is CPU-bound)
    /// and attach the recommendation identifiers for the diagnosed label.
    pub async fn analyze_image(&self, input: AnalysisInput) -> Result<DiagnosticReport, Error> {
        let pipeline = Arc::clone(&self.analysis_pipeline);

        let report = match tokio::task::spawn_blocking(move || {
            let report = pipeline.analyze(&input.im_bytes);
            drop(input.im_bytes);
            report
        })
        .await
        {
            Ok(report) => report,
            Err(e) => {
                error!("analysis task failed to complete: {e}");
                return Err(Error::from(e));
            }
        };

        let recommendations = match &report.primary_diagnosis {
            Some(diagnosis) => self.recommendations.for_label(&diagnosis.acne_type),
            None => Vec::new(),
        };

        Ok(report.with_recommendations(recommendations))
    }

    pub fn availability(&self) -> CapabilityAvailability {
        self.analysis_pipeline.availability()
    }
}
