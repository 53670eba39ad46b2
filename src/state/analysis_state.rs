use std::sync::Arc;

use crate::pipeline::analysis_pipeline::analysis_pipeline::AnalysisPipeline;
use crate::pipeline::model_config::config::RecommendationTable;
use crate::service::analysis_service::AnalysisService;

#[derive(Clone)]
pub struct AnalysisState {
    pub analysis_service: AnalysisService,
}

impl AnalysisState {
    pub fn new(
        pipeline: &Arc<AnalysisPipeline>,
        recommendations: &Arc<RecommendationTable>,
    ) -> Self {
        Self {
            analysis_service: AnalysisService::new(pipeline, recommendations),
        }
    }
}
