use axum::extract::DefaultBodyLimit;
use axum::Router;
use axum::routing::post;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handler::analysis_handler::analyze;
use crate::state::analysis_state::AnalysisState;

pub fn new_analyze_route() -> Router<AnalysisState> {
    Router::new()
        .route("/analyze", post(analyze))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            25 * 1024 * 1024, /* 25mb */
        ))
}
