use std::sync::Arc;
use std::time::Duration;

use axum::{Json, middleware, Router};
use axum::extract::State;
use axum::http::header;
use axum::routing::{get, IntoMakeService};
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::propagate_header::PropagateHeaderLayer;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_request_id::RequestIdLayer;

use crate::config::settings::SETTINGS;
use crate::error::errors::ResponseCode;
use crate::middleware::api_key_mw::validate_api_key_mw;
use crate::middleware::request_id_mw::generate_request_id_mw;
use crate::pipeline::analysis_pipeline::analysis_pipeline::{AnalysisPipeline, CapabilityAvailability};
use crate::pipeline::model_config::config::RecommendationTable;
use crate::response::common_response::{BaseResponse, GeneralResponseBuilder, GeneralResponseResult};
use crate::routes::v1::analyze::new_analyze_route;
use crate::state::analysis_state::AnalysisState;

#[derive(Clone, Serialize, Deserialize)]
struct FallbackResponse {
    message: String,
}

#[derive(Clone)]
pub struct RouterState {
    analysis_pipeline: Arc<AnalysisPipeline>,
    recommendations: Arc<RecommendationTable>,
}

impl RouterState {
    pub fn new(analysis_pipeline: AnalysisPipeline, recommendations: RecommendationTable) -> Self {
        RouterState {
            analysis_pipeline: Arc::new(analysis_pipeline),
            recommendations: Arc::new(recommendations),
        }
    }
}

pub fn root_routes(router_state: RouterState) -> IntoMakeService<Router> {
    let analysis_state =
        AnalysisState::new(&router_state.analysis_pipeline, &router_state.recommendations);

    let v1_router = Router::new().nest(
        "/v1",
        new_analyze_route().with_state(analysis_state.clone()),
    );

    let mut request_timeout_duration: u64 = 20;
    if let Some(_request_timeout) = SETTINGS.server.request_timeout {
        request_timeout_duration = _request_timeout;
    }

    let app_router = Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(
                    Router::new()
                        .route("/health", get(healthcheck))
                        .with_state(analysis_state),
                )
                .merge(v1_router)
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn(validate_api_key_mw)),
        )
        .layer(PropagateHeaderLayer::new(header::HeaderName::from_static("x-request-id")))
        .layer(CorsLayer::permissive().allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS]))
        .layer(RequestIdLayer)
        .layer(middleware::from_fn(generate_request_id_mw))
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout_duration)))
        .layer(SetSensitiveHeadersLayer::new(std::iter::once(header::AUTHORIZATION)))
        .fallback(fallback)
        .into_make_service();
    app_router
}

async fn fallback(uri: Uri) -> (StatusCode, Json<FallbackResponse>) {
    (StatusCode::NOT_FOUND, Json(FallbackResponse {
        message: format!("No route for {uri}"),
    }))
}

/// Pre-flight signal: reports which capabilities are loaded so a caller
/// can avoid submitting work a degraded deployment cannot do.
async fn healthcheck(
    headers: HeaderMap,
    State(state): State<AnalysisState>,
) -> GeneralResponseResult<BaseResponse<CapabilityAvailability>> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    Ok(GeneralResponseBuilder::new()
        .status_code(StatusCode::OK)
        .body(BaseResponse {
            data: Some(state.analysis_service.availability()),
            response_message: "OK".to_string(),
            response_code: ResponseCode::response_code(ResponseCode::CodeOK),
            is_success: true,
            request_id,
        })
        .build())
}
