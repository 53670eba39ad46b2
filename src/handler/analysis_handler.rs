use axum::extract::{Multipart, State};
use axum::debug_handler;
use bytes::Bytes;
use ecs_logger::extra_fields;
use http::{HeaderMap, StatusCode};
use log::{error, info};

use crate::error::errors::ResponseCode;
use crate::logger::logger::LoggerExtraFields;
use crate::models::analysis_model::AnalysisInput;
use crate::pipeline::report::report::DiagnosticReport;
use crate::response::common_response::{BaseResponse, GeneralResponseBuilder, GeneralResponseResult};
use crate::state::analysis_state::AnalysisState;

fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[debug_handler(state=AnalysisState)]
pub async fn analyze(
    headers: HeaderMap,
    State(state): State<AnalysisState>,
    mut payload: Multipart,
) -> GeneralResponseResult<BaseResponse<DiagnosticReport>> {
    let request_id = request_id_from(&headers);
    let mut im_bytes: Bytes = Bytes::new();

    extra_fields::set_extra_fields(LoggerExtraFields {
        request_id: request_id.clone(),
    })
    .unwrap();

    info!("received analysis request");

    loop {
        let field = match payload.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                error!("failed to read multipart payload: {e}");
                return Ok(GeneralResponseBuilder::new()
                    .status_code(StatusCode::BAD_REQUEST)
                    .body(BaseResponse {
                        data: None,
                        response_message: "failed to process image".to_string(),
                        response_code: ResponseCode::response_code(ResponseCode::ErrorCodeInput),
                        is_success: false,
                        request_id: request_id.clone(),
                    })
                    .build());
            }
        };

        if field.name() == Some("image") {
            match field.bytes().await {
                Ok(data) => {
                    im_bytes = data;
                }
                Err(e) => {
                    error!("failed to retrieve image from request: {e}");
                    return Ok(GeneralResponseBuilder::new()
                        .status_code(StatusCode::BAD_REQUEST)
                        .body(BaseResponse {
                            data: None,
                            response_message: "failed to process image".to_string(),
                            response_code: ResponseCode::response_code(ResponseCode::ErrorCodeInput),
                            is_success: false,
                            request_id: request_id.clone(),
                        })
                        .build());
                }
            }
        }
    }

    if im_bytes.is_empty() {
        return Ok(GeneralResponseBuilder::new()
            .status_code(StatusCode::BAD_REQUEST)
            .body(BaseResponse {
                data: None,
                response_message: "no image provided".to_string(),
                response_code: ResponseCode::response_code(ResponseCode::ErrorCodeInput),
                is_success: false,
                request_id: request_id.clone(),
            })
            .build());
    }

    let input = AnalysisInput { im_bytes };

    let report = match state.analysis_service.analyze_image(input).await {
        Ok(report) => report,
        Err(e) => {
            error!("failed to analyze image: {e}");
            return Ok(GeneralResponseBuilder::new()
                .status_code(StatusCode::INTERNAL_SERVER_ERROR)
                .body(BaseResponse {
                    data: None,
                    response_message: "internal server error".to_string(),
                    response_code: ResponseCode::response_code(ResponseCode::ErrorCodeServer),
                    is_success: false,
                    request_id: request_id.clone(),
                })
                .build());
        }
    };
    info!("completed analyzing image");

    extra_fields::clear_extra_fields();
    Ok(GeneralResponseBuilder::new()
        .status_code(StatusCode::OK)
        .body(BaseResponse {
            data: Some(report),
            response_message: "OK".to_string(),
            response_code: ResponseCode::response_code(ResponseCode::CodeOK),
            is_success: true,
            request_id,
        })
        .build())
}
