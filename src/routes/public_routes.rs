use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::dto::lookup_dto::{
    LookupAndSubmitRequest, LookupQuery, NationalIdQuery, RequestStatusResponse, SubmitRequest,
    SubmitResponse, TrackingCodePath,
};
use crate::dto::ApiResponse;
use crate::models::VehicleRecord;
use crate::services::Classification;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_public_router() -> Router<AppState> {
    Router::new()
        .route("/lookup", get(lookup))
        .route("/lookup/national-id", get(lookup_by_national_id))
        .route("/requests", post(submit))
        .route("/requests/lookup-and-submit", post(lookup_and_submit))
        .route("/requests/:tracking_code", get(request_status))
}

async fn lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<ApiResponse<Classification>>, AppError> {
    query.validate()?;
    let classification = state.lookup.lookup(&query.plate, &query.hint()).await?;
    Ok(Json(ApiResponse::success(classification)))
}

async fn lookup_by_national_id(
    State(state): State<AppState>,
    Query(query): Query<NationalIdQuery>,
) -> Result<Json<ApiResponse<Vec<VehicleRecord>>>, AppError> {
    query.validate()?;
    let vehicles = state.lookup.lookup_by_national_id(&query.national_id).await?;
    Ok(Json(ApiResponse::success(vehicles)))
}

async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitResponse>>), AppError> {
    request.validate()?;
    let saved = state.lookup.submit(request.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            SubmitResponse::from(&saved),
            "Solicitud registrada".to_string(),
        )),
    ))
}

#[derive(Debug, Serialize)]
struct LookupAndSubmitResponse {
    classification: Classification,
    request: SubmitResponse,
}

async fn lookup_and_submit(
    State(state): State<AppState>,
    Json(request): Json<LookupAndSubmitRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LookupAndSubmitResponse>>), AppError> {
    request.validate()?;
    let hint = request.hint();
    let (classification, saved) = state
        .lookup
        .lookup_and_submit(&request.plate, &hint, request.fields)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(LookupAndSubmitResponse {
            classification,
            request: SubmitResponse::from(&saved),
        })),
    ))
}

async fn request_status(
    State(state): State<AppState>,
    Path(path): Path<TrackingCodePath>,
) -> Result<Json<ApiResponse<RequestStatusResponse>>, AppError> {
    path.validate()?;
    let request = state.lookup.request_status(&path.tracking_code).await?;
    Ok(Json(ApiResponse::success(request.into())))
}
