use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::dto::admin_dto::{
    CreateBatchRequest, ImportQuery, LoginRequest, RecordsQuery, RequestListQuery,
};
use crate::dto::ApiResponse;
use crate::middleware::{admin_auth_middleware, AuthenticatedAdmin};
use crate::models::{Batch, DataFile, FormNumber, RecordPage, RequestStats, UpdateRequest};
use crate::services::{AdminSession, MirrorStatsSnapshot};
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Tamaño máximo de un archivo importado
pub const IMPORT_BODY_LIMIT: usize = 64 * 1024 * 1024;

pub fn create_admin_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/batches", get(list_batches).post(create_batch))
        .route("/batches/active", get(active_batch))
        .route("/batches/:id", get(get_batch).delete(delete_batch))
        .route(
            "/batches/:id/import",
            post(import_file).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
        .route("/batches/:id/activate", post(activate_batch))
        .route("/batches/:id/files", get(list_files))
        .route("/files/:file_id", delete(delete_file))
        .route("/batches/:id/records", get(batch_records))
        .route("/requests", get(list_requests))
        .route("/requests/stats", get(request_stats))
        .route("/requests/:tracking_code", get(get_request))
        .route("/requests/:tracking_code/review", post(review_request))
        .route("/requests/:tracking_code/export", post(mark_exported))
        .route("/export/:form_number", post(export_form))
        .route("/mirror/stats", get(mirror_stats))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    Router::new().route("/login", post(login)).merge(protected)
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AdminSession>>, AppError> {
    request.validate()?;
    let session = state.auth.login(&request.username, &request.password)?;
    Ok(Json(ApiResponse::success(session)))
}

async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Batch>>), AppError> {
    request.validate()?;
    let batch = state
        .admin
        .create_batch(&request.label, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(batch))))
}

async fn list_batches(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Batch>>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.list_batches().await?)))
}

async fn active_batch(State(state): State<AppState>) -> Result<Json<ApiResponse<Batch>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.active_batch().await?)))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Batch>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.get_batch(id).await?)))
}

async fn delete_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.admin.delete_batch(id).await?;
    Ok(Json(ApiResponse::message(format!("Lote {} eliminado", id))))
}

async fn import_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<DataFile>>), AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("empty upload".to_string()));
    }
    let file = state
        .admin
        .import_file(id, query.kind, &query.filename(), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(file))))
}

async fn activate_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Batch>>, AppError> {
    let batch = state.admin.activate(id).await?;
    Ok(Json(ApiResponse::success_with_message(
        batch,
        format!("Lote {} activado", id),
    )))
}

async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<DataFile>>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.list_files(id).await?)))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<i64>,
) -> Result<Json<ApiResponse<DataFile>>, AppError> {
    let file = state.admin.delete_file(file_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        file,
        format!("Archivo {} eliminado", file_id),
    )))
}

async fn batch_records(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<ApiResponse<RecordPage>>, AppError> {
    let page = state
        .admin
        .batch_records(id, query.search.as_deref(), query.limit(), query.offset())
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<ApiResponse<Vec<UpdateRequest>>>, AppError> {
    let filter = query.to_filter()?;
    Ok(Json(ApiResponse::success(state.admin.list_requests(&filter).await?)))
}

async fn request_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RequestStats>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.request_stats().await?)))
}

async fn get_request(
    State(state): State<AppState>,
    Path(tracking_code): Path<String>,
) -> Result<Json<ApiResponse<UpdateRequest>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.get_request(&tracking_code).await?)))
}

async fn review_request(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedAdmin>,
    Path(tracking_code): Path<String>,
) -> Result<Json<ApiResponse<UpdateRequest>>, AppError> {
    let request = state.admin.review_request(&tracking_code, &admin.username).await?;
    Ok(Json(ApiResponse::success(request)))
}

async fn mark_exported(
    State(state): State<AppState>,
    Path(tracking_code): Path<String>,
) -> Result<Json<ApiResponse<UpdateRequest>>, AppError> {
    Ok(Json(ApiResponse::success(state.admin.mark_exported(&tracking_code).await?)))
}

async fn export_form(
    State(state): State<AppState>,
    Path(form_number): Path<u8>,
    Query(query): Query<RequestListQuery>,
) -> Result<Response, AppError> {
    let form = FormNumber::new(form_number).map_err(AppError::BadRequest)?;
    let output = state.admin.export(form, query.to_filter()?).await?;
    let disposition = format!("attachment; filename=\"{}\"", output.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(output.into_stream()),
    )
        .into_response())
}

async fn mirror_stats(
    State(state): State<AppState>,
) -> Json<ApiResponse<MirrorStatsSnapshot>> {
    Json(ApiResponse::success(state.ledger.mirror().stats()))
}
