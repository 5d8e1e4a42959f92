//! HTTP request handlers for the pipeline's read surface and the two
//! submission operations.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use galley_core::store::{self, keys};
use galley_core::submit::{AssetRequest, EditorialRequest, SubmitError};

use crate::state::AppContext;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "galley-server",
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    report_id: String,
}

/// `GET /analyze/status?reportId=...`: the editorial progress record
/// verbatim, or 404 with `{"status":"not_started"}`.
pub async fn editorial_status(
    State(ctx): State<AppContext>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.shared.progress().read_editorial(&query.report_id) {
        Ok(Some(record)) => Ok(Json(
            serde_json::to_value(record).unwrap_or_else(|_| json!({})),
        )),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"status": "not_started"})),
        )),
        Err(err) => Err(internal(err)),
    }
}

/// `GET /assets/status?reportId=...`: the asset progress record verbatim,
/// or 404.
pub async fn asset_status(
    State(ctx): State<AppContext>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match ctx.shared.progress().read_asset(&query.report_id) {
        Ok(Some(record)) => Ok(Json(
            serde_json::to_value(record).unwrap_or_else(|_| json!({})),
        )),
        Ok(None) => Err((StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})))),
        Err(err) => Err(internal(err)),
    }
}

#[derive(Debug, Deserialize)]
pub struct BundleQuery {
    id: String,
}

/// `GET /assets?id=...`: the combined bundle, or 404 before completion.
pub async fn asset_bundle(
    State(ctx): State<AppContext>,
    Query(query): Query<BundleQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let manuscript_key = match ctx.shared.submit().resolve(&query.id) {
        Ok(Some(key)) => key,
        Ok(None) => return Err((StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})))),
        Err(err) => return Err(internal(err)),
    };
    match store::get_json::<Value>(&ctx.shared.store, &keys::asset_bundle(&manuscript_key)) {
        Ok(Some(bundle)) => Ok(Json(bundle)),
        Ok(None) => Err((StatusCode::NOT_FOUND, Json(json!({"error": "not_found"})))),
        Err(err) => Err(internal(err)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    manuscript_key: String,
    genre: String,
    #[serde(default)]
    style_guide: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    report_id: String,
}

/// `POST /analyze`: begin editorial analysis; returns the report id the
/// client polls with.
pub async fn submit_analysis(
    State(ctx): State<AppContext>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), (StatusCode, Json<Value>)> {
    let report_id = ctx
        .shared
        .submit()
        .submit_editorial(&EditorialRequest {
            manuscript_key: request.manuscript_key,
            genre: request.genre,
            style_guide: request.style_guide,
        })
        .map_err(submit_error)?;
    Ok((StatusCode::ACCEPTED, Json(AnalyzeResponse { report_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsRequest {
    report_id: String,
    genre: String,
    #[serde(default)]
    author_data: Value,
    #[serde(default)]
    series_data: Value,
}

/// `POST /assets`: begin asset generation for a completed analysis.
pub async fn submit_assets(
    State(ctx): State<AppContext>,
    Json(request): Json<AssetsRequest>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    ctx.shared
        .submit()
        .submit_assets(&AssetRequest {
            report_id: request.report_id,
            genre: request.genre,
            author_data: request.author_data,
            series_data: request.series_data,
        })
        .map_err(submit_error)?;
    Ok(StatusCode::ACCEPTED)
}

fn submit_error(err: SubmitError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        SubmitError::UnknownReportId(_) => StatusCode::NOT_FOUND,
        SubmitError::MissingDevelopmental { .. } => StatusCode::CONFLICT,
        SubmitError::Storage(_) | SubmitError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()})))
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    tracing::error!("request failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal"})),
    )
}
