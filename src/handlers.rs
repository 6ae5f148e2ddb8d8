// handlers.rs

use crate::{
    commands::{self, DeviceCommand},
    discovery::{ScanState, ScanTrigger},
    error::{AppError, ErrorBody},
    models::{
        AppState, CastRequest, CommandResponse, ControlRequest, Device, SelectDeviceRequest,
        SelectionResponse, StatusReport,
    },
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::permanent("/static/") }))
        .route("/api/scan", post(trigger_scan).get(scan_status))
        .route("/api/devices", get(list_devices))
        .route(
            "/api/selection",
            get(current_selection)
                .post(select_device)
                .delete(clear_selection),
        )
        .route("/api/cast", post(cast_media))
        .route("/api/controls", post(media_controls))
        .route("/api/status", get(device_status))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/scan",
    tag = "discovery",
    responses(
        (status = 202, description = "Scan started in the background", body = ScanTrigger),
        (status = 409, description = "Scan running or cooling down", body = ScanTrigger),
    )
)]
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let trigger = state.discovery.trigger_scan();
    let code = if trigger.started {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    (code, Json(trigger))
}

#[utoipa::path(
    get,
    path = "/api/scan",
    tag = "discovery",
    responses((status = 200, body = ScanState))
)]
pub async fn scan_status(State(state): State<Arc<AppState>>) -> Json<ScanState> {
    Json(state.discovery.scan_state())
}

#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "discovery",
    responses((status = 200, body = [Device]))
)]
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<Device>> {
    Json(state.registry.list().await.to_vec())
}

#[utoipa::path(
    get,
    path = "/api/selection",
    tag = "selection",
    responses(
        (status = 200, body = Device),
        (status = 204, description = "Nothing selected"),
    )
)]
pub async fn current_selection(State(state): State<Arc<AppState>>) -> Response {
    match state.selection.current().await {
        Some(device) => Json(device).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/selection",
    tag = "selection",
    request_body = SelectDeviceRequest,
    responses(
        (status = 200, body = SelectionResponse),
        (status = 404, body = ErrorBody),
    )
)]
pub async fn select_device(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectDeviceRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    payload.validate()?;
    let outcome = state.executor.select_with_volume(payload.device.trim()).await?;
    Ok(Json(SelectionResponse {
        message: "Device selected".to_string(),
        device: outcome.device,
        volume: outcome.volume,
        volume_error: outcome.volume_error,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/selection",
    tag = "selection",
    responses((status = 204, description = "Selection cleared"))
)]
pub async fn clear_selection(State(state): State<Arc<AppState>>) -> StatusCode {
    if let Some(device) = state.selection.clear().await {
        info!(address = %device.address, "Selection cleared");
    }
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/api/cast",
    tag = "control",
    request_body = CastRequest,
    responses(
        (status = 200, body = CommandResponse),
        (status = 400, body = ErrorBody),
        (status = 409, description = "No device selected", body = ErrorBody),
        (status = 502, body = ErrorBody),
        (status = 504, body = ErrorBody),
    )
)]
pub async fn cast_media(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CastRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    payload.validate()?;
    let outcome = state
        .executor
        .execute(DeviceCommand::Cast {
            url: payload.url.trim().to_string(),
        })
        .await?;
    Ok(Json(CommandResponse {
        message: format!("Casting {} to {}", payload.url.trim(), outcome.device.name),
        action: outcome.command.action().to_string(),
        device: outcome.device,
        output: outcome.output,
    }))
}

#[utoipa::path(
    post,
    path = "/api/controls",
    tag = "control",
    request_body = ControlRequest,
    responses(
        (status = 200, body = CommandResponse),
        (status = 400, body = ErrorBody),
        (status = 409, description = "No device selected", body = ErrorBody),
        (status = 502, body = ErrorBody),
        (status = 504, body = ErrorBody),
    )
)]
pub async fn media_controls(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ControlRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    payload.validate()?;
    let command = commands::command_from_request(&payload)?;
    let outcome = state.executor.execute(command).await?;
    let action = outcome.command.action();
    Ok(Json(CommandResponse {
        message: format!("Action '{action}' executed successfully"),
        action: action.to_string(),
        device: outcome.device,
        output: outcome.output,
    }))
}

#[utoipa::path(
    get,
    path = "/api/status",
    tag = "control",
    responses(
        (status = 200, body = StatusReport),
        (status = 204, description = "Nothing selected"),
        (status = 502, body = ErrorBody),
        (status = 504, body = ErrorBody),
    )
)]
pub async fn device_status(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    match state.executor.status().await {
        Ok((device, status)) => Ok(Json(StatusReport { device, status }).into_response()),
        Err(AppError::NoDeviceSelected) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(e),
    }
}
