//! Ward, bed, admission, transfer and discharge handlers

use crate::{
    models::{
        AdmitRequest, BedStatus, DischargeSummaryRequest, HousekeepingRequest, NewBed, NewRoom,
        NewWard, TransferRequest,
    },
    state::AppState,
    Result,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BedQuery {
    pub status: Option<BedStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TransferQuery {
    pub admission_id: Option<i64>,
}

/// POST /api/v1/wards
pub async fn create_ward(
    State(state): State<AppState>,
    Json(ward): Json<NewWard>,
) -> Result<Response> {
    let ward = state.registry_service.create_ward(ward).await?;
    Ok((StatusCode::CREATED, Json(ward)).into_response())
}

/// GET /api/v1/wards
pub async fn list_wards(State(state): State<AppState>) -> Result<Response> {
    let wards = state.registry_service.list_wards().await?;
    Ok((StatusCode::OK, Json(wards)).into_response())
}

/// POST /api/v1/rooms
pub async fn create_room(
    State(state): State<AppState>,
    Json(room): Json<NewRoom>,
) -> Result<Response> {
    let room = state.registry_service.create_room(room).await?;
    Ok((StatusCode::CREATED, Json(room)).into_response())
}

/// POST /api/v1/beds
pub async fn create_bed(
    State(state): State<AppState>,
    Json(bed): Json<NewBed>,
) -> Result<Response> {
    let bed = state.registry_service.create_bed(bed).await?;
    Ok((StatusCode::CREATED, Json(bed)).into_response())
}

/// GET /api/v1/beds?status=Available
pub async fn list_beds(
    State(state): State<AppState>,
    Query(query): Query<BedQuery>,
) -> Result<Response> {
    let beds = state.registry_service.list_beds(query.status).await?;
    Ok((StatusCode::OK, Json(beds)).into_response())
}

/// PUT /api/v1/beds/:id/housekeeping
pub async fn set_housekeeping_status(
    State(state): State<AppState>,
    Path(bed_id): Path<i64>,
    Json(request): Json<HousekeepingRequest>,
) -> Result<Response> {
    let bed = state
        .registry_service
        .set_housekeeping_status(bed_id, request.status)
        .await?;
    Ok((StatusCode::OK, Json(bed)).into_response())
}

/// POST /api/v1/admissions
pub async fn admit(
    State(state): State<AppState>,
    Json(request): Json<AdmitRequest>,
) -> Result<Response> {
    let admission = state.admission_service.admit(request).await?;
    Ok((StatusCode::CREATED, Json(admission)).into_response())
}

/// GET /api/v1/admissions/active
pub async fn list_active_admissions(State(state): State<AppState>) -> Result<Response> {
    let admissions = state.admission_service.list_active_admissions().await?;
    Ok((StatusCode::OK, Json(admissions)).into_response())
}

/// GET /api/v1/admissions/:id
pub async fn get_admission(
    State(state): State<AppState>,
    Path(admission_id): Path<i64>,
) -> Result<Response> {
    let admission = state.admission_service.get_admission(admission_id).await?;
    Ok((StatusCode::OK, Json(admission)).into_response())
}

/// POST /api/v1/admissions/:id/discharge
pub async fn discharge(
    State(state): State<AppState>,
    Path(admission_id): Path<i64>,
) -> Result<Response> {
    let admission = state.admission_service.discharge(admission_id).await?;
    Ok((StatusCode::OK, Json(admission)).into_response())
}

/// POST /api/v1/transfers
pub async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Response> {
    let transfer = state.transfer_service.transfer(request).await?;
    Ok((StatusCode::CREATED, Json(transfer)).into_response())
}

/// GET /api/v1/transfers?admission_id=
pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransferQuery>,
) -> Result<Response> {
    let transfers = state
        .transfer_service
        .list_transfers(query.admission_id)
        .await?;
    Ok((StatusCode::OK, Json(transfers)).into_response())
}

/// POST /api/v1/discharge-summaries
pub async fn create_discharge_summary(
    State(state): State<AppState>,
    Json(request): Json<DischargeSummaryRequest>,
) -> Result<Response> {
    let summary = state
        .discharge_service
        .create_discharge_summary(request)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

/// GET /api/v1/admissions/:id/discharge-summary
pub async fn get_discharge_summary(
    State(state): State<AppState>,
    Path(admission_id): Path<i64>,
) -> Result<Response> {
    let summary = state
        .discharge_service
        .get_discharge_summary(admission_id)
        .await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}
