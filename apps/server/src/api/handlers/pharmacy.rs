//! Formulary, stock, dispensing and movement journal handlers

use crate::{
    models::{
        AddStockRequest, AdjustStockRequest, DateRange, DispenseRequest, NewMedication,
        NewPrescription, ReturnRequest, WriteOffRequest,
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
use chrono::Utc;
use serde_json::json;

/// POST /api/v1/medications
pub async fn create_medication(
    State(state): State<AppState>,
    Json(medication): Json<NewMedication>,
) -> Result<Response> {
    let medication = state.formulary_service.create_medication(medication).await?;
    Ok((StatusCode::CREATED, Json(medication)).into_response())
}

/// GET /api/v1/medications
pub async fn list_medications(State(state): State<AppState>) -> Result<Response> {
    let medications = state.formulary_service.list_medications().await?;
    Ok((StatusCode::OK, Json(medications)).into_response())
}

/// GET /api/v1/medications/:id
pub async fn get_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
) -> Result<Response> {
    let medication = state.formulary_service.get_medication(medication_id).await?;
    Ok((StatusCode::OK, Json(medication)).into_response())
}

/// POST /api/v1/prescriptions
pub async fn record_prescription(
    State(state): State<AppState>,
    Json(prescription): Json<NewPrescription>,
) -> Result<Response> {
    let prescription = state
        .formulary_service
        .record_prescription(prescription)
        .await?;
    Ok((StatusCode::CREATED, Json(prescription)).into_response())
}

/// POST /api/v1/pharmacy/stock
pub async fn add_stock(
    State(state): State<AppState>,
    Json(request): Json<AddStockRequest>,
) -> Result<Response> {
    let batch = state.stock_service.add_stock(request).await?;
    Ok((StatusCode::CREATED, Json(batch)).into_response())
}

/// GET /api/v1/pharmacy/stock/:id
///
/// `id` is the medication id.
pub async fn get_available_stock(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
) -> Result<Response> {
    let batches = state.stock_service.get_available_stock(medication_id).await?;
    Ok((StatusCode::OK, Json(batches)).into_response())
}

/// GET /api/v1/pharmacy/stock/low
pub async fn get_low_stock_alerts(State(state): State<AppState>) -> Result<Response> {
    let batches = state.stock_service.get_low_stock_alerts().await?;
    Ok((StatusCode::OK, Json(batches)).into_response())
}

/// POST /api/v1/pharmacy/stock/:id/adjust
///
/// `id` is the stock batch id.
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path(stock_id): Path<i64>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Response> {
    let movement = state.stock_service.adjust_stock(stock_id, request).await?;
    Ok((StatusCode::CREATED, Json(movement)).into_response())
}

/// POST /api/v1/pharmacy/stock/write-off-expired
pub async fn write_off_expired(
    State(state): State<AppState>,
    Json(request): Json<WriteOffRequest>,
) -> Result<Response> {
    let movements = state
        .stock_service
        .write_off_expired(Utc::now().date_naive(), request.performed_by)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "written_off": movements.len(),
            "movements": movements,
        })),
    )
        .into_response())
}

/// POST /api/v1/pharmacy/dispense
pub async fn dispense(
    State(state): State<AppState>,
    Json(request): Json<DispenseRequest>,
) -> Result<Response> {
    let dispensing = state.dispensing_service.dispense(request).await?;
    Ok((StatusCode::CREATED, Json(dispensing)).into_response())
}

/// POST /api/v1/pharmacy/dispensings/:id/return
pub async fn return_dispensing(
    State(state): State<AppState>,
    Path(dispensing_id): Path<i64>,
    Json(request): Json<ReturnRequest>,
) -> Result<Response> {
    let movement = state
        .dispensing_service
        .return_dispensing(dispensing_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)).into_response())
}

/// GET /api/v1/pharmacy/dispensing-queue
pub async fn get_dispensing_queue(State(state): State<AppState>) -> Result<Response> {
    let queue = state.dispensing_service.get_dispensing_queue().await?;
    Ok((StatusCode::OK, Json(queue)).into_response())
}

/// GET /api/v1/pharmacy/history/:patient_id
pub async fn get_patient_history(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<Response> {
    let history = state
        .dispensing_service
        .get_patient_dispensing_history(patient_id)
        .await?;
    Ok((StatusCode::OK, Json(history)).into_response())
}

/// GET /api/v1/pharmacy/movements/:medication_id?start_date=&end_date=
pub async fn get_stock_movements(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
    Query(range): Query<DateRange>,
) -> Result<Response> {
    let movements = state
        .journal_service
        .get_stock_movements(medication_id, range)
        .await?;
    Ok((StatusCode::OK, Json(movements)).into_response())
}

/// GET /api/v1/pharmacy/reconciliation/:medication_id
pub async fn reconcile(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
) -> Result<Response> {
    let report = state.journal_service.reconcile(medication_id).await?;
    let consistent = report.is_consistent();
    Ok((
        StatusCode::OK,
        Json(json!({
            "consistent": consistent,
            "report": report,
        })),
    )
        .into_response())
}
