use crate::api::handlers::pharmacy;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn pharmacy_routes() -> Router<AppState> {
    Router::new()
        // Formulary
        .route(
            "/medications",
            get(pharmacy::list_medications).post(pharmacy::create_medication),
        )
        .route("/medications/:id", get(pharmacy::get_medication))
        .route("/prescriptions", post(pharmacy::record_prescription))
        // Stock ledger
        .route("/pharmacy/stock", post(pharmacy::add_stock))
        .route("/pharmacy/stock/low", get(pharmacy::get_low_stock_alerts))
        .route(
            "/pharmacy/stock/write-off-expired",
            post(pharmacy::write_off_expired),
        )
        .route("/pharmacy/stock/:id", get(pharmacy::get_available_stock))
        .route("/pharmacy/stock/:id/adjust", post(pharmacy::adjust_stock))
        // Dispensing
        .route("/pharmacy/dispense", post(pharmacy::dispense))
        .route(
            "/pharmacy/dispensings/:id/return",
            post(pharmacy::return_dispensing),
        )
        .route(
            "/pharmacy/dispensing-queue",
            get(pharmacy::get_dispensing_queue),
        )
        .route(
            "/pharmacy/history/:patient_id",
            get(pharmacy::get_patient_history),
        )
        // Movement journal
        .route(
            "/pharmacy/movements/:medication_id",
            get(pharmacy::get_stock_movements),
        )
        .route(
            "/pharmacy/reconciliation/:medication_id",
            get(pharmacy::reconcile),
        )
}
