use crate::api::handlers::adt;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn adt_routes() -> Router<AppState> {
    Router::new()
        // Resource registry
        .route("/wards", get(adt::list_wards).post(adt::create_ward))
        .route("/rooms", post(adt::create_room))
        .route("/beds", get(adt::list_beds).post(adt::create_bed))
        .route("/beds/:id/housekeeping", put(adt::set_housekeeping_status))
        // Admission ledger
        .route("/admissions", post(adt::admit))
        .route("/admissions/active", get(adt::list_active_admissions))
        .route("/admissions/:id", get(adt::get_admission))
        .route("/admissions/:id/discharge", post(adt::discharge))
        .route(
            "/admissions/:id/discharge-summary",
            get(adt::get_discharge_summary),
        )
        // Transfer log
        .route(
            "/transfers",
            get(adt::list_transfers).post(adt::transfer),
        )
        // Discharge workflow
        .route(
            "/discharge-summaries",
            post(adt::create_discharge_summary),
        )
}
