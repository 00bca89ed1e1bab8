#[allow(unused)]
mod support;

use axum::http::{Method, StatusCode};
use his::db::{HospitalStore, StoreOp};
use serde_json::json;
use support::*;

struct Icu {
    ward_id: i64,
    bed_a: i64,
    bed_b: i64,
}

async fn seed_icu(app: &TestApp) -> anyhow::Result<Icu> {
    let ward_id = app.seed_ward("ICU").await?;
    let room_101 = app.seed_room(ward_id, "101").await?;
    let room_102 = app.seed_room(ward_id, "102").await?;
    let bed_a = app.seed_bed(room_101, "101-A").await?;
    let bed_b = app.seed_bed(room_102, "102-A").await?;
    Ok(Icu {
        ward_id,
        bed_a,
        bed_b,
    })
}

#[tokio::test]
async fn admit_transfer_and_discharge_keep_beds_in_step() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;

            let (status, admission) = app.admit(5001, icu.bed_a).await?;
            assert_status(status, StatusCode::CREATED, "admit");
            let admission_id = id_of(&admission);
            assert_eq!(admission["status"], "Admitted");
            assert_eq!(admission["ward_id"], icu.ward_id);
            assert_eq!(app.bed_status(icu.bed_a).await?, "Occupied");

            let transfer = app
                .create(
                    "/api/v1/transfers",
                    json!({
                        "admission_id": admission_id,
                        "to_ward_id": icu.ward_id,
                        "to_bed_id": icu.bed_b,
                        "reason": "Isolation required",
                        "authorized_by": 77,
                    }),
                )
                .await?;
            assert_eq!(transfer["from_bed_id"], icu.bed_a);
            assert_eq!(transfer["to_bed_id"], icu.bed_b);
            assert_eq!(app.bed_status(icu.bed_a).await?, "Available");
            assert_eq!(app.bed_status(icu.bed_b).await?, "Occupied");

            let current = app
                .get(&format!("/api/v1/admissions/{admission_id}"))
                .await?;
            assert_eq!(current["bed_id"], icu.bed_b);

            let history = app
                .get(&format!("/api/v1/transfers?admission_id={admission_id}"))
                .await?;
            assert_eq!(history.as_array().map(Vec::len), Some(1));

            let (status, _, discharged) = app
                .request(
                    Method::POST,
                    &format!("/api/v1/admissions/{admission_id}/discharge"),
                    None,
                )
                .await?;
            assert_status(status, StatusCode::OK, "discharge");
            assert_eq!(discharged["status"], "Discharged");
            assert!(!discharged["discharge_date"].is_null());
            assert_eq!(app.bed_status(icu.bed_b).await?, "Available");

            let active = app.get("/api/v1/admissions/active").await?;
            assert_eq!(active.as_array().map(Vec::len), Some(0));
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn concurrent_admissions_to_one_bed_admit_exactly_one() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;

            let (first, second) =
                futures::future::join(app.admit(1, icu.bed_a), app.admit(2, icu.bed_a)).await;
            let (first, _) = first?;
            let (second, _) = second?;

            let mut statuses = vec![first, second];
            statuses.sort();
            assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);

            let active = app.store.list_admissions(None).await?;
            assert_eq!(active.len(), 1);
            assert_eq!(app.bed_status(icu.bed_a).await?, "Occupied");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn admission_needs_an_available_bed() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            app.admit(1, icu.bed_a).await?;

            let (status, body) = app.admit(2, icu.bed_a).await?;
            assert_status(status, StatusCode::CONFLICT, "occupied bed");
            assert_eq!(error_code(&body), "BED_UNAVAILABLE");

            for target in ["Maintenance", "Cleaning"] {
                let (status, _, _) = app
                    .request(
                        Method::PUT,
                        &format!("/api/v1/beds/{}/housekeeping", icu.bed_b),
                        Some(json!({ "status": target })),
                    )
                    .await?;
                assert_status(status, StatusCode::OK, target);

                let (status, body) = app.admit(3, icu.bed_b).await?;
                assert_status(status, StatusCode::CONFLICT, target);
                assert_eq!(error_code(&body), "BED_UNAVAILABLE");
            }

            let (status, body) = app.admit(4, 9999).await?;
            assert_status(status, StatusCode::NOT_FOUND, "missing bed");
            assert_eq!(error_code(&body), "NOT_FOUND");

            assert_eq!(app.store.list_admissions(None).await?.len(), 1);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn transfer_failures_leave_no_partial_effects() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let (_, admission) = app.admit(5001, icu.bed_a).await?;
            let admission_id = id_of(&admission);
            let request = json!({
                "admission_id": admission_id,
                "to_ward_id": icu.ward_id,
                "to_bed_id": icu.bed_b,
                "authorized_by": 77,
            });

            app.store.fail_on(StoreOp::RelocateAdmission, 1);
            let (status, _, body) = app
                .request(Method::POST, "/api/v1/transfers", Some(request.clone()))
                .await?;
            assert_status(status, StatusCode::INTERNAL_SERVER_ERROR, "relocate fault");
            assert_eq!(error_code(&body), "INTERNAL");

            // Origin is freed first, the destination is occupied last.
            app.store.fail_on(StoreOp::SetBedStatus, 2);
            let (status, _, _) = app
                .request(Method::POST, "/api/v1/transfers", Some(request.clone()))
                .await?;
            assert_status(status, StatusCode::INTERNAL_SERVER_ERROR, "bed status fault");

            assert!(app.store.list_transfers(None).await?.is_empty());
            let admission = app
                .store
                .get_admission(admission_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("admission missing"))?;
            assert_eq!(admission.bed_id, icu.bed_a);
            assert_eq!(app.bed_status(icu.bed_a).await?, "Occupied");
            assert_eq!(app.bed_status(icu.bed_b).await?, "Available");

            let (status, _, _) = app
                .request(Method::POST, "/api/v1/transfers", Some(request))
                .await?;
            assert_status(status, StatusCode::CREATED, "retry after faults");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn transfer_is_rejected_for_bad_targets_and_closed_admissions() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let other_ward = app.seed_ward("Cardiology").await?;
            let (_, first) = app.admit(1, icu.bed_a).await?;
            let (_, second) = app.admit(2, icu.bed_b).await?;
            let first_id = id_of(&first);

            let transfer = |to_ward: i64, to_bed: i64| {
                json!({
                    "admission_id": first_id,
                    "to_ward_id": to_ward,
                    "to_bed_id": to_bed,
                    "authorized_by": 77,
                })
            };

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/transfers",
                    Some(transfer(icu.ward_id, icu.bed_b)),
                )
                .await?;
            assert_status(status, StatusCode::CONFLICT, "occupied destination");
            assert_eq!(error_code(&body), "BED_UNAVAILABLE");

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/transfers",
                    Some(transfer(icu.ward_id, icu.bed_a)),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "same bed");
            assert_eq!(error_code(&body), "VALIDATION_ERROR");

            app.request(
                Method::POST,
                &format!("/api/v1/admissions/{}/discharge", id_of(&second)),
                None,
            )
            .await?;

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/transfers",
                    Some(transfer(other_ward, icu.bed_b)),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "ward mismatch");
            assert_eq!(error_code(&body), "VALIDATION_ERROR");

            app.request(
                Method::POST,
                &format!("/api/v1/admissions/{first_id}/discharge"),
                None,
            )
            .await?;

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/transfers",
                    Some(transfer(icu.ward_id, icu.bed_b)),
                )
                .await?;
            assert_status(status, StatusCode::CONFLICT, "discharged admission");
            assert_eq!(error_code(&body), "INVALID_STATE");

            assert!(app.store.list_transfers(None).await?.is_empty());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn transfer_reason_length_is_bounded() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let (_, admission) = app.admit(1, icu.bed_a).await?;

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/transfers",
                    Some(json!({
                        "admission_id": id_of(&admission),
                        "to_ward_id": icu.ward_id,
                        "to_bed_id": icu.bed_b,
                        "reason": "x".repeat(1001),
                        "authorized_by": 77,
                    })),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "oversized reason");
            assert_eq!(error_code(&body), "VALIDATION_ERROR");
            assert_eq!(app.bed_status(icu.bed_a).await?, "Occupied");
            assert_eq!(app.bed_status(icu.bed_b).await?, "Available");
            assert!(app.store.list_transfers(None).await?.is_empty());
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn discharging_twice_is_a_no_op() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let (_, admission) = app.admit(1, icu.bed_a).await?;
            let path = format!("/api/v1/admissions/{}/discharge", id_of(&admission));

            let (_, _, first) = app.request(Method::POST, &path, None).await?;

            // Housekeeping takes the freed bed before the repeated request.
            app.request(
                Method::PUT,
                &format!("/api/v1/beds/{}/housekeeping", icu.bed_a),
                Some(json!({ "status": "Cleaning" })),
            )
            .await?;

            let (status, _, second) = app.request(Method::POST, &path, None).await?;
            assert_status(status, StatusCode::OK, "second discharge");
            assert_eq!(second["discharge_date"], first["discharge_date"]);
            assert_eq!(app.bed_status(icu.bed_a).await?, "Cleaning");

            let (status, _, body) = app
                .request(Method::POST, "/api/v1/admissions/404/discharge", None)
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "unknown admission");
            assert_eq!(error_code(&body), "NOT_FOUND");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn discharge_summary_discharges_once() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let (_, admission) = app.admit(1, icu.bed_a).await?;
            let admission_id = id_of(&admission);
            let summary = json!({
                "admission_id": admission_id,
                "discharge_type": "Regular",
                "chief_complaint": "Fever",
                "diagnosis": "Pneumonia, resolved",
                "follow_up_instructions": "Clinic review in 2 weeks",
                "signed_by": 900,
            });

            let created = app
                .create("/api/v1/discharge-summaries", summary.clone())
                .await?;
            assert_eq!(created["admission_id"], admission_id);
            assert_eq!(created["discharge_type"], "Regular");

            let admission = app
                .get(&format!("/api/v1/admissions/{admission_id}"))
                .await?;
            assert_eq!(admission["status"], "Discharged");
            assert_eq!(app.bed_status(icu.bed_a).await?, "Available");

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/discharge-summaries",
                    Some(summary),
                )
                .await?;
            assert_status(status, StatusCode::CONFLICT, "duplicate summary");
            assert_eq!(error_code(&body), "CONFLICT");

            let fetched = app
                .get(&format!("/api/v1/admissions/{admission_id}/discharge-summary"))
                .await?;
            assert_eq!(fetched["id"], created["id"]);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn discharge_summary_failure_keeps_the_patient_admitted() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            let (_, admission) = app.admit(1, icu.bed_a).await?;
            let admission_id = id_of(&admission);

            app.store.fail_on(StoreOp::SetBedStatus, 1);
            let (status, _, _) = app
                .request(
                    Method::POST,
                    "/api/v1/discharge-summaries",
                    Some(json!({
                        "admission_id": admission_id,
                        "discharge_type": "AMA",
                        "diagnosis": "Left against advice",
                        "signed_by": 900,
                    })),
                )
                .await?;
            assert_status(status, StatusCode::INTERNAL_SERVER_ERROR, "bed fault");

            assert!(app
                .store
                .get_discharge_summary(admission_id)
                .await?
                .is_none());
            let (status, _, body) = app
                .request(
                    Method::GET,
                    &format!("/api/v1/admissions/{admission_id}/discharge-summary"),
                    None,
                )
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "summary lookup");
            assert_eq!(error_code(&body), "NOT_FOUND");

            let admission = app
                .get(&format!("/api/v1/admissions/{admission_id}"))
                .await?;
            assert_eq!(admission["status"], "Admitted");
            assert_eq!(app.bed_status(icu.bed_a).await?, "Occupied");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn registry_lists_and_housekeeping_rules() -> anyhow::Result<()> {
    with_test_app(|app| {
        Box::pin(async move {
            let icu = seed_icu(app).await?;
            app.admit(1, icu.bed_a).await?;

            let wards = app.get("/api/v1/wards").await?;
            assert_eq!(wards[0]["name"], "ICU");
            assert_eq!(wards[0]["rooms"].as_array().map(Vec::len), Some(2));
            assert_eq!(wards[0]["rooms"][0]["beds"][0]["bed_number"], "101-A");

            let available = app.get("/api/v1/beds?status=Available").await?;
            assert_eq!(available.as_array().map(Vec::len), Some(1));
            assert_eq!(available[0]["id"], icu.bed_b);
            let free = app.state.registry_service.available_beds().await?;
            assert_eq!(free.iter().map(|b| b.id).collect::<Vec<_>>(), vec![icu.bed_b]);
            let all = app.get("/api/v1/beds").await?;
            assert_eq!(all.as_array().map(Vec::len), Some(2));

            let (status, _, body) = app
                .request(
                    Method::PUT,
                    &format!("/api/v1/beds/{}/housekeeping", icu.bed_a),
                    Some(json!({ "status": "Cleaning" })),
                )
                .await?;
            assert_status(status, StatusCode::CONFLICT, "occupied bed housekeeping");
            assert_eq!(error_code(&body), "BED_UNAVAILABLE");

            let (status, _, body) = app
                .request(
                    Method::PUT,
                    &format!("/api/v1/beds/{}/housekeeping", icu.bed_b),
                    Some(json!({ "status": "Occupied" })),
                )
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "occupied target");
            assert_eq!(error_code(&body), "VALIDATION_ERROR");
            assert_eq!(app.bed_status(icu.bed_b).await?, "Available");

            let (status, _, body) = app
                .request(
                    Method::POST,
                    "/api/v1/rooms",
                    Some(json!({ "ward_id": 999, "room_number": "X" })),
                )
                .await?;
            assert_status(status, StatusCode::NOT_FOUND, "room in missing ward");
            assert_eq!(error_code(&body), "NOT_FOUND");

            let (status, _, body) = app
                .request(Method::POST, "/api/v1/wards", Some(json!({ "name": "" })))
                .await?;
            assert_status(status, StatusCode::BAD_REQUEST, "empty ward name");
            assert_eq!(error_code(&body), "VALIDATION_ERROR");
            Ok(())
        })
    })
    .await
}
