//! Workflows racing each other against a live PostgreSQL database.
//!
//! Skipped unless `DATABASE_URL` is set. Every test seeds its own rows, so the
//! suite can run repeatedly against the same database.

use axum::http::StatusCode;
use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use his::{
    config::{Config, StoreBackend},
    db::{HospitalStore, StoreTransaction},
    models::{
        AddStockRequest, AdjustStockRequest, AdmitRequest, BedStatus, DateRange,
        DispenseRequest, Dispensing, MovementEntry, MovementType, NewBed, NewMedication,
        NewPrescription, NewRoom, NewWard, ReturnRequest, StockBatchRow,
    },
    state::{AppState, AppStateOptions},
    Error,
};
use rust_decimal::Decimal;
use uuid::Uuid;

async fn postgres_state() -> anyhow::Result<Option<AppState>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return Ok(None);
    };

    let mut config = Config::default();
    config.database.backend = StoreBackend::Postgres;
    config.database.url = url;
    config.database.pool_max_size = 16;
    let state = AppState::new_with_options(config, AppStateOptions::default()).await?;
    Ok(Some(state))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// A patient id no earlier run has used.
fn fresh_patient() -> i64 {
    (Uuid::new_v4().as_u128() >> 66) as i64
}

async fn seed_bed(state: &AppState) -> anyhow::Result<i64> {
    let registry = &state.registry_service;
    let ward = registry
        .create_ward(NewWard {
            name: unique("Ward"),
            department: Some("Medicine".to_string()),
            ward_type: None,
            description: None,
        })
        .await?;
    let room = registry
        .create_room(NewRoom {
            ward_id: ward.id,
            room_number: unique("R"),
            room_type: None,
            description: None,
        })
        .await?;
    let bed = registry
        .create_bed(NewBed {
            room_id: room.id,
            bed_number: "A".to_string(),
            bed_type: None,
            notes: None,
        })
        .await?;
    Ok(bed.id)
}

/// A new medication with one batch of `quantity`; returns (medication, batch).
async fn seed_stock(state: &AppState, quantity: i32) -> anyhow::Result<(i64, i64)> {
    let medication = state
        .formulary_service
        .create_medication(NewMedication {
            name: unique("Medication"),
            generic_name: None,
            form: Some("tablet".to_string()),
            strength: None,
            unit: None,
            category: None,
        })
        .await?;
    let batch = state
        .stock_service
        .add_stock(AddStockRequest {
            medication_id: medication.id,
            quantity,
            batch_number: unique("LOT"),
            expiry_date: (Utc::now() + Duration::days(180)).date_naive(),
            location: None,
            cost_price: Decimal::ZERO,
            selling_price: Decimal::ZERO,
            reorder_level: None,
            notes: None,
        })
        .await?;
    Ok((medication.id, batch.id))
}

async fn dispense(
    state: &AppState,
    medication_id: i64,
    quantity: i32,
) -> anyhow::Result<his::Result<Dispensing>> {
    let patient_id = fresh_patient();
    let prescription = state
        .formulary_service
        .record_prescription(NewPrescription {
            patient_id,
            medication_id,
            quantity,
        })
        .await?;
    Ok(state
        .dispensing_service
        .dispense(DispenseRequest {
            prescription_id: prescription.id,
            patient_id,
            medication_id,
            quantity,
            dispensed_by: 42,
            instructions: None,
            notes: None,
        })
        .await)
}

async fn batch_quantity(
    state: &AppState,
    medication_id: i64,
    stock_id: i64,
) -> anyhow::Result<i32> {
    state
        .store
        .list_batches(medication_id)
        .await?
        .into_iter()
        .find(|b| b.id == stock_id)
        .map(|b| b.quantity)
        .ok_or_else(|| anyhow::anyhow!("stock batch {stock_id} missing"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_admissions_fill_a_bed_once() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let bed_id = seed_bed(&state).await?;

    let attempts = (0..8).map(|_| {
        let service = state.admission_service.clone();
        tokio::spawn(async move {
            service
                .admit(AdmitRequest {
                    patient_id: fresh_patient(),
                    bed_id,
                    diagnosis: "Sepsis".to_string(),
                    admitting_doctor_id: 900,
                    notes: None,
                })
                .await
        })
    });

    let mut admitted = 0;
    for outcome in join_all(attempts).await {
        match outcome? {
            Ok(_) => admitted += 1,
            Err(e) => assert_eq!(e.status_code(), StatusCode::CONFLICT, "{e}"),
        }
    }
    assert_eq!(admitted, 1);

    let bed = state
        .store
        .get_bed(bed_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("bed {bed_id} missing"))?;
    assert_eq!(bed.status, BedStatus::Occupied);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_dispensings_never_oversell() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, stock_id) = seed_stock(&state, 10).await?;

    let attempts = (0..6).map(|_| {
        let state = state.clone();
        tokio::spawn(async move { dispense(&state, medication_id, 3).await })
    });

    let mut dispensed = 0;
    for outcome in join_all(attempts).await {
        match outcome?? {
            Ok(_) => dispensed += 1,
            Err(e) => assert_eq!(e.code(), "INSUFFICIENT_STOCK", "{e}"),
        }
    }
    assert_eq!(dispensed, 3);
    assert_eq!(batch_quantity(&state, medication_id, stock_id).await?, 1);

    let report = state.journal_service.reconcile(medication_id).await?;
    assert!(report.is_consistent(), "{report:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_returns_restock_once() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, stock_id) = seed_stock(&state, 50).await?;
    let dispensing = dispense(&state, medication_id, 5).await??;
    assert_eq!(batch_quantity(&state, medication_id, stock_id).await?, 45);

    let attempts = (0..8).map(|_| {
        let service = state.dispensing_service.clone();
        let dispensing_id = dispensing.id;
        tokio::spawn(async move {
            service
                .return_dispensing(
                    dispensing_id,
                    ReturnRequest {
                        reason: "Ward stock returned".to_string(),
                        performed_by: 42,
                    },
                )
                .await
        })
    });

    let mut returned = 0;
    for outcome in join_all(attempts).await {
        match outcome? {
            Ok(_) => returned += 1,
            Err(e) => assert!(matches!(e, Error::Conflict(_)), "{e}"),
        }
    }
    assert_eq!(returned, 1);
    assert_eq!(batch_quantity(&state, medication_id, stock_id).await?, 50);

    let report = state.journal_service.reconcile(medication_id).await?;
    assert!(report.is_consistent(), "{report:?}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconciliation_under_dispensing_traffic_sees_no_drift() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, _) = seed_stock(&state, 200).await?;

    let dispensings: Vec<_> = (0..20)
        .map(|_| {
            let state = state.clone();
            tokio::spawn(async move { dispense(&state, medication_id, 2).await })
        })
        .collect();
    let reports: Vec<_> = (0..40)
        .map(|_| {
            let service = state.journal_service.clone();
            tokio::spawn(async move { service.reconcile(medication_id).await })
        })
        .collect();

    for outcome in join_all(dispensings).await {
        outcome???;
    }
    for outcome in join_all(reports).await {
        let report = outcome??;
        assert!(report.is_consistent(), "{report:?}");
    }
    Ok(())
}

#[tokio::test]
async fn journal_index_refuses_a_second_return_posting() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, stock_id) = seed_stock(&state, 10).await?;
    let entry = MovementEntry {
        movement_type: MovementType::Return,
        quantity: 2,
        reference: unique("RET-DISP"),
        reason: None,
        performed_by: Some(42),
        performed_at: Utc::now(),
    };

    let mut tx = state.store.begin().await?;
    tx.post_movement(stock_id, &entry).await?;
    tx.commit().await?;

    let mut tx = state.store.begin().await?;
    let second = tx.post_movement(stock_id, &entry).await;
    tx.rollback().await?;
    assert!(matches!(second, Err(Error::Conflict(_))), "{second:?}");
    assert_eq!(batch_quantity(&state, medication_id, stock_id).await?, 12);
    Ok(())
}

#[tokio::test]
async fn overflowing_adjustment_is_a_validation_error() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, stock_id) = seed_stock(&state, 20).await?;

    let outcome = state
        .stock_service
        .adjust_stock(
            stock_id,
            AdjustStockRequest {
                quantity_delta: i32::MAX,
                reason: "Count".to_string(),
                performed_by: 42,
            },
        )
        .await;
    match outcome {
        Err(e) => assert_eq!(e.status_code(), StatusCode::BAD_REQUEST, "{e}"),
        Ok(movement) => panic!("overflow accepted: {movement:?}"),
    }
    assert_eq!(batch_quantity(&state, medication_id, stock_id).await?, 20);
    Ok(())
}

#[tokio::test]
async fn movement_dates_are_utc_calendar_days() -> anyhow::Result<()> {
    let Some(state) = postgres_state().await? else {
        return Ok(());
    };
    let (medication_id, _) = seed_stock(&state, 5).await?;
    let day = NaiveDate::from_ymd_opt(2030, 3, 14).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let late_evening = day
        .and_hms_opt(23, 30, 0)
        .ok_or_else(|| anyhow::anyhow!("bad time"))?
        .and_utc();

    let mut tx = state.store.begin().await?;
    let batch = tx
        .insert_stock_batch(
            &StockBatchRow {
                medication_id,
                batch_number: unique("LOT"),
                expiry_date: day + Duration::days(365),
                location: None,
                cost_price: Decimal::ZERO,
                selling_price: Decimal::ZERO,
                reorder_level: 0,
                notes: None,
            },
            late_evening,
        )
        .await?;
    tx.post_movement(
        batch.id,
        &MovementEntry {
            movement_type: MovementType::Purchase,
            quantity: 3,
            reference: "STOCK-ADD".to_string(),
            reason: None,
            performed_by: None,
            performed_at: late_evening,
        },
    )
    .await?;
    tx.commit().await?;

    let on_the_day = state
        .journal_service
        .get_stock_movements(
            medication_id,
            DateRange {
                start_date: Some(day),
                end_date: Some(day),
            },
        )
        .await?;
    assert_eq!(on_the_day.len(), 1);
    assert_eq!(on_the_day[0].stock_id, batch.id);

    let next_day = state
        .journal_service
        .get_stock_movements(
            medication_id,
            DateRange {
                start_date: Some(day + Duration::days(1)),
                end_date: None,
            },
        )
        .await?;
    assert!(next_day.iter().all(|m| m.stock_id != batch.id));
    Ok(())
}
