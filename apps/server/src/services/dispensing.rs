//! Dispensing workflow
//!
//! Batches are consumed first-expired-first-out, but a single dispensing
//! never spans batches: the request is served from the earliest-expiring
//! batch that holds the whole quantity. When stock is sufficient in total
//! but fragmented, the request fails with `NoSingleBatchCovers`.

use crate::{
    config::PharmacyConfig,
    db::{HospitalStore, StoreTransaction},
    models::{
        DispenseRequest, Dispensing, DispensingRow, MovementEntry, MovementType, PharmacyStock,
        Prescription, ReturnRequest, StockMovement,
    },
    services::finish,
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use validator::Validate;

pub struct DispensingService {
    store: Arc<dyn HospitalStore>,
    policy: PharmacyConfig,
}

impl DispensingService {
    pub fn new(store: Arc<dyn HospitalStore>, policy: PharmacyConfig) -> Self {
        Self { store, policy }
    }

    pub async fn dispense(&self, request: DispenseRequest) -> Result<Dispensing> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = self.dispense_in(tx.as_mut(), &request, Utc::now()).await;
        let dispensing = finish(tx, outcome).await?;

        tracing::info!(
            dispensing_id = dispensing.id,
            prescription_id = dispensing.prescription_id,
            medication_id = dispensing.medication_id,
            stock_id = dispensing.stock_id,
            batch_number = %dispensing.batch_number,
            quantity = dispensing.quantity_dispensed,
            "Medication dispensed"
        );
        Ok(dispensing)
    }

    async fn dispense_in(
        &self,
        tx: &mut dyn StoreTransaction,
        request: &DispenseRequest,
        now: DateTime<Utc>,
    ) -> Result<Dispensing> {
        let prescription = tx
            .find_prescription(request.prescription_id)
            .await?
            .ok_or_else(|| Error::not_found("Prescription", request.prescription_id))?;
        check_prescription(&prescription, request)?;

        let today = now.date_naive();
        let batches: Vec<PharmacyStock> = tx
            .lock_stock_batches(request.medication_id)
            .await?
            .into_iter()
            .filter(|b| !(self.policy.exclude_expired_batches && b.is_expired(today)))
            .collect();

        let batch = select_batch(&batches, request.medication_id, request.quantity)?;

        let dispensing = tx
            .insert_dispensing(&DispensingRow {
                prescription_id: request.prescription_id,
                patient_id: request.patient_id,
                medication_id: request.medication_id,
                quantity_dispensed: request.quantity,
                stock_id: batch.id,
                batch_number: batch.batch_number.clone(),
                dispensed_by: request.dispensed_by,
                dispensed_at: now,
                instructions: request.instructions.clone(),
                notes: request.notes.clone(),
            })
            .await?;

        tx.post_movement(
            batch.id,
            &MovementEntry {
                movement_type: MovementType::Dispensing,
                quantity: -request.quantity,
                reference: Dispensing::journal_reference(dispensing.id),
                reason: None,
                performed_by: Some(request.dispensed_by),
                performed_at: now,
            },
        )
        .await?;

        Ok(dispensing)
    }

    /// Active prescriptions that have not been dispensed yet.
    pub async fn get_dispensing_queue(&self) -> Result<Vec<Prescription>> {
        self.store.pending_prescriptions().await
    }

    pub async fn get_patient_dispensing_history(&self, patient_id: i64) -> Result<Vec<Dispensing>> {
        self.store.dispensing_history(patient_id).await
    }

    /// Put a dispensed quantity back on its original batch.
    pub async fn return_dispensing(
        &self,
        dispensing_id: i64,
        request: ReturnRequest,
    ) -> Result<StockMovement> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = return_in(tx.as_mut(), dispensing_id, &request, Utc::now()).await;
        let movement = finish(tx, outcome).await?;

        tracing::info!(
            dispensing_id,
            stock_id = movement.stock_id,
            batch_number = %movement.batch_number,
            quantity = movement.quantity,
            "Dispensing returned to stock"
        );
        Ok(movement)
    }
}

fn check_prescription(prescription: &Prescription, request: &DispenseRequest) -> Result<()> {
    if prescription.patient_id != request.patient_id {
        return Err(Error::Validation(format!(
            "Prescription {} belongs to another patient",
            prescription.id
        )));
    }
    if prescription.medication_id != request.medication_id {
        return Err(Error::Validation(format!(
            "Prescription {} is for medication {}",
            prescription.id, prescription.medication_id
        )));
    }
    if !prescription.is_active() {
        return Err(Error::Validation(format!(
            "Prescription {} is {}",
            prescription.id, prescription.status
        )));
    }
    Ok(())
}

/// Pick the batch to dispense from. `batches` must be dispensable and in
/// expiry order.
fn select_batch(
    batches: &[PharmacyStock],
    medication_id: i64,
    requested: i32,
) -> Result<&PharmacyStock> {
    let available: i64 = batches.iter().map(|b| i64::from(b.quantity)).sum();
    if available < i64::from(requested) {
        tracing::warn!(medication_id, requested, available, "Insufficient stock");
        return Err(Error::InsufficientStock {
            medication_id,
            requested,
            available,
        });
    }

    batches
        .iter()
        .find(|b| b.quantity >= requested)
        .ok_or_else(|| {
            let largest_batch = batches.iter().map(|b| b.quantity).max().unwrap_or(0);
            tracing::warn!(medication_id, requested, largest_batch, "No single batch covers request");
            Error::NoSingleBatchCovers {
                medication_id,
                requested,
                largest_batch,
            }
        })
}

async fn return_in(
    tx: &mut dyn StoreTransaction,
    dispensing_id: i64,
    request: &ReturnRequest,
    now: DateTime<Utc>,
) -> Result<StockMovement> {
    let dispensing = tx
        .lock_dispensing(dispensing_id)
        .await?
        .ok_or_else(|| Error::not_found("Dispensing", dispensing_id))?;

    let reference = Dispensing::return_reference(dispensing.id);
    if tx.movement_reference_exists(&reference).await? {
        return Err(Error::Conflict(format!(
            "Dispensing {dispensing_id} has already been returned"
        )));
    }
    if tx.lock_stock(dispensing.stock_id).await?.is_none() {
        return Err(Error::not_found("Stock batch", dispensing.stock_id));
    }

    let (_, movement) = tx
        .post_movement(
            dispensing.stock_id,
            &MovementEntry {
                movement_type: MovementType::Return,
                quantity: dispensing.quantity_dispensed,
                reference,
                reason: Some(request.reason.clone()),
                performed_by: Some(request.performed_by),
                performed_at: now,
            },
        )
        .await?;
    Ok(movement)
}
