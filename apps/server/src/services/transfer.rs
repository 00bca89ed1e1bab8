//! Transfer log: moves an active admission from one bed to another

use crate::{
    db::{HospitalStore, StoreTransaction},
    models::{AdmissionStatus, BedStatus, Transfer, TransferRequest, TransferRow},
    services::finish,
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use validator::Validate;

pub struct TransferService {
    store: Arc<dyn HospitalStore>,
}

impl TransferService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    /// Move an admitted patient to another Available bed.
    ///
    /// The transfer row, the admission's new location and both bed statuses
    /// are written in one transaction.
    pub async fn transfer(&self, request: TransferRequest) -> Result<Transfer> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = transfer_in(tx.as_mut(), &request, Utc::now()).await;
        let transfer = finish(tx, outcome).await?;

        tracing::info!(
            admission_id = transfer.admission_id,
            from_bed_id = transfer.from_bed_id,
            to_bed_id = transfer.to_bed_id,
            to_ward_id = transfer.to_ward_id,
            "Patient transferred"
        );
        Ok(transfer)
    }

    /// Transfers, newest first, optionally for one admission.
    pub async fn list_transfers(&self, admission_id: Option<i64>) -> Result<Vec<Transfer>> {
        self.store.list_transfers(admission_id).await
    }
}

async fn transfer_in(
    tx: &mut dyn StoreTransaction,
    request: &TransferRequest,
    now: DateTime<Utc>,
) -> Result<Transfer> {
    let admission = tx
        .lock_admission(request.admission_id)
        .await?
        .ok_or_else(|| Error::not_found("Admission", request.admission_id))?;

    if admission.status != AdmissionStatus::Admitted {
        tracing::warn!(admission_id = admission.id, "Transfer of a closed admission");
        return Err(Error::InvalidState(format!(
            "Admission {} is {} and cannot be transferred",
            admission.id, admission.status
        )));
    }
    if admission.bed_id == request.to_bed_id {
        return Err(Error::Validation(format!(
            "Admission {} already occupies bed {}",
            admission.id, request.to_bed_id
        )));
    }

    // Lock both beds in id order so concurrent transfers cannot deadlock.
    let (first, second) = if admission.bed_id < request.to_bed_id {
        (admission.bed_id, request.to_bed_id)
    } else {
        (request.to_bed_id, admission.bed_id)
    };
    let first_bed = tx.lock_bed(first).await?;
    let second_bed = tx.lock_bed(second).await?;
    let (origin, destination) = if first == admission.bed_id {
        (first_bed, second_bed)
    } else {
        (second_bed, first_bed)
    };

    if origin.is_none() {
        return Err(Error::not_found("Bed", admission.bed_id));
    }
    let destination = destination.ok_or_else(|| Error::not_found("Bed", request.to_bed_id))?;

    if destination.ward_id != request.to_ward_id {
        return Err(Error::Validation(format!(
            "Bed {} does not belong to ward {}",
            destination.id, request.to_ward_id
        )));
    }
    if destination.status != BedStatus::Available {
        tracing::warn!(bed_id = destination.id, status = %destination.status, "Destination bed is not available");
        return Err(Error::BedUnavailable {
            bed_id: destination.id,
            status: destination.status,
        });
    }

    let transfer = tx
        .insert_transfer(&TransferRow {
            admission_id: admission.id,
            from_ward_id: admission.ward_id,
            from_bed_id: admission.bed_id,
            to_ward_id: destination.ward_id,
            to_bed_id: destination.id,
            transfer_date: now,
            reason: request.reason.clone(),
            authorized_by: request.authorized_by,
        })
        .await?;

    tx.relocate_admission(admission.id, destination.ward_id, destination.id)
        .await?;
    tx.set_bed_status(admission.bed_id, BedStatus::Available)
        .await?;
    tx.set_bed_status(destination.id, BedStatus::Occupied)
        .await?;

    Ok(transfer)
}
