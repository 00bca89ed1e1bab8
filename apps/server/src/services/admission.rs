//! Admission ledger: binds a patient stay to exactly one bed

use crate::{
    db::{HospitalStore, StoreTransaction},
    models::{Admission, AdmissionRow, AdmissionStatus, AdmitRequest},
    services::{
        finish,
        registry::{occupy_bed, vacate_bed},
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use validator::Validate;

pub struct AdmissionService {
    store: Arc<dyn HospitalStore>,
}

impl AdmissionService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    /// Admit a patient into an Available bed.
    pub async fn admit(&self, request: AdmitRequest) -> Result<Admission> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = admit_in(tx.as_mut(), &request, Utc::now()).await;
        let admission = finish(tx, outcome).await?;

        tracing::info!(
            admission_id = admission.id,
            patient_id = admission.patient_id,
            bed_id = admission.bed_id,
            ward_id = admission.ward_id,
            "Patient admitted"
        );
        Ok(admission)
    }

    /// Close an admission and free its bed. Discharging an already
    /// discharged admission succeeds without changing anything.
    pub async fn discharge(&self, admission_id: i64) -> Result<Admission> {
        let mut tx = self.store.begin().await?;
        let outcome = discharge_in(tx.as_mut(), admission_id, Utc::now()).await;
        let admission = finish(tx, outcome).await?;

        tracing::info!(
            admission_id,
            bed_id = admission.bed_id,
            "Patient discharged"
        );
        Ok(admission)
    }

    pub async fn list_active_admissions(&self) -> Result<Vec<Admission>> {
        self.store
            .list_admissions(Some(AdmissionStatus::Admitted))
            .await
    }

    pub async fn get_admission(&self, admission_id: i64) -> Result<Admission> {
        self.store
            .get_admission(admission_id)
            .await?
            .ok_or_else(|| Error::not_found("Admission", admission_id))
    }
}

async fn admit_in(
    tx: &mut dyn StoreTransaction,
    request: &AdmitRequest,
    now: DateTime<Utc>,
) -> Result<Admission> {
    let bed = occupy_bed(tx, request.bed_id).await?;
    tx.insert_admission(&AdmissionRow {
        patient_id: request.patient_id,
        ward_id: bed.ward_id,
        bed_id: bed.id,
        admission_date: now,
        admitting_doctor_id: request.admitting_doctor_id,
        diagnosis: request.diagnosis.clone(),
        notes: request.notes.clone(),
    })
    .await
}

/// Discharge step shared with the discharge-summary workflow.
pub(crate) async fn discharge_in(
    tx: &mut dyn StoreTransaction,
    admission_id: i64,
    now: DateTime<Utc>,
) -> Result<Admission> {
    let mut admission = tx
        .lock_admission(admission_id)
        .await?
        .ok_or_else(|| Error::not_found("Admission", admission_id))?;

    if admission.status == AdmissionStatus::Discharged {
        tracing::debug!(admission_id, "Admission already discharged");
        return Ok(admission);
    }

    tx.close_admission(admission_id, now).await?;
    vacate_bed(tx, admission.bed_id).await?;

    admission.status = AdmissionStatus::Discharged;
    admission.discharge_date = Some(now);
    Ok(admission)
}
