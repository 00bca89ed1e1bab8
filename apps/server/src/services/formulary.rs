//! Medication catalog and the prescriptions the pharmacy dispenses against

use crate::{
    db::HospitalStore,
    models::{Medication, NewMedication, NewPrescription, Prescription},
    services::finish,
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

pub struct FormularyService {
    store: Arc<dyn HospitalStore>,
}

impl FormularyService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    pub async fn create_medication(&self, medication: NewMedication) -> Result<Medication> {
        medication.validate()?;
        let mut tx = self.store.begin().await?;
        let outcome = tx.insert_medication(&medication, Utc::now()).await;
        let medication = finish(tx, outcome).await?;
        tracing::info!(medication_id = medication.id, name = %medication.name, "Medication added to catalog");
        Ok(medication)
    }

    pub async fn get_medication(&self, medication_id: i64) -> Result<Medication> {
        self.store
            .get_medication(medication_id)
            .await?
            .ok_or_else(|| Error::not_found("Medication", medication_id))
    }

    pub async fn list_medications(&self) -> Result<Vec<Medication>> {
        self.store.list_medications().await
    }

    /// Record an active prescription so it shows up in the dispensing queue.
    pub async fn record_prescription(&self, prescription: NewPrescription) -> Result<Prescription> {
        prescription.validate()?;
        let mut tx = self.store.begin().await?;
        let outcome = match tx.find_medication(prescription.medication_id).await {
            Ok(Some(_)) => tx.insert_prescription(&prescription, Utc::now()).await,
            Ok(None) => Err(Error::not_found("Medication", prescription.medication_id)),
            Err(e) => Err(e),
        };
        let prescription = finish(tx, outcome).await?;
        tracing::info!(
            prescription_id = prescription.id,
            patient_id = prescription.patient_id,
            medication_id = prescription.medication_id,
            "Prescription recorded"
        );
        Ok(prescription)
    }
}
