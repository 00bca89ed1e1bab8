//! Discharge workflow: clinical summary plus discharge in one unit of work

use crate::{
    db::{HospitalStore, StoreTransaction},
    models::{DischargeSummary, DischargeSummaryRequest, DischargeSummaryRow},
    services::{admission::discharge_in, finish},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use validator::Validate;

pub struct DischargeService {
    store: Arc<dyn HospitalStore>,
}

impl DischargeService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    /// Record the discharge summary and discharge the admission.
    ///
    /// Either both happen or neither does.
    pub async fn create_discharge_summary(
        &self,
        request: DischargeSummaryRequest,
    ) -> Result<DischargeSummary> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = summarise_in(tx.as_mut(), request, Utc::now()).await;
        let summary = finish(tx, outcome).await?;

        tracing::info!(
            admission_id = summary.admission_id,
            discharge_type = summary.discharge_type.as_str(),
            signed_by = summary.signed_by,
            "Discharge summary recorded"
        );
        Ok(summary)
    }

    pub async fn get_discharge_summary(&self, admission_id: i64) -> Result<DischargeSummary> {
        self.store
            .get_discharge_summary(admission_id)
            .await?
            .ok_or_else(|| Error::not_found("Discharge summary for admission", admission_id))
    }
}

async fn summarise_in(
    tx: &mut dyn StoreTransaction,
    request: DischargeSummaryRequest,
    now: DateTime<Utc>,
) -> Result<DischargeSummary> {
    let admission_id = request.admission_id;
    if tx.lock_admission(admission_id).await?.is_none() {
        return Err(Error::not_found("Admission", admission_id));
    }
    if tx.find_discharge_summary(admission_id).await?.is_some() {
        return Err(Error::Conflict(format!(
            "Admission {admission_id} already has a discharge summary"
        )));
    }

    let summary = tx
        .insert_discharge_summary(&DischargeSummaryRow::from_request(request, now))
        .await?;
    discharge_in(tx, admission_id, now).await?;
    Ok(summary)
}
