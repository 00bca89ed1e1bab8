//! Movement journal reads and reconciliation

use crate::{
    db::HospitalStore,
    models::{BatchDrift, DateRange, ReconciliationReport, StockMovement},
    Error, Result,
};
use std::sync::Arc;

pub struct JournalService {
    store: Arc<dyn HospitalStore>,
}

impl JournalService {
    pub fn new(store: Arc<dyn HospitalStore>) -> Self {
        Self { store }
    }

    /// Movements of a medication, newest first. Both ends of the range are
    /// inclusive calendar dates.
    pub async fn get_stock_movements(
        &self,
        medication_id: i64,
        range: DateRange,
    ) -> Result<Vec<StockMovement>> {
        if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
            if start > end {
                return Err(Error::Validation(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        self.store.list_movements(medication_id, range).await
    }

    /// Compare every batch quantity of a medication with the sum of its
    /// journal movements.
    pub async fn reconcile(&self, medication_id: i64) -> Result<ReconciliationReport> {
        if self.store.get_medication(medication_id).await?.is_none() {
            return Err(Error::not_found("Medication", medication_id));
        }

        let balances = self.store.journal_balances(medication_id).await?;

        let drifted: Vec<BatchDrift> = balances
            .iter()
            .filter(|b| b.journal_quantity != i64::from(b.batch.quantity))
            .map(|b| BatchDrift {
                stock_id: b.batch.id,
                batch_number: b.batch.batch_number.clone(),
                stock_quantity: b.batch.quantity,
                journal_quantity: b.journal_quantity,
            })
            .collect();

        if !drifted.is_empty() {
            tracing::warn!(
                medication_id,
                drifted = drifted.len(),
                "Stock quantities disagree with the movement journal"
            );
        }

        Ok(ReconciliationReport {
            medication_id,
            batches_checked: balances.len(),
            drifted,
        })
    }
}
