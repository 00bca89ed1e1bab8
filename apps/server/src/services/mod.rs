//! Business logic layer
//!
//! Each workflow opens one store transaction, checks its preconditions
//! against locked rows, writes, and commits. Any error rolls the whole unit
//! back, so a failed workflow leaves nothing behind.

pub mod admission;
pub mod discharge;
pub mod dispensing;
pub mod formulary;
pub mod journal;
pub mod registry;
pub mod stock;
pub mod transfer;

pub use admission::AdmissionService;
pub use discharge::DischargeService;
pub use dispensing::DispensingService;
pub use formulary::FormularyService;
pub use journal::JournalService;
pub use registry::RegistryService;
pub use stock::StockService;
pub use transfer::TransferService;

use crate::{db::StoreTransaction, Result};

/// Commit `tx` if the workflow succeeded, otherwise roll it back and hand the
/// workflow error to the caller.
pub(crate) async fn finish<T>(tx: Box<dyn StoreTransaction>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}
