//! Storage traits for the ADT and pharmacy core
//!
//! `HospitalStore` serves read-only projections and opens transactions.
//! Every write goes through a `StoreTransaction`, so each workflow is one
//! all-or-nothing unit of work. Reads that feed a decision inside a workflow
//! (`lock_*`) take a row lock for the rest of the transaction.

use crate::{
    models::{
        Admission, AdmissionRow, AdmissionStatus, BatchBalance, Bed, BedStatus, DateRange,
        DischargeSummary, DischargeSummaryRow, Dispensing, DispensingRow, Medication,
        MovementEntry, NewBed, NewMedication, NewPrescription, NewRoom, NewWard, PharmacyStock,
        Prescription, Room, StockBatchRow, StockMovement, Transfer, TransferRow, Ward,
        WardOverview,
    },
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

#[async_trait]
pub trait HospitalStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    // Resource registry
    async fn list_wards(&self) -> Result<Vec<WardOverview>>;
    async fn list_beds(&self, status: Option<BedStatus>) -> Result<Vec<Bed>>;
    async fn get_bed(&self, bed_id: i64) -> Result<Option<Bed>>;

    // Admission ledger / transfer log / discharge
    async fn get_admission(&self, admission_id: i64) -> Result<Option<Admission>>;
    async fn list_admissions(&self, status: Option<AdmissionStatus>) -> Result<Vec<Admission>>;
    /// Newest first.
    async fn list_transfers(&self, admission_id: Option<i64>) -> Result<Vec<Transfer>>;
    async fn get_discharge_summary(&self, admission_id: i64) -> Result<Option<DischargeSummary>>;

    // Formulary
    async fn get_medication(&self, medication_id: i64) -> Result<Option<Medication>>;
    async fn list_medications(&self) -> Result<Vec<Medication>>;
    /// Active prescriptions without any dispensing.
    async fn pending_prescriptions(&self) -> Result<Vec<Prescription>>;

    // Stock ledger
    /// Batches with quantity > 0, earliest expiry first.
    async fn list_available_stock(&self, medication_id: i64) -> Result<Vec<PharmacyStock>>;
    /// Every batch of the medication, empty ones included.
    async fn list_batches(&self, medication_id: i64) -> Result<Vec<PharmacyStock>>;
    /// Batches at or below their reorder level.
    async fn list_low_stock(&self) -> Result<Vec<PharmacyStock>>;

    // Dispensing / movement journal
    /// Newest first.
    async fn dispensing_history(&self, patient_id: i64) -> Result<Vec<Dispensing>>;
    /// Newest first.
    async fn list_movements(
        &self,
        medication_id: i64,
        range: DateRange,
    ) -> Result<Vec<StockMovement>>;
    /// Every batch of the medication with the sum of its journal quantities,
    /// read from a single snapshot.
    async fn journal_balances(&self, medication_id: i64) -> Result<Vec<BatchBalance>>;

    async fn health_check(&self) -> Result<serde_json::Value>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    // Resource registry
    async fn insert_ward(&mut self, ward: &NewWard, created_at: DateTime<Utc>) -> Result<Ward>;
    async fn get_ward(&mut self, ward_id: i64) -> Result<Option<Ward>>;
    async fn insert_room(&mut self, room: &NewRoom, created_at: DateTime<Utc>) -> Result<Room>;
    async fn get_room(&mut self, room_id: i64) -> Result<Option<Room>>;
    async fn insert_bed(
        &mut self,
        bed: &NewBed,
        ward_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Bed>;
    async fn lock_bed(&mut self, bed_id: i64) -> Result<Option<Bed>>;
    async fn set_bed_status(&mut self, bed_id: i64, status: BedStatus) -> Result<()>;

    // Admission ledger
    async fn insert_admission(&mut self, row: &AdmissionRow) -> Result<Admission>;
    async fn lock_admission(&mut self, admission_id: i64) -> Result<Option<Admission>>;
    async fn close_admission(
        &mut self,
        admission_id: i64,
        discharged_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn relocate_admission(
        &mut self,
        admission_id: i64,
        ward_id: i64,
        bed_id: i64,
    ) -> Result<()>;

    // Transfer log
    async fn insert_transfer(&mut self, row: &TransferRow) -> Result<Transfer>;

    // Discharge workflow
    async fn find_discharge_summary(
        &mut self,
        admission_id: i64,
    ) -> Result<Option<DischargeSummary>>;
    async fn insert_discharge_summary(
        &mut self,
        row: &DischargeSummaryRow,
    ) -> Result<DischargeSummary>;

    // Formulary
    async fn insert_medication(
        &mut self,
        medication: &NewMedication,
        created_at: DateTime<Utc>,
    ) -> Result<Medication>;
    async fn find_medication(&mut self, medication_id: i64) -> Result<Option<Medication>>;
    async fn insert_prescription(
        &mut self,
        prescription: &NewPrescription,
        start_date: DateTime<Utc>,
    ) -> Result<Prescription>;
    async fn find_prescription(&mut self, prescription_id: i64) -> Result<Option<Prescription>>;

    // Stock ledger
    /// Inserts the batch with quantity 0; stock only arrives through
    /// `post_movement`.
    async fn insert_stock_batch(
        &mut self,
        row: &StockBatchRow,
        created_at: DateTime<Utc>,
    ) -> Result<PharmacyStock>;
    async fn lock_stock(&mut self, stock_id: i64) -> Result<Option<PharmacyStock>>;
    /// Non-empty batches of a medication, earliest expiry first (ties by id).
    async fn lock_stock_batches(&mut self, medication_id: i64) -> Result<Vec<PharmacyStock>>;
    /// Non-empty batches that expired before `today`, across all medications.
    async fn lock_expired_batches(&mut self, today: NaiveDate) -> Result<Vec<PharmacyStock>>;

    /// Apply `entry.quantity` to the batch and append the matching journal row.
    ///
    /// The only way batch quantities change. Fails with `InsufficientStock`
    /// rather than let a batch go negative.
    async fn post_movement(
        &mut self,
        stock_id: i64,
        entry: &MovementEntry,
    ) -> Result<(PharmacyStock, StockMovement)>;
    async fn movement_reference_exists(&mut self, reference: &str) -> Result<bool>;

    // Dispensing
    async fn insert_dispensing(&mut self, row: &DispensingRow) -> Result<Dispensing>;
    /// Serialises returns of the same dispensing.
    async fn lock_dispensing(&mut self, dispensing_id: i64) -> Result<Option<Dispensing>>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
