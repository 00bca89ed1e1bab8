//! In-process store.
//!
//! Keeps every table in one `Tables` value behind a tokio mutex. A transaction
//! takes the mutex for its whole lifetime and works on a copy of the tables:
//! `commit` swaps the copy in, `rollback` (or dropping the transaction) throws
//! it away. Transactions are therefore fully serialised, which gives the same
//! outcome the row locks give in PostgreSQL.
//!
//! Used by the test-suite and by `database.backend = "memory"` for demos.
//! `fail_on` injects a storage failure at a chosen write so tests can check
//! that a workflow leaves no partial effects behind.

use super::traits::{HospitalStore, StoreTransaction};
use crate::{
    models::{
        Admission, AdmissionRow, AdmissionStatus, BatchBalance, Bed, BedStatus, DateRange,
        DischargeSummary, DischargeSummaryRow, Dispensing, DispensingRow, DispensingStatus,
        Medication, MovementEntry, MovementType, NewBed, NewMedication, NewPrescription, NewRoom,
        NewWard, PharmacyStock, Prescription, Room, RoomOverview, StockBatchRow, StockMovement,
        Transfer, TransferRow, Ward, WardOverview,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Store writes that can be made to fail with `InMemoryStore::fail_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    SetBedStatus,
    InsertAdmission,
    CloseAdmission,
    RelocateAdmission,
    InsertTransfer,
    InsertDischargeSummary,
    InsertStockBatch,
    PostMovement,
    InsertDispensing,
    Commit,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    remaining: usize,
}

type Faults = Arc<StdMutex<Vec<Fault>>>;

#[derive(Debug, Clone, Default)]
struct Sequences {
    wards: i64,
    rooms: i64,
    beds: i64,
    admissions: i64,
    transfers: i64,
    summaries: i64,
    medications: i64,
    prescriptions: i64,
    stock: i64,
    dispensings: i64,
    movements: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    seq: Sequences,
    wards: BTreeMap<i64, Ward>,
    rooms: BTreeMap<i64, Room>,
    beds: BTreeMap<i64, Bed>,
    admissions: BTreeMap<i64, Admission>,
    transfers: BTreeMap<i64, Transfer>,
    summaries: BTreeMap<i64, DischargeSummary>,
    medications: BTreeMap<i64, Medication>,
    prescriptions: BTreeMap<i64, Prescription>,
    stock: BTreeMap<i64, PharmacyStock>,
    dispensings: BTreeMap<i64, Dispensing>,
    movements: Vec<StockMovement>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Faults,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `occurrence`-th next call of `op` (1-based) fail with an
    /// internal storage error.
    pub fn fail_on(&self, op: StoreOp, occurrence: usize) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.push(Fault {
            op,
            remaining: occurrence.max(1),
        });
    }

    /// Bypass the journal and overwrite a batch quantity, as a faulty import
    /// or a manual database edit would.
    pub async fn corrupt_stock_quantity(&self, stock_id: i64, quantity: i32) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let batch = tables
            .stock
            .get_mut(&stock_id)
            .ok_or_else(|| Error::not_found("Stock batch", stock_id))?;
        batch.quantity = quantity;
        Ok(())
    }
}

fn trip(faults: &Faults, op: StoreOp) -> Result<()> {
    let mut faults = faults.lock().unwrap_or_else(|e| e.into_inner());
    let Some(index) = faults.iter().position(|f| f.op == op) else {
        return Ok(());
    };
    faults[index].remaining -= 1;
    if faults[index].remaining == 0 {
        faults.remove(index);
        return Err(Error::Internal(format!("injected storage failure at {op:?}")));
    }
    Ok(())
}

fn newest_first_movements(mut rows: Vec<StockMovement>) -> Vec<StockMovement> {
    rows.sort_by(|a, b| b.performed_at.cmp(&a.performed_at).then(b.id.cmp(&a.id)));
    rows
}

#[async_trait]
impl HospitalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn list_wards(&self) -> Result<Vec<WardOverview>> {
        let tables = self.tables.lock().await;
        let overview = tables
            .wards
            .values()
            .map(|ward| WardOverview {
                ward: ward.clone(),
                rooms: tables
                    .rooms
                    .values()
                    .filter(|room| room.ward_id == ward.id)
                    .map(|room| RoomOverview {
                        room: room.clone(),
                        beds: tables
                            .beds
                            .values()
                            .filter(|bed| bed.room_id == room.id)
                            .cloned()
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Ok(overview)
    }

    async fn list_beds(&self, status: Option<BedStatus>) -> Result<Vec<Bed>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .beds
            .values()
            .filter(|bed| status.map_or(true, |s| bed.status == s))
            .cloned()
            .collect())
    }

    async fn get_bed(&self, bed_id: i64) -> Result<Option<Bed>> {
        Ok(self.tables.lock().await.beds.get(&bed_id).cloned())
    }

    async fn get_admission(&self, admission_id: i64) -> Result<Option<Admission>> {
        Ok(self.tables.lock().await.admissions.get(&admission_id).cloned())
    }

    async fn list_admissions(&self, status: Option<AdmissionStatus>) -> Result<Vec<Admission>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Admission> = tables
            .admissions
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.admission_date.cmp(&a.admission_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_transfers(&self, admission_id: Option<i64>) -> Result<Vec<Transfer>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|t| admission_id.map_or(true, |id| t.admission_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.transfer_date.cmp(&a.transfer_date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn get_discharge_summary(&self, admission_id: i64) -> Result<Option<DischargeSummary>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .summaries
            .values()
            .find(|s| s.admission_id == admission_id)
            .cloned())
    }

    async fn get_medication(&self, medication_id: i64) -> Result<Option<Medication>> {
        Ok(self.tables.lock().await.medications.get(&medication_id).cloned())
    }

    async fn list_medications(&self) -> Result<Vec<Medication>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Medication> = tables.medications.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn pending_prescriptions(&self) -> Result<Vec<Prescription>> {
        let tables = self.tables.lock().await;
        let dispensed: HashSet<i64> = tables
            .dispensings
            .values()
            .map(|d| d.prescription_id)
            .collect();
        let mut rows: Vec<Prescription> = tables
            .prescriptions
            .values()
            .filter(|p| p.is_active() && !dispensed.contains(&p.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_available_stock(&self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        let tables = self.tables.lock().await;
        Ok(fefo_batches(&tables, medication_id))
    }

    async fn list_batches(&self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .stock
            .values()
            .filter(|b| b.medication_id == medication_id)
            .cloned()
            .collect())
    }

    async fn list_low_stock(&self) -> Result<Vec<PharmacyStock>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<PharmacyStock> = tables
            .stock
            .values()
            .filter(|b| b.quantity <= b.reorder_level)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.quantity.cmp(&b.quantity).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn dispensing_history(&self, patient_id: i64) -> Result<Vec<Dispensing>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Dispensing> = tables
            .dispensings
            .values()
            .filter(|d| d.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.dispensed_at.cmp(&a.dispensed_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_movements(
        &self,
        medication_id: i64,
        range: DateRange,
    ) -> Result<Vec<StockMovement>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .movements
            .iter()
            .filter(|m| m.medication_id == medication_id && range.contains(m.performed_at))
            .cloned()
            .collect();
        Ok(newest_first_movements(rows))
    }

    async fn journal_balances(&self, medication_id: i64) -> Result<Vec<BatchBalance>> {
        let tables = self.tables.lock().await;
        let mut totals: HashMap<i64, i64> = HashMap::new();
        for movement in tables
            .movements
            .iter()
            .filter(|m| m.medication_id == medication_id)
        {
            *totals.entry(movement.stock_id).or_insert(0) += i64::from(movement.quantity);
        }
        Ok(tables
            .stock
            .values()
            .filter(|b| b.medication_id == medication_id)
            .map(|batch| BatchBalance {
                batch: batch.clone(),
                journal_quantity: totals.get(&batch.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<serde_json::Value> {
        let tables = self.tables.lock().await;
        Ok(serde_json::json!({
            "backend": "memory",
            "wards": tables.wards.len(),
            "stock_batches": tables.stock.len(),
        }))
    }
}

fn fefo_batches(tables: &Tables, medication_id: i64) -> Vec<PharmacyStock> {
    let mut rows: Vec<PharmacyStock> = tables
        .stock
        .values()
        .filter(|b| b.medication_id == medication_id && b.quantity > 0)
        .cloned()
        .collect();
    rows.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.id.cmp(&b.id)));
    rows
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Faults,
}

impl InMemoryTransaction {
    fn check(&self, op: StoreOp) -> Result<()> {
        trip(&self.faults, op)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_ward(&mut self, ward: &NewWard, created_at: DateTime<Utc>) -> Result<Ward> {
        let id = next_id(&mut self.working.seq.wards);
        let row = Ward {
            id,
            name: ward.name.clone(),
            department: ward.department.clone(),
            ward_type: ward.ward_type.clone(),
            description: ward.description.clone(),
            created_at,
        };
        self.working.wards.insert(id, row.clone());
        Ok(row)
    }

    async fn get_ward(&mut self, ward_id: i64) -> Result<Option<Ward>> {
        Ok(self.working.wards.get(&ward_id).cloned())
    }

    async fn insert_room(&mut self, room: &NewRoom, created_at: DateTime<Utc>) -> Result<Room> {
        let id = next_id(&mut self.working.seq.rooms);
        let row = Room {
            id,
            ward_id: room.ward_id,
            room_number: room.room_number.clone(),
            room_type: room.room_type.clone(),
            description: room.description.clone(),
            created_at,
        };
        self.working.rooms.insert(id, row.clone());
        Ok(row)
    }

    async fn get_room(&mut self, room_id: i64) -> Result<Option<Room>> {
        Ok(self.working.rooms.get(&room_id).cloned())
    }

    async fn insert_bed(
        &mut self,
        bed: &NewBed,
        ward_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Bed> {
        let id = next_id(&mut self.working.seq.beds);
        let row = Bed {
            id,
            room_id: bed.room_id,
            ward_id,
            bed_number: bed.bed_number.clone(),
            status: BedStatus::Available,
            bed_type: bed.bed_type.clone(),
            notes: bed.notes.clone(),
            created_at,
        };
        self.working.beds.insert(id, row.clone());
        Ok(row)
    }

    async fn lock_bed(&mut self, bed_id: i64) -> Result<Option<Bed>> {
        Ok(self.working.beds.get(&bed_id).cloned())
    }

    async fn set_bed_status(&mut self, bed_id: i64, status: BedStatus) -> Result<()> {
        self.check(StoreOp::SetBedStatus)?;
        let bed = self
            .working
            .beds
            .get_mut(&bed_id)
            .ok_or_else(|| Error::not_found("Bed", bed_id))?;
        bed.status = status;
        Ok(())
    }

    async fn insert_admission(&mut self, row: &AdmissionRow) -> Result<Admission> {
        self.check(StoreOp::InsertAdmission)?;
        // Mirrors the partial unique index on active admissions per bed.
        if self
            .working
            .admissions
            .values()
            .any(|a| a.bed_id == row.bed_id && a.status == AdmissionStatus::Admitted)
        {
            return Err(Error::Conflict(format!(
                "Bed {} already has an active admission",
                row.bed_id
            )));
        }
        let id = next_id(&mut self.working.seq.admissions);
        let admission = Admission {
            id,
            patient_id: row.patient_id,
            ward_id: row.ward_id,
            bed_id: row.bed_id,
            admission_date: row.admission_date,
            discharge_date: None,
            admitting_doctor_id: row.admitting_doctor_id,
            diagnosis: row.diagnosis.clone(),
            status: AdmissionStatus::Admitted,
            notes: row.notes.clone(),
        };
        self.working.admissions.insert(id, admission.clone());
        Ok(admission)
    }

    async fn lock_admission(&mut self, admission_id: i64) -> Result<Option<Admission>> {
        Ok(self.working.admissions.get(&admission_id).cloned())
    }

    async fn close_admission(
        &mut self,
        admission_id: i64,
        discharged_at: DateTime<Utc>,
    ) -> Result<()> {
        self.check(StoreOp::CloseAdmission)?;
        let admission = self
            .working
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| Error::not_found("Admission", admission_id))?;
        admission.status = AdmissionStatus::Discharged;
        admission.discharge_date = Some(discharged_at);
        Ok(())
    }

    async fn relocate_admission(
        &mut self,
        admission_id: i64,
        ward_id: i64,
        bed_id: i64,
    ) -> Result<()> {
        self.check(StoreOp::RelocateAdmission)?;
        let admission = self
            .working
            .admissions
            .get_mut(&admission_id)
            .ok_or_else(|| Error::not_found("Admission", admission_id))?;
        admission.ward_id = ward_id;
        admission.bed_id = bed_id;
        Ok(())
    }

    async fn insert_transfer(&mut self, row: &TransferRow) -> Result<Transfer> {
        self.check(StoreOp::InsertTransfer)?;
        let id = next_id(&mut self.working.seq.transfers);
        let transfer = Transfer {
            id,
            admission_id: row.admission_id,
            from_ward_id: row.from_ward_id,
            from_bed_id: row.from_bed_id,
            to_ward_id: row.to_ward_id,
            to_bed_id: row.to_bed_id,
            transfer_date: row.transfer_date,
            reason: row.reason.clone(),
            authorized_by: row.authorized_by,
        };
        self.working.transfers.insert(id, transfer.clone());
        Ok(transfer)
    }

    async fn find_discharge_summary(
        &mut self,
        admission_id: i64,
    ) -> Result<Option<DischargeSummary>> {
        Ok(self
            .working
            .summaries
            .values()
            .find(|s| s.admission_id == admission_id)
            .cloned())
    }

    async fn insert_discharge_summary(
        &mut self,
        row: &DischargeSummaryRow,
    ) -> Result<DischargeSummary> {
        self.check(StoreOp::InsertDischargeSummary)?;
        if self
            .working
            .summaries
            .values()
            .any(|s| s.admission_id == row.admission_id)
        {
            return Err(Error::Conflict(format!(
                "Admission {} already has a discharge summary",
                row.admission_id
            )));
        }
        let id = next_id(&mut self.working.seq.summaries);
        let summary = DischargeSummary {
            id,
            admission_id: row.admission_id,
            discharge_date: row.discharge_date,
            discharge_type: row.discharge_type,
            chief_complaint: row.chief_complaint.clone(),
            diagnosis: row.diagnosis.clone(),
            treatment_summary: row.treatment_summary.clone(),
            medications_on_discharge: row.medications_on_discharge.clone(),
            follow_up_instructions: row.follow_up_instructions.clone(),
            signed_by: row.signed_by,
        };
        self.working.summaries.insert(id, summary.clone());
        Ok(summary)
    }

    async fn insert_medication(
        &mut self,
        medication: &NewMedication,
        created_at: DateTime<Utc>,
    ) -> Result<Medication> {
        let id = next_id(&mut self.working.seq.medications);
        let row = Medication {
            id,
            name: medication.name.clone(),
            generic_name: medication.generic_name.clone(),
            form: medication.form.clone(),
            strength: medication.strength.clone(),
            unit: medication.unit.clone(),
            category: medication.category.clone(),
            active: true,
            created_at,
        };
        self.working.medications.insert(id, row.clone());
        Ok(row)
    }

    async fn find_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        Ok(self.working.medications.get(&medication_id).cloned())
    }

    async fn insert_prescription(
        &mut self,
        prescription: &NewPrescription,
        start_date: DateTime<Utc>,
    ) -> Result<Prescription> {
        let id = next_id(&mut self.working.seq.prescriptions);
        let row = Prescription {
            id,
            patient_id: prescription.patient_id,
            medication_id: prescription.medication_id,
            quantity: prescription.quantity,
            status: Prescription::ACTIVE.to_string(),
            start_date,
        };
        self.working.prescriptions.insert(id, row.clone());
        Ok(row)
    }

    async fn find_prescription(&mut self, prescription_id: i64) -> Result<Option<Prescription>> {
        Ok(self.working.prescriptions.get(&prescription_id).cloned())
    }

    async fn insert_stock_batch(
        &mut self,
        row: &StockBatchRow,
        created_at: DateTime<Utc>,
    ) -> Result<PharmacyStock> {
        self.check(StoreOp::InsertStockBatch)?;
        let id = next_id(&mut self.working.seq.stock);
        let batch = PharmacyStock {
            id,
            medication_id: row.medication_id,
            quantity: 0,
            batch_number: row.batch_number.clone(),
            expiry_date: row.expiry_date,
            location: row.location.clone(),
            cost_price: row.cost_price,
            selling_price: row.selling_price,
            reorder_level: row.reorder_level,
            notes: row.notes.clone(),
            created_at,
        };
        self.working.stock.insert(id, batch.clone());
        Ok(batch)
    }

    async fn lock_stock(&mut self, stock_id: i64) -> Result<Option<PharmacyStock>> {
        Ok(self.working.stock.get(&stock_id).cloned())
    }

    async fn lock_stock_batches(&mut self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        Ok(fefo_batches(&self.working, medication_id))
    }

    async fn lock_expired_batches(&mut self, today: NaiveDate) -> Result<Vec<PharmacyStock>> {
        let mut rows: Vec<PharmacyStock> = self
            .working
            .stock
            .values()
            .filter(|b| b.quantity > 0 && b.is_expired(today))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn post_movement(
        &mut self,
        stock_id: i64,
        entry: &MovementEntry,
    ) -> Result<(PharmacyStock, StockMovement)> {
        self.check(StoreOp::PostMovement)?;
        if entry.movement_type == MovementType::Return
            && self.working.movements.iter().any(|m| {
                m.movement_type == MovementType::Return && m.reference == entry.reference
            })
        {
            return Err(Error::Conflict(format!(
                "Movement {} has already been recorded",
                entry.reference
            )));
        }
        let batch = {
            let batch = self
                .working
                .stock
                .get_mut(&stock_id)
                .ok_or_else(|| Error::not_found("Stock batch", stock_id))?;
            let next = i64::from(batch.quantity) + i64::from(entry.quantity);
            if next < 0 {
                return Err(Error::InsufficientStock {
                    medication_id: batch.medication_id,
                    requested: entry.quantity.saturating_neg(),
                    available: i64::from(batch.quantity),
                });
            }
            batch.quantity = i32::try_from(next).map_err(|_| {
                Error::Validation(format!("Stock batch {stock_id} quantity would overflow"))
            })?;
            batch.clone()
        };

        let id = next_id(&mut self.working.seq.movements);
        let movement = StockMovement {
            id,
            movement_type: entry.movement_type,
            medication_id: batch.medication_id,
            stock_id,
            quantity: entry.quantity,
            batch_number: batch.batch_number.clone(),
            reference: entry.reference.clone(),
            reason: entry.reason.clone(),
            performed_by: entry.performed_by,
            performed_at: entry.performed_at,
        };
        self.working.movements.push(movement.clone());
        Ok((batch, movement))
    }

    async fn movement_reference_exists(&mut self, reference: &str) -> Result<bool> {
        Ok(self
            .working
            .movements
            .iter()
            .any(|m| m.reference == reference))
    }

    async fn insert_dispensing(&mut self, row: &DispensingRow) -> Result<Dispensing> {
        self.check(StoreOp::InsertDispensing)?;
        let id = next_id(&mut self.working.seq.dispensings);
        let dispensing = Dispensing {
            id,
            prescription_id: row.prescription_id,
            patient_id: row.patient_id,
            medication_id: row.medication_id,
            quantity_dispensed: row.quantity_dispensed,
            stock_id: row.stock_id,
            batch_number: row.batch_number.clone(),
            dispensed_by: row.dispensed_by,
            dispensed_at: row.dispensed_at,
            instructions: row.instructions.clone(),
            notes: row.notes.clone(),
            status: DispensingStatus::Dispensed,
        };
        self.working.dispensings.insert(id, dispensing.clone());
        Ok(dispensing)
    }

    async fn lock_dispensing(&mut self, dispensing_id: i64) -> Result<Option<Dispensing>> {
        Ok(self.working.dispensings.get(&dispensing_id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        trip(&self.faults, StoreOp::Commit)?;
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
