//! PostgreSQL-backed store
//!
//! Row locks (`SELECT ... FOR UPDATE`) serialise workflows that touch the same
//! bed, admission or medication. The schema backs the invariants up: a partial
//! unique index allows one active admission per bed and a CHECK keeps batch
//! quantities non-negative.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::str::FromStr;

use super::traits::{HospitalStore, StoreTransaction};
use crate::{
    models::{
        Admission, AdmissionRow, AdmissionStatus, BatchBalance, Bed, BedStatus, DateRange,
        DischargeSummary, DischargeSummaryRow, DischargeType, Dispensing, DispensingRow,
        DispensingStatus, Medication, MovementEntry, MovementType, NewBed, NewMedication,
        NewPrescription, NewRoom, NewWard, PharmacyStock, Prescription, Room, RoomOverview,
        StockBatchRow, StockMovement, Transfer, TransferRow, Ward, WardOverview,
    },
    Error, Result,
};

const UNIQUE_VIOLATION: &str = "23505";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

const WARD_COLUMNS: &str = "id, name, department, ward_type, description, created_at";
const ROOM_COLUMNS: &str = "id, ward_id, room_number, room_type, description, created_at";
const BED_COLUMNS: &str =
    "id, room_id, ward_id, bed_number, status, bed_type, notes, created_at";
const ADMISSION_COLUMNS: &str = "id, patient_id, ward_id, bed_id, admission_date, discharge_date, \
     admitting_doctor_id, diagnosis, status, notes";
const TRANSFER_COLUMNS: &str = "id, admission_id, from_ward_id, from_bed_id, to_ward_id, \
     to_bed_id, transfer_date, reason, authorized_by";
const SUMMARY_COLUMNS: &str = "id, admission_id, discharge_date, discharge_type, chief_complaint, \
     diagnosis, treatment_summary, medications_on_discharge, follow_up_instructions, signed_by";
const MEDICATION_COLUMNS: &str =
    "id, name, generic_name, form, strength, unit, category, active, created_at";
const PRESCRIPTION_COLUMNS: &str = "id, patient_id, medication_id, quantity, status, start_date";
const STOCK_COLUMNS: &str = "id, medication_id, quantity, batch_number, expiry_date, location, \
     cost_price, selling_price, reorder_level, notes, created_at";
const DISPENSING_COLUMNS: &str = "id, prescription_id, patient_id, medication_id, \
     quantity_dispensed, stock_id, batch_number, dispensed_by, dispensed_at, instructions, \
     notes, status";
const MOVEMENT_COLUMNS: &str = "id, movement_type, medication_id, stock_id, quantity, \
     batch_number, reference, reason, performed_by, performed_at";

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column);
    raw.parse::<T>()
        .map_err(|e| Error::Internal(format!("Corrupt {column} column: {e}")))
}

fn has_sqlstate(e: &sqlx::Error, code: &str) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(code),
        _ => false,
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    has_sqlstate(e, UNIQUE_VIOLATION)
}

fn is_out_of_range(e: &sqlx::Error) -> bool {
    has_sqlstate(e, NUMERIC_VALUE_OUT_OF_RANGE)
}

fn ward_from_row(row: &PgRow) -> Ward {
    Ward {
        id: row.get("id"),
        name: row.get("name"),
        department: row.get("department"),
        ward_type: row.get("ward_type"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

fn room_from_row(row: &PgRow) -> Room {
    Room {
        id: row.get("id"),
        ward_id: row.get("ward_id"),
        room_number: row.get("room_number"),
        room_type: row.get("room_type"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

fn bed_from_row(row: &PgRow) -> Result<Bed> {
    Ok(Bed {
        id: row.get("id"),
        room_id: row.get("room_id"),
        ward_id: row.get("ward_id"),
        bed_number: row.get("bed_number"),
        status: parse_column::<BedStatus>(row, "status")?,
        bed_type: row.get("bed_type"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    })
}

fn admission_from_row(row: &PgRow) -> Result<Admission> {
    Ok(Admission {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        ward_id: row.get("ward_id"),
        bed_id: row.get("bed_id"),
        admission_date: row.get("admission_date"),
        discharge_date: row.get("discharge_date"),
        admitting_doctor_id: row.get("admitting_doctor_id"),
        diagnosis: row.get("diagnosis"),
        status: parse_column::<AdmissionStatus>(row, "status")?,
        notes: row.get("notes"),
    })
}

fn transfer_from_row(row: &PgRow) -> Transfer {
    Transfer {
        id: row.get("id"),
        admission_id: row.get("admission_id"),
        from_ward_id: row.get("from_ward_id"),
        from_bed_id: row.get("from_bed_id"),
        to_ward_id: row.get("to_ward_id"),
        to_bed_id: row.get("to_bed_id"),
        transfer_date: row.get("transfer_date"),
        reason: row.get("reason"),
        authorized_by: row.get("authorized_by"),
    }
}

fn summary_from_row(row: &PgRow) -> Result<DischargeSummary> {
    Ok(DischargeSummary {
        id: row.get("id"),
        admission_id: row.get("admission_id"),
        discharge_date: row.get("discharge_date"),
        discharge_type: parse_column::<DischargeType>(row, "discharge_type")?,
        chief_complaint: row.get("chief_complaint"),
        diagnosis: row.get("diagnosis"),
        treatment_summary: row.get("treatment_summary"),
        medications_on_discharge: row.get("medications_on_discharge"),
        follow_up_instructions: row.get("follow_up_instructions"),
        signed_by: row.get("signed_by"),
    })
}

fn medication_from_row(row: &PgRow) -> Medication {
    Medication {
        id: row.get("id"),
        name: row.get("name"),
        generic_name: row.get("generic_name"),
        form: row.get("form"),
        strength: row.get("strength"),
        unit: row.get("unit"),
        category: row.get("category"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

fn prescription_from_row(row: &PgRow) -> Prescription {
    Prescription {
        id: row.get("id"),
        patient_id: row.get("patient_id"),
        medication_id: row.get("medication_id"),
        quantity: row.get("quantity"),
        status: row.get("status"),
        start_date: row.get("start_date"),
    }
}

fn stock_from_row(row: &PgRow) -> PharmacyStock {
    PharmacyStock {
        id: row.get("id"),
        medication_id: row.get("medication_id"),
        quantity: row.get("quantity"),
        batch_number: row.get("batch_number"),
        expiry_date: row.get("expiry_date"),
        location: row.get("location"),
        cost_price: row.get("cost_price"),
        selling_price: row.get("selling_price"),
        reorder_level: row.get("reorder_level"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

fn dispensing_from_row(row: &PgRow) -> Result<Dispensing> {
    Ok(Dispensing {
        id: row.get("id"),
        prescription_id: row.get("prescription_id"),
        patient_id: row.get("patient_id"),
        medication_id: row.get("medication_id"),
        quantity_dispensed: row.get("quantity_dispensed"),
        stock_id: row.get("stock_id"),
        batch_number: row.get("batch_number"),
        dispensed_by: row.get("dispensed_by"),
        dispensed_at: row.get("dispensed_at"),
        instructions: row.get("instructions"),
        notes: row.get("notes"),
        status: parse_column::<DispensingStatus>(row, "status")?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement> {
    Ok(StockMovement {
        id: row.get("id"),
        movement_type: parse_column::<MovementType>(row, "movement_type")?,
        medication_id: row.get("medication_id"),
        stock_id: row.get("stock_id"),
        quantity: row.get("quantity"),
        batch_number: row.get("batch_number"),
        reference: row.get("reference"),
        reason: row.get("reason"),
        performed_by: row.get("performed_by"),
        performed_at: row.get("performed_at"),
    })
}

/// PostgreSQL-backed HospitalStore implementation
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HospitalStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn list_wards(&self) -> Result<Vec<WardOverview>> {
        let wards = sqlx::query(&format!("SELECT {WARD_COLUMNS} FROM wards ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let rooms = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY ward_id, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        let beds = sqlx::query(&format!("SELECT {BED_COLUMNS} FROM beds ORDER BY room_id, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut beds_by_room: HashMap<i64, Vec<Bed>> = HashMap::new();
        for row in &beds {
            let bed = bed_from_row(row)?;
            beds_by_room.entry(bed.room_id).or_default().push(bed);
        }

        let mut rooms_by_ward: HashMap<i64, Vec<RoomOverview>> = HashMap::new();
        for row in &rooms {
            let room = room_from_row(row);
            let beds = beds_by_room.remove(&room.id).unwrap_or_default();
            rooms_by_ward
                .entry(room.ward_id)
                .or_default()
                .push(RoomOverview { room, beds });
        }

        Ok(wards
            .iter()
            .map(|row| {
                let ward = ward_from_row(row);
                let rooms = rooms_by_ward.remove(&ward.id).unwrap_or_default();
                WardOverview { ward, rooms }
            })
            .collect())
    }

    async fn list_beds(&self, status: Option<BedStatus>) -> Result<Vec<Bed>> {
        let rows = sqlx::query(&format!(
            "SELECT {BED_COLUMNS} FROM beds
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY ward_id, room_id, id"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(bed_from_row).collect()
    }

    async fn get_bed(&self, bed_id: i64) -> Result<Option<Bed>> {
        let row = sqlx::query(&format!("SELECT {BED_COLUMNS} FROM beds WHERE id = $1"))
            .bind(bed_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(bed_from_row).transpose()
    }

    async fn get_admission(&self, admission_id: i64) -> Result<Option<Admission>> {
        let row = sqlx::query(&format!(
            "SELECT {ADMISSION_COLUMNS} FROM admissions WHERE id = $1"
        ))
        .bind(admission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(admission_from_row).transpose()
    }

    async fn list_admissions(&self, status: Option<AdmissionStatus>) -> Result<Vec<Admission>> {
        let rows = sqlx::query(&format!(
            "SELECT {ADMISSION_COLUMNS} FROM admissions
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY admission_date DESC, id DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(admission_from_row).collect()
    }

    async fn list_transfers(&self, admission_id: Option<i64>) -> Result<Vec<Transfer>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers
             WHERE ($1::BIGINT IS NULL OR admission_id = $1)
             ORDER BY transfer_date DESC, id DESC"
        ))
        .bind(admission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(transfer_from_row).collect())
    }

    async fn get_discharge_summary(&self, admission_id: i64) -> Result<Option<DischargeSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM discharge_summaries WHERE admission_id = $1"
        ))
        .bind(admission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn get_medication(&self, medication_id: i64) -> Result<Option<Medication>> {
        let row = sqlx::query(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = $1"
        ))
        .bind(medication_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(medication_from_row))
    }

    async fn list_medications(&self) -> Result<Vec<Medication>> {
        let rows = sqlx::query(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(medication_from_row).collect())
    }

    async fn pending_prescriptions(&self) -> Result<Vec<Prescription>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions p
             WHERE p.status = $1
               AND NOT EXISTS (SELECT 1 FROM dispensing d WHERE d.prescription_id = p.id)
             ORDER BY p.start_date, p.id"
        ))
        .bind(Prescription::ACTIVE)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(prescription_from_row).collect())
    }

    async fn list_available_stock(&self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock
             WHERE medication_id = $1 AND quantity > 0
             ORDER BY expiry_date, id"
        ))
        .bind(medication_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    async fn list_batches(&self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock WHERE medication_id = $1 ORDER BY id"
        ))
        .bind(medication_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    async fn list_low_stock(&self) -> Result<Vec<PharmacyStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock
             WHERE quantity <= reorder_level
             ORDER BY quantity, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    async fn dispensing_history(&self, patient_id: i64) -> Result<Vec<Dispensing>> {
        let rows = sqlx::query(&format!(
            "SELECT {DISPENSING_COLUMNS} FROM dispensing
             WHERE patient_id = $1
             ORDER BY dispensed_at DESC, id DESC"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(dispensing_from_row).collect()
    }

    async fn list_movements(
        &self,
        medication_id: i64,
        range: DateRange,
    ) -> Result<Vec<StockMovement>> {
        // Calendar dates are UTC days, whatever the session time zone.
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements
             WHERE medication_id = $1
               AND ($2::DATE IS NULL OR (performed_at AT TIME ZONE 'UTC')::DATE >= $2::DATE)
               AND ($3::DATE IS NULL OR (performed_at AT TIME ZONE 'UTC')::DATE <= $3::DATE)
             ORDER BY performed_at DESC, id DESC"
        ))
        .bind(medication_id)
        .bind(range.start_date)
        .bind(range.end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(movement_from_row).collect()
    }

    async fn journal_balances(&self, medication_id: i64) -> Result<Vec<BatchBalance>> {
        // Single statement so batches and journal sums share one snapshot.
        let rows = sqlx::query(
            "SELECT s.id, s.medication_id, s.quantity, s.batch_number, s.expiry_date,
                    s.location, s.cost_price, s.selling_price, s.reorder_level, s.notes,
                    s.created_at, COALESCE(j.total, 0)::BIGINT AS journal_quantity
             FROM pharmacy_stock s
             LEFT JOIN (
                 SELECT stock_id, SUM(quantity) AS total
                 FROM stock_movements
                 WHERE medication_id = $1
                 GROUP BY stock_id
             ) j ON j.stock_id = s.id
             WHERE s.medication_id = $1
             ORDER BY s.id",
        )
        .bind(medication_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|row| BatchBalance {
                batch: stock_from_row(row),
                journal_quantity: row.get("journal_quantity"),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<serde_json::Value> {
        let row = sqlx::query("SELECT version() AS version")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        let version: String = row.get("version");

        Ok(serde_json::json!({
            "backend": "postgres",
            "version": version,
            "pool_size": self.pool.size(),
            "idle_connections": self.pool.num_idle(),
        }))
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_ward(&mut self, ward: &NewWard, created_at: DateTime<Utc>) -> Result<Ward> {
        let row = sqlx::query(&format!(
            "INSERT INTO wards (name, department, ward_type, description, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {WARD_COLUMNS}"
        ))
        .bind(&ward.name)
        .bind(&ward.department)
        .bind(&ward.ward_type)
        .bind(&ward.description)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(ward_from_row(&row))
    }

    async fn get_ward(&mut self, ward_id: i64) -> Result<Option<Ward>> {
        let row = sqlx::query(&format!("SELECT {WARD_COLUMNS} FROM wards WHERE id = $1"))
            .bind(ward_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(ward_from_row))
    }

    async fn insert_room(&mut self, room: &NewRoom, created_at: DateTime<Utc>) -> Result<Room> {
        let row = sqlx::query(&format!(
            "INSERT INTO rooms (ward_id, room_number, room_type, description, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ROOM_COLUMNS}"
        ))
        .bind(room.ward_id)
        .bind(&room.room_number)
        .bind(&room.room_type)
        .bind(&room.description)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(room_from_row(&row))
    }

    async fn get_room(&mut self, room_id: i64) -> Result<Option<Room>> {
        let row = sqlx::query(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"))
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn insert_bed(
        &mut self,
        bed: &NewBed,
        ward_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Bed> {
        let row = sqlx::query(&format!(
            "INSERT INTO beds (room_id, ward_id, bed_number, status, bed_type, notes, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {BED_COLUMNS}"
        ))
        .bind(bed.room_id)
        .bind(ward_id)
        .bind(&bed.bed_number)
        .bind(BedStatus::Available.as_str())
        .bind(&bed.bed_type)
        .bind(&bed.notes)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        bed_from_row(&row)
    }

    async fn lock_bed(&mut self, bed_id: i64) -> Result<Option<Bed>> {
        let row = sqlx::query(&format!(
            "SELECT {BED_COLUMNS} FROM beds WHERE id = $1 FOR UPDATE"
        ))
        .bind(bed_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(bed_from_row).transpose()
    }

    async fn set_bed_status(&mut self, bed_id: i64, status: BedStatus) -> Result<()> {
        let result = sqlx::query("UPDATE beds SET status = $2 WHERE id = $1")
            .bind(bed_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Bed", bed_id));
        }
        Ok(())
    }

    async fn insert_admission(&mut self, row: &AdmissionRow) -> Result<Admission> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO admissions
                 (patient_id, ward_id, bed_id, admission_date, admitting_doctor_id, diagnosis, status, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {ADMISSION_COLUMNS}"
        ))
        .bind(row.patient_id)
        .bind(row.ward_id)
        .bind(row.bed_id)
        .bind(row.admission_date)
        .bind(row.admitting_doctor_id)
        .bind(&row.diagnosis)
        .bind(AdmissionStatus::Admitted.as_str())
        .bind(&row.notes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!("Bed {} already has an active admission", row.bed_id))
            } else {
                Error::Database(e)
            }
        })?;

        admission_from_row(&inserted)
    }

    async fn lock_admission(&mut self, admission_id: i64) -> Result<Option<Admission>> {
        let row = sqlx::query(&format!(
            "SELECT {ADMISSION_COLUMNS} FROM admissions WHERE id = $1 FOR UPDATE"
        ))
        .bind(admission_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(admission_from_row).transpose()
    }

    async fn close_admission(
        &mut self,
        admission_id: i64,
        discharged_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE admissions SET status = $2, discharge_date = $3 WHERE id = $1",
        )
        .bind(admission_id)
        .bind(AdmissionStatus::Discharged.as_str())
        .bind(discharged_at)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Admission", admission_id));
        }
        Ok(())
    }

    async fn relocate_admission(
        &mut self,
        admission_id: i64,
        ward_id: i64,
        bed_id: i64,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE admissions SET ward_id = $2, bed_id = $3 WHERE id = $1")
            .bind(admission_id)
            .bind(ward_id)
            .bind(bed_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::Conflict(format!("Bed {bed_id} already has an active admission"))
                } else {
                    Error::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Admission", admission_id));
        }
        Ok(())
    }

    async fn insert_transfer(&mut self, row: &TransferRow) -> Result<Transfer> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO transfers
                 (admission_id, from_ward_id, from_bed_id, to_ward_id, to_bed_id, transfer_date, reason, authorized_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(row.admission_id)
        .bind(row.from_ward_id)
        .bind(row.from_bed_id)
        .bind(row.to_ward_id)
        .bind(row.to_bed_id)
        .bind(row.transfer_date)
        .bind(&row.reason)
        .bind(row.authorized_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(transfer_from_row(&inserted))
    }

    async fn find_discharge_summary(
        &mut self,
        admission_id: i64,
    ) -> Result<Option<DischargeSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM discharge_summaries WHERE admission_id = $1"
        ))
        .bind(admission_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(summary_from_row).transpose()
    }

    async fn insert_discharge_summary(
        &mut self,
        row: &DischargeSummaryRow,
    ) -> Result<DischargeSummary> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO discharge_summaries
                 (admission_id, discharge_date, discharge_type, chief_complaint, diagnosis,
                  treatment_summary, medications_on_discharge, follow_up_instructions, signed_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {SUMMARY_COLUMNS}"
        ))
        .bind(row.admission_id)
        .bind(row.discharge_date)
        .bind(row.discharge_type.as_str())
        .bind(&row.chief_complaint)
        .bind(&row.diagnosis)
        .bind(&row.treatment_summary)
        .bind(&row.medications_on_discharge)
        .bind(&row.follow_up_instructions)
        .bind(row.signed_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!(
                    "Admission {} already has a discharge summary",
                    row.admission_id
                ))
            } else {
                Error::Database(e)
            }
        })?;

        summary_from_row(&inserted)
    }

    async fn insert_medication(
        &mut self,
        medication: &NewMedication,
        created_at: DateTime<Utc>,
    ) -> Result<Medication> {
        let row = sqlx::query(&format!(
            "INSERT INTO medications (name, generic_name, form, strength, unit, category, active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
             RETURNING {MEDICATION_COLUMNS}"
        ))
        .bind(&medication.name)
        .bind(&medication.generic_name)
        .bind(&medication.form)
        .bind(&medication.strength)
        .bind(&medication.unit)
        .bind(&medication.category)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(medication_from_row(&row))
    }

    async fn find_medication(&mut self, medication_id: i64) -> Result<Option<Medication>> {
        let row = sqlx::query(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = $1"
        ))
        .bind(medication_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(medication_from_row))
    }

    async fn insert_prescription(
        &mut self,
        prescription: &NewPrescription,
        start_date: DateTime<Utc>,
    ) -> Result<Prescription> {
        let row = sqlx::query(&format!(
            "INSERT INTO prescriptions (patient_id, medication_id, quantity, status, start_date)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {PRESCRIPTION_COLUMNS}"
        ))
        .bind(prescription.patient_id)
        .bind(prescription.medication_id)
        .bind(prescription.quantity)
        .bind(Prescription::ACTIVE)
        .bind(start_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(prescription_from_row(&row))
    }

    async fn find_prescription(&mut self, prescription_id: i64) -> Result<Option<Prescription>> {
        let row = sqlx::query(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = $1"
        ))
        .bind(prescription_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(prescription_from_row))
    }

    async fn insert_stock_batch(
        &mut self,
        row: &StockBatchRow,
        created_at: DateTime<Utc>,
    ) -> Result<PharmacyStock> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO pharmacy_stock
                 (medication_id, quantity, batch_number, expiry_date, location,
                  cost_price, selling_price, reorder_level, notes, created_at)
             VALUES ($1, 0, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {STOCK_COLUMNS}"
        ))
        .bind(row.medication_id)
        .bind(&row.batch_number)
        .bind(row.expiry_date)
        .bind(&row.location)
        .bind(row.cost_price)
        .bind(row.selling_price)
        .bind(row.reorder_level)
        .bind(&row.notes)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(stock_from_row(&inserted))
    }

    async fn lock_stock(&mut self, stock_id: i64) -> Result<Option<PharmacyStock>> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock WHERE id = $1 FOR UPDATE"
        ))
        .bind(stock_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(stock_from_row))
    }

    async fn lock_stock_batches(&mut self, medication_id: i64) -> Result<Vec<PharmacyStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock
             WHERE medication_id = $1 AND quantity > 0
             ORDER BY expiry_date, id
             FOR UPDATE"
        ))
        .bind(medication_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    async fn lock_expired_batches(&mut self, today: NaiveDate) -> Result<Vec<PharmacyStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM pharmacy_stock
             WHERE quantity > 0 AND expiry_date < $1
             ORDER BY expiry_date, id
             FOR UPDATE"
        ))
        .bind(today)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    async fn post_movement(
        &mut self,
        stock_id: i64,
        entry: &MovementEntry,
    ) -> Result<(PharmacyStock, StockMovement)> {
        let updated = sqlx::query(&format!(
            "UPDATE pharmacy_stock
             SET quantity = quantity + $2
             WHERE id = $1 AND quantity + $2 >= 0
             RETURNING {STOCK_COLUMNS}"
        ))
        .bind(stock_id)
        .bind(entry.quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_out_of_range(&e) {
                Error::Validation(format!("Stock batch {stock_id} quantity would overflow"))
            } else {
                Error::Database(e)
            }
        })?;

        let batch = match updated {
            Some(row) => stock_from_row(&row),
            None => {
                let current = sqlx::query(
                    "SELECT medication_id, quantity FROM pharmacy_stock WHERE id = $1",
                )
                .bind(stock_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(Error::Database)?;

                return Err(match current {
                    Some(row) => Error::InsufficientStock {
                        medication_id: row.get("medication_id"),
                        requested: entry.quantity.saturating_neg(),
                        available: i64::from(row.get::<i32, _>("quantity")),
                    },
                    None => Error::not_found("Stock batch", stock_id),
                });
            }
        };

        let inserted = sqlx::query(&format!(
            "INSERT INTO stock_movements
                 (movement_type, medication_id, stock_id, quantity, batch_number,
                  reference, reason, performed_by, performed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {MOVEMENT_COLUMNS}"
        ))
        .bind(entry.movement_type.as_str())
        .bind(batch.medication_id)
        .bind(stock_id)
        .bind(entry.quantity)
        .bind(&batch.batch_number)
        .bind(&entry.reference)
        .bind(&entry.reason)
        .bind(entry.performed_by)
        .bind(entry.performed_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!(
                    "Movement {} has already been recorded",
                    entry.reference
                ))
            } else {
                Error::Database(e)
            }
        })?;

        Ok((batch, movement_from_row(&inserted)?))
    }

    async fn movement_reference_exists(&mut self, reference: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM stock_movements WHERE reference = $1) AS found",
        )
        .bind(reference)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("found"))
    }

    async fn insert_dispensing(&mut self, row: &DispensingRow) -> Result<Dispensing> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO dispensing
                 (prescription_id, patient_id, medication_id, quantity_dispensed, stock_id,
                  batch_number, dispensed_by, dispensed_at, instructions, notes, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {DISPENSING_COLUMNS}"
        ))
        .bind(row.prescription_id)
        .bind(row.patient_id)
        .bind(row.medication_id)
        .bind(row.quantity_dispensed)
        .bind(row.stock_id)
        .bind(&row.batch_number)
        .bind(row.dispensed_by)
        .bind(row.dispensed_at)
        .bind(&row.instructions)
        .bind(&row.notes)
        .bind(DispensingStatus::Dispensed.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        dispensing_from_row(&inserted)
    }

    async fn lock_dispensing(&mut self, dispensing_id: i64) -> Result<Option<Dispensing>> {
        let row = sqlx::query(&format!(
            "SELECT {DISPENSING_COLUMNS} FROM dispensing WHERE id = $1 FOR UPDATE"
        ))
        .bind(dispensing_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(dispensing_from_row).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}
