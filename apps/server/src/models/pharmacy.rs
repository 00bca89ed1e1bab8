//! Medication catalog, stock batches, dispensing and the movement journal

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Kind of quantity change recorded in the movement journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Purchase,
    Dispensing,
    Adjustment,
    Return,
    Expired,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Dispensing => "dispensing",
            MovementType::Adjustment => "adjustment",
            MovementType::Return => "return",
            MovementType::Expired => "expired",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(MovementType::Purchase),
            "dispensing" => Ok(MovementType::Dispensing),
            "adjustment" => Ok(MovementType::Adjustment),
            "return" => Ok(MovementType::Return),
            "expired" => Ok(MovementType::Expired),
            other => Err(format!("unknown movement type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispensingStatus {
    Dispensed,
    Returned,
}

impl DispensingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispensingStatus::Dispensed => "dispensed",
            DispensingStatus::Returned => "returned",
        }
    }
}

impl FromStr for DispensingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispensed" => Ok(DispensingStatus::Dispensed),
            "returned" => Ok(DispensingStatus::Returned),
            other => Err(format!("unknown dispensing status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub generic_name: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Prescription as seen by the pharmacy: only what dispensing needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: i64,
    pub patient_id: i64,
    pub medication_id: i64,
    pub quantity: i32,
    pub status: String,
    pub start_date: DateTime<Utc>,
}

impl Prescription {
    pub const ACTIVE: &'static str = "active";

    pub fn is_active(&self) -> bool {
        self.status == Self::ACTIVE
    }
}

/// One received batch of a medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacyStock {
    pub id: i64,
    pub medication_id: i64,
    pub quantity: i32,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub location: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub reorder_level: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PharmacyStock {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dispensing {
    pub id: i64,
    pub prescription_id: i64,
    pub patient_id: i64,
    pub medication_id: i64,
    pub quantity_dispensed: i32,
    pub stock_id: i64,
    pub batch_number: String,
    pub dispensed_by: i64,
    pub dispensed_at: DateTime<Utc>,
    pub instructions: Option<String>,
    pub notes: Option<String>,
    pub status: DispensingStatus,
}

impl Dispensing {
    pub fn journal_reference(id: i64) -> String {
        format!("DISP-{id}")
    }

    pub fn return_reference(id: i64) -> String {
        format!("RET-DISP-{id}")
    }
}

/// Append-only journal row. Positive quantities are inbound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    pub id: i64,
    pub movement_type: MovementType,
    pub medication_id: i64,
    pub stock_id: i64,
    pub quantity: i32,
    pub batch_number: String,
    pub reference: String,
    pub reason: Option<String>,
    pub performed_by: Option<i64>,
    pub performed_at: DateTime<Utc>,
}

/// A batch next to the running total of its journal.
#[derive(Debug, Clone)]
pub struct BatchBalance {
    pub batch: PharmacyStock,
    pub journal_quantity: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchDrift {
    pub stock_id: i64,
    pub batch_number: String,
    pub stock_quantity: i32,
    pub journal_quantity: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReconciliationReport {
    pub medication_id: i64,
    pub batches_checked: usize,
    pub drifted: Vec<BatchDrift>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drifted.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMedication {
    #[validate(length(min = 1, message = "medication name is required"))]
    pub name: String,
    pub generic_name: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPrescription {
    pub patient_id: i64,
    pub medication_id: i64,
    #[validate(range(min = 1, message = "prescribed quantity must be positive"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddStockRequest {
    pub medication_id: i64,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(min = 1, message = "batch number is required"))]
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub location: Option<String>,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub selling_price: Decimal,
    pub reorder_level: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustStockRequest {
    pub quantity_delta: i32,
    #[validate(length(min = 1, message = "adjustment reason is required"))]
    pub reason: String,
    pub performed_by: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispenseRequest {
    pub prescription_id: i64,
    pub patient_id: i64,
    pub medication_id: i64,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    pub dispensed_by: i64,
    pub instructions: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReturnRequest {
    #[validate(length(min = 1, message = "return reason is required"))]
    pub reason: String,
    pub performed_by: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteOffRequest {
    pub performed_by: i64,
}

// ---------------------------------------------------------------------------
// Rows handed to the store
// ---------------------------------------------------------------------------

/// A new batch; it is always inserted empty and filled by a purchase movement.
#[derive(Debug, Clone)]
pub struct StockBatchRow {
    pub medication_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub location: Option<String>,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub reorder_level: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispensingRow {
    pub prescription_id: i64,
    pub patient_id: i64,
    pub medication_id: i64,
    pub quantity_dispensed: i32,
    pub stock_id: i64,
    pub batch_number: String,
    pub dispensed_by: i64,
    pub dispensed_at: DateTime<Utc>,
    pub instructions: Option<String>,
    pub notes: Option<String>,
}

/// Journal entry to post against a batch. Medication and batch number are
/// taken from the batch itself.
#[derive(Debug, Clone)]
pub struct MovementEntry {
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference: String,
    pub reason: Option<String>,
    pub performed_by: Option<i64>,
    pub performed_at: DateTime<Utc>,
}

/// Optional inclusive date window for movement reports.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start_date.map_or(true, |start| day >= start)
            && self.end_date.map_or(true, |end| day <= end)
    }
}
