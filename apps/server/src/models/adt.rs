//! Ward, bed and inpatient stay records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Occupancy state of a bed. The only thing consulted to decide whether a
/// bed can take a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BedStatus {
    Available,
    Occupied,
    Maintenance,
    Cleaning,
}

impl BedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedStatus::Available => "Available",
            BedStatus::Occupied => "Occupied",
            BedStatus::Maintenance => "Maintenance",
            BedStatus::Cleaning => "Cleaning",
        }
    }
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(BedStatus::Available),
            "Occupied" => Ok(BedStatus::Occupied),
            "Maintenance" => Ok(BedStatus::Maintenance),
            "Cleaning" => Ok(BedStatus::Cleaning),
            other => Err(format!("unknown bed status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionStatus {
    Admitted,
    Discharged,
}

impl AdmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::Admitted => "Admitted",
            AdmissionStatus::Discharged => "Discharged",
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admitted" => Ok(AdmissionStatus::Admitted),
            "Discharged" => Ok(AdmissionStatus::Discharged),
            other => Err(format!("unknown admission status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DischargeType {
    Regular,
    #[serde(rename = "AMA")]
    AgainstMedicalAdvice,
    Transfer,
    Death,
}

impl DischargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DischargeType::Regular => "Regular",
            DischargeType::AgainstMedicalAdvice => "AMA",
            DischargeType::Transfer => "Transfer",
            DischargeType::Death => "Death",
        }
    }
}

impl FromStr for DischargeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Regular" => Ok(DischargeType::Regular),
            "AMA" => Ok(DischargeType::AgainstMedicalAdvice),
            "Transfer" => Ok(DischargeType::Transfer),
            "Death" => Ok(DischargeType::Death),
            other => Err(format!("unknown discharge type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ward {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub ward_type: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: i64,
    pub ward_id: i64,
    pub room_number: String,
    pub room_type: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bed {
    pub id: i64,
    pub room_id: i64,
    /// Denormalised from the room so transfers can check the destination ward.
    pub ward_id: i64,
    pub bed_number: String,
    pub status: BedStatus,
    pub bed_type: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A room together with its beds, as shown on the bed board.
#[derive(Debug, Clone, Serialize)]
pub struct RoomOverview {
    #[serde(flatten)]
    pub room: Room,
    pub beds: Vec<Bed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WardOverview {
    #[serde(flatten)]
    pub ward: Ward,
    pub rooms: Vec<RoomOverview>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Admission {
    pub id: i64,
    pub patient_id: i64,
    pub ward_id: i64,
    pub bed_id: i64,
    pub admission_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub admitting_doctor_id: i64,
    pub diagnosis: String,
    pub status: AdmissionStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub id: i64,
    pub admission_id: i64,
    pub from_ward_id: i64,
    pub from_bed_id: i64,
    pub to_ward_id: i64,
    pub to_bed_id: i64,
    pub transfer_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub authorized_by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DischargeSummary {
    pub id: i64,
    pub admission_id: i64,
    pub discharge_date: DateTime<Utc>,
    pub discharge_type: DischargeType,
    pub chief_complaint: Option<String>,
    pub diagnosis: String,
    pub treatment_summary: Option<String>,
    pub medications_on_discharge: Option<String>,
    pub follow_up_instructions: Option<String>,
    pub signed_by: i64,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewWard {
    #[validate(length(min = 1, message = "ward name is required"))]
    pub name: String,
    pub department: Option<String>,
    pub ward_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRoom {
    pub ward_id: i64,
    #[validate(length(min = 1, message = "room number is required"))]
    pub room_number: String,
    pub room_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBed {
    pub room_id: i64,
    #[validate(length(min = 1, message = "bed number is required"))]
    pub bed_number: String,
    pub bed_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdmitRequest {
    pub patient_id: i64,
    pub bed_id: i64,
    #[validate(length(min = 1, message = "diagnosis is required"))]
    pub diagnosis: String,
    pub admitting_doctor_id: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferRequest {
    pub admission_id: i64,
    pub to_ward_id: i64,
    pub to_bed_id: i64,
    #[validate(length(max = 1000, message = "transfer reason is limited to 1000 characters"))]
    pub reason: Option<String>,
    pub authorized_by: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DischargeSummaryRequest {
    pub admission_id: i64,
    pub discharge_type: DischargeType,
    pub chief_complaint: Option<String>,
    #[validate(length(min = 1, message = "discharge diagnosis is required"))]
    pub diagnosis: String,
    pub treatment_summary: Option<String>,
    pub medications_on_discharge: Option<String>,
    pub follow_up_instructions: Option<String>,
    pub signed_by: i64,
}

/// Housekeeping change for a bed that is not occupied.
#[derive(Debug, Clone, Deserialize)]
pub struct HousekeepingRequest {
    pub status: BedStatus,
}

// ---------------------------------------------------------------------------
// Rows handed to the store (service-stamped fields included)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AdmissionRow {
    pub patient_id: i64,
    pub ward_id: i64,
    pub bed_id: i64,
    pub admission_date: DateTime<Utc>,
    pub admitting_doctor_id: i64,
    pub diagnosis: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferRow {
    pub admission_id: i64,
    pub from_ward_id: i64,
    pub from_bed_id: i64,
    pub to_ward_id: i64,
    pub to_bed_id: i64,
    pub transfer_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub authorized_by: i64,
}

#[derive(Debug, Clone)]
pub struct DischargeSummaryRow {
    pub admission_id: i64,
    pub discharge_date: DateTime<Utc>,
    pub discharge_type: DischargeType,
    pub chief_complaint: Option<String>,
    pub diagnosis: String,
    pub treatment_summary: Option<String>,
    pub medications_on_discharge: Option<String>,
    pub follow_up_instructions: Option<String>,
    pub signed_by: i64,
}

impl DischargeSummaryRow {
    pub fn from_request(request: DischargeSummaryRequest, discharge_date: DateTime<Utc>) -> Self {
        Self {
            admission_id: request.admission_id,
            discharge_date,
            discharge_type: request.discharge_type,
            chief_complaint: request.chief_complaint,
            diagnosis: request.diagnosis,
            treatment_summary: request.treatment_summary,
            medications_on_discharge: request.medications_on_discharge,
            follow_up_instructions: request.follow_up_instructions,
            signed_by: request.signed_by,
        }
    }
}
