// libs/visit-cell/src/models.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::roles::StaffRole;

// ==============================================================================
// STAGES AND STATUS
// ==============================================================================

/// Department checkpoints a visit passes through. Declaration order is the
/// forward order of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStage {
    FrontDesk,
    Nurse,
    Doctor,
    Lab,
    Pharmacy,
    Billing,
    ReturnedToFrontDesk,
    Completed,
}

impl VisitStage {
    pub const ALL: [VisitStage; 8] = [
        VisitStage::FrontDesk,
        VisitStage::Nurse,
        VisitStage::Doctor,
        VisitStage::Lab,
        VisitStage::Pharmacy,
        VisitStage::Billing,
        VisitStage::ReturnedToFrontDesk,
        VisitStage::Completed,
    ];

    /// Stages that have a department queue.
    pub const DEPARTMENTS: [VisitStage; 7] = [
        VisitStage::FrontDesk,
        VisitStage::Nurse,
        VisitStage::Doctor,
        VisitStage::Lab,
        VisitStage::Pharmacy,
        VisitStage::Billing,
        VisitStage::ReturnedToFrontDesk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStage::FrontDesk => "front_desk",
            VisitStage::Nurse => "nurse",
            VisitStage::Doctor => "doctor",
            VisitStage::Lab => "lab",
            VisitStage::Pharmacy => "pharmacy",
            VisitStage::Billing => "billing",
            VisitStage::ReturnedToFrontDesk => "returned_to_front_desk",
            VisitStage::Completed => "completed",
        }
    }

    /// Roles that work a stage's queue. Admin is implied everywhere.
    pub fn owning_roles(&self) -> &'static [StaffRole] {
        match self {
            VisitStage::FrontDesk | VisitStage::ReturnedToFrontDesk => &[StaffRole::FrontDesk],
            VisitStage::Nurse => &[StaffRole::Nurse],
            VisitStage::Doctor => &[StaffRole::Doctor],
            VisitStage::Lab => &[StaffRole::Lab],
            VisitStage::Pharmacy => &[StaffRole::Pharmacy],
            VisitStage::Billing => &[StaffRole::Billing, StaffRole::Accounting],
            VisitStage::Completed => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStage::Completed)
    }
}

impl fmt::Display for VisitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitStage {
    type Err = VisitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VisitStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| VisitError::ValidationError(format!("Unknown visit stage: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitStatus::InProgress => write!(f, "in_progress"),
            VisitStatus::Completed => write!(f, "completed"),
            VisitStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// CORE VISIT MODEL
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientVisit {
    pub id: Uuid,
    pub visit_number: String,
    pub branch_id: String,
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub current_stage: VisitStage,
    pub status: VisitStatus,
    pub stage_entered_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: BTreeMap<VisitStage, StageRecord>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientVisit {
    pub fn is_open(&self) -> bool {
        self.status == VisitStatus::InProgress
    }

    pub fn stage_data(&self, stage: VisitStage) -> Option<&StageData> {
        self.stages.get(&stage).and_then(|r| r.data.as_ref())
    }

    pub fn nurse_data(&self) -> Option<&NurseData> {
        match self.stage_data(VisitStage::Nurse) {
            Some(StageData::Nurse(data)) => Some(data),
            _ => None,
        }
    }

    pub fn doctor_data(&self) -> Option<&DoctorData> {
        match self.stage_data(VisitStage::Doctor) {
            Some(StageData::Doctor(data)) => Some(data),
            _ => None,
        }
    }

    pub fn lab_data(&self) -> Option<&LabData> {
        match self.stage_data(VisitStage::Lab) {
            Some(StageData::Lab(data)) => Some(data),
            _ => None,
        }
    }

    pub fn pharmacy_data(&self) -> Option<&PharmacyData> {
        match self.stage_data(VisitStage::Pharmacy) {
            Some(StageData::Pharmacy(data)) => Some(data),
            _ => None,
        }
    }

    pub fn billing_data(&self) -> Option<&BillingData> {
        match self.stage_data(VisitStage::Billing) {
            Some(StageData::Billing(data)) => Some(data),
            _ => None,
        }
    }

    /// Minutes spent in each closed stage record.
    pub fn stage_durations(&self) -> Vec<(VisitStage, i64)> {
        self.stages
            .iter()
            .filter_map(|(stage, record)| record.duration_minutes().map(|m| (*stage, m)))
            .collect()
    }
}

/// One department's clock-in/out and captured data within a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub handled_by: Option<String>,
    pub notes: Option<String>,
    pub data: Option<StageData>,
}

impl StageRecord {
    pub fn opened_at(clock_in: DateTime<Utc>) -> Self {
        Self {
            clock_in,
            clock_out: None,
            handled_by: None,
            notes: None,
            data: None,
        }
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.clock_out.map(|out| (out - self.clock_in).num_minutes())
    }

    pub fn append_notes(&mut self, notes: &str) {
        let notes = notes.trim();
        if notes.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, notes),
            _ => notes.to_string(),
        });
    }
}

// ==============================================================================
// PER-STAGE DATA CAPTURE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageData {
    FrontDesk(FrontDeskData),
    Nurse(NurseData),
    Doctor(DoctorData),
    Lab(LabData),
    Pharmacy(PharmacyData),
    Billing(BillingData),
}

impl StageData {
    pub fn kind(&self) -> &'static str {
        match self {
            StageData::FrontDesk(_) => "front_desk",
            StageData::Nurse(_) => "nurse",
            StageData::Doctor(_) => "doctor",
            StageData::Lab(_) => "lab",
            StageData::Pharmacy(_) => "pharmacy",
            StageData::Billing(_) => "billing",
        }
    }

    /// Front desk data is also what the desk records when a visit comes back to it.
    pub fn belongs_to(&self, stage: VisitStage) -> bool {
        matches!(
            (self, stage),
            (StageData::FrontDesk(_), VisitStage::FrontDesk)
                | (StageData::FrontDesk(_), VisitStage::ReturnedToFrontDesk)
                | (StageData::Nurse(_), VisitStage::Nurse)
                | (StageData::Doctor(_), VisitStage::Doctor)
                | (StageData::Lab(_), VisitStage::Lab)
                | (StageData::Pharmacy(_), VisitStage::Pharmacy)
                | (StageData::Billing(_), VisitStage::Billing)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrontDeskData {
    pub reason_for_visit: Option<String>,
    pub referral_source: Option<String>,
    #[serde(default)]
    pub checked_in_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NurseData {
    pub vitals: Vitals,
    pub triage_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    pub temperature_c: Option<f64>,
    pub systolic_bp: Option<u16>,
    pub diastolic_bp: Option<u16>,
    pub pulse_bpm: Option<u16>,
    pub respiratory_rate: Option<u16>,
    pub spo2_percent: Option<u8>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
}

impl Vitals {
    pub fn has_measurement(&self) -> bool {
        self.temperature_c.is_some()
            || self.systolic_bp.is_some()
            || self.diastolic_bp.is_some()
            || self.pulse_bpm.is_some()
            || self.respiratory_rate.is_some()
            || self.spo2_percent.is_some()
            || self.weight_kg.is_some()
            || self.height_cm.is_some()
    }

    pub fn bmi(&self) -> Option<f64> {
        match (self.weight_kg, self.height_cm) {
            (Some(weight), Some(height)) if height > 0.0 => {
                let meters = height / 100.0;
                Some(((weight / (meters * meters)) * 10.0).round() / 10.0)
            }
            _ => None,
        }
    }

    /// Physiological plausibility, not clinical normality.
    pub fn validate(&self) -> Result<(), VisitError> {
        if let Some(t) = self.temperature_c {
            if !(25.0..=45.0).contains(&t) {
                return Err(VisitError::ValidationError(format!("Temperature {} C out of range", t)));
            }
        }
        if let (Some(sys), Some(dia)) = (self.systolic_bp, self.diastolic_bp) {
            if sys <= dia {
                return Err(VisitError::ValidationError(
                    "Systolic pressure must exceed diastolic pressure".to_string(),
                ));
            }
        }
        if let Some(sys) = self.systolic_bp {
            if !(40..=300).contains(&sys) {
                return Err(VisitError::ValidationError(format!("Systolic pressure {} out of range", sys)));
            }
        }
        if let Some(pulse) = self.pulse_bpm {
            if !(20..=250).contains(&pulse) {
                return Err(VisitError::ValidationError(format!("Pulse {} out of range", pulse)));
            }
        }
        if let Some(spo2) = self.spo2_percent {
            if spo2 > 100 {
                return Err(VisitError::ValidationError("SpO2 cannot exceed 100%".to_string()));
            }
        }
        if matches!(self.weight_kg, Some(w) if w <= 0.0) || matches!(self.height_cm, Some(h) if h <= 0.0) {
            return Err(VisitError::ValidationError("Weight and height must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DoctorData {
    pub diagnosis: String,
    pub clinical_notes: Option<String>,
    #[serde(default)]
    pub prescriptions: Vec<Prescription>,
    #[serde(default)]
    pub lab_orders: Vec<LabOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabPriority {
    #[default]
    Routine,
    Urgent,
    Stat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrder {
    pub test_name: String,
    #[serde(default)]
    pub priority: LabPriority,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabData {
    #[serde(default)]
    pub results: Vec<LabResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabResult {
    pub test_name: String,
    pub value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    #[serde(default)]
    pub abnormal: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PharmacyData {
    #[serde(default)]
    pub dispensed: Vec<DispensedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispensedItem {
    pub medication: String,
    pub quantity: u32,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BillingData {
    pub invoice_id: Option<Uuid>,
    pub amount_charged: f64,
    pub amount_paid: f64,
}

impl BillingData {
    pub fn is_settled(&self) -> bool {
        self.invoice_id.is_some() || self.amount_paid >= self.amount_charged
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVisitRequest {
    pub patient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub reason_for_visit: Option<String>,
    pub referral_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStageDataRequest {
    pub data: StageData,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub target_stage: VisitStage,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnToFrontDeskRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelVisitRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitListQuery {
    pub branch_id: Option<String>,
    pub stage: Option<VisitStage>,
    pub status: Option<VisitStatus>,
    pub patient_id: Option<Uuid>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResult {
    pub visit: PatientVisit,
    pub changed: bool,
    pub from_stage: VisitStage,
}

/// A visit waiting in a department queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub position: usize,
    pub visit_id: Uuid,
    pub visit_number: String,
    pub patient_id: Uuid,
    pub stage: VisitStage,
    pub stage_entered_at: DateTime<Utc>,
    pub waiting_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentQueue {
    pub stage: VisitStage,
    pub branch_id: Option<String>,
    pub entries: Vec<QueueEntry>,
    pub longest_wait_minutes: i64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VisitError {
    #[error("Visit not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: VisitStage, to: VisitStage },

    #[error("Visit is {0} and can no longer change")]
    VisitClosed(VisitStatus),

    #[error("Visit is at {current}, not {requested}")]
    StageMismatch { current: VisitStage, requested: VisitStage },

    #[error("Data of kind {kind} cannot be recorded for stage {stage}")]
    StageDataMismatch { stage: VisitStage, kind: String },

    #[error("Cannot leave stage: {0}")]
    StageRequirement(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Patient already has an open visit: {0}")]
    DuplicateOpenVisit(String),

    #[error("Visit was updated by another user; reload and retry")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<VisitError> for shared_models::error::AppError {
    fn from(err: VisitError) -> Self {
        use shared_models::error::AppError;

        let message = err.to_string();
        match err {
            VisitError::NotFound | VisitError::PatientNotFound => AppError::NotFound(message),
            VisitError::InvalidTransition { .. }
            | VisitError::VisitClosed(_)
            | VisitError::StageMismatch { .. }
            | VisitError::DuplicateOpenVisit(_)
            | VisitError::ConcurrentUpdate => AppError::Conflict(message),
            VisitError::StageDataMismatch { .. }
            | VisitError::StageRequirement(_)
            | VisitError::ValidationError(_) => AppError::ValidationError(message),
            VisitError::Forbidden(_) => AppError::Forbidden(message),
            VisitError::DatabaseError(_) => AppError::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_round_trips_through_str() {
        for stage in VisitStage::ALL {
            assert_eq!(stage.as_str().parse::<VisitStage>().unwrap(), stage);
        }
        assert!("radiology".parse::<VisitStage>().is_err());
    }

    #[test]
    fn stage_data_is_tagged_by_kind() {
        let data: StageData = serde_json::from_value(json!({
            "kind": "nurse",
            "vitals": { "temperature_c": 37.2, "pulse_bpm": 80 },
            "triage_notes": null
        }))
        .unwrap();
        assert!(data.belongs_to(VisitStage::Nurse));
        assert!(!data.belongs_to(VisitStage::Doctor));
    }

    #[test]
    fn stages_map_deserializes_with_stage_keys() {
        let visit: PatientVisit = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "visit_number": "VIS-20260101-ABC123",
            "branch_id": "b1",
            "patient_id": Uuid::new_v4(),
            "appointment_id": null,
            "current_stage": "nurse",
            "status": "in_progress",
            "stage_entered_at": "2026-01-01T09:00:00Z",
            "stages": {
                "front_desk": {
                    "clock_in": "2026-01-01T08:30:00Z",
                    "clock_out": "2026-01-01T09:00:00Z",
                    "handled_by": "fd-1",
                    "notes": null,
                    "data": { "kind": "front_desk", "reason_for_visit": "Cough", "referral_source": null }
                }
            },
            "created_by": "fd-1",
            "created_at": "2026-01-01T08:30:00Z",
            "updated_at": "2026-01-01T09:00:00Z"
        }))
        .unwrap();

        assert_eq!(visit.stage_durations(), vec![(VisitStage::FrontDesk, 30)]);
    }

    #[test]
    fn vitals_validation() {
        let mut vitals = Vitals { systolic_bp: Some(120), diastolic_bp: Some(80), ..Vitals::default() };
        assert!(vitals.validate().is_ok());
        vitals.diastolic_bp = Some(130);
        assert!(vitals.validate().is_err());
        assert!(Vitals { spo2_percent: Some(101), ..Vitals::default() }.validate().is_err());
        assert!(!Vitals::default().has_measurement());
    }

    #[test]
    fn bmi_rounds_to_one_decimal() {
        let vitals = Vitals { weight_kg: Some(70.0), height_cm: Some(175.0), ..Vitals::default() };
        assert_eq!(vitals.bmi(), Some(22.9));
    }

    #[test]
    fn notes_are_appended() {
        let mut record = StageRecord::opened_at(Utc::now());
        record.append_notes("first");
        record.append_notes("  ");
        record.append_notes("second");
        assert_eq!(record.notes.as_deref(), Some("first\nsecond"));
    }
}
