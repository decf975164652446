use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use visit_cell::{PatientVisit, VisitError};

pub const MIN_DURATION_MINUTES: i32 = 5;
pub const MAX_DURATION_MINUTES: i32 = 240;
pub const DEFAULT_DURATION_MINUTES: i32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub branch_id: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub visit_id: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// Holds a slot on the doctor's calendar.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn active_values() -> Vec<String> {
        Self::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentQuery {
    pub branch_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInResult {
    pub appointment: Appointment,
    pub visit: PatientVisit,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Doctor already has {0} overlapping appointment(s) in this slot")]
    SlotConflict(usize),

    #[error("Appointment was updated by another user; reload and retry")]
    ConcurrentUpdate,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Visit(#[from] VisitError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for shared_models::error::AppError {
    fn from(err: AppointmentError) -> Self {
        use shared_models::error::AppError;

        match err {
            AppointmentError::Visit(inner) => inner.into(),
            other => {
                let message = other.to_string();
                match other {
                    AppointmentError::NotFound | AppointmentError::PatientNotFound => {
                        AppError::NotFound(message)
                    }
                    AppointmentError::InvalidStatusTransition { .. }
                    | AppointmentError::SlotConflict(_)
                    | AppointmentError::ConcurrentUpdate => AppError::Conflict(message),
                    AppointmentError::InvalidTime(_) | AppointmentError::ValidationError(_) => {
                        AppError::ValidationError(message)
                    }
                    _ => AppError::Database(message),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use shared_models::error::AppError;

    #[test]
    fn status_serializes_screaming_snake_case() {
        assert_eq!(serde_json::to_value(AppointmentStatus::InProgress).unwrap(), "IN_PROGRESS");
        let parsed: AppointmentStatus = serde_json::from_value(serde_json::json!("CANCELLED")).unwrap();
        assert_eq!(parsed, AppointmentStatus::Cancelled);
    }

    #[test]
    fn active_statuses_hold_slots() {
        assert_eq!(
            AppointmentStatus::active_values(),
            vec!["SCHEDULED", "CONFIRMED", "IN_PROGRESS"]
        );
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn visit_errors_keep_their_status() {
        let err = AppointmentError::Visit(VisitError::DuplicateOpenVisit("VIS-1".into()));
        assert_eq!(AppError::from(err).status_code(), StatusCode::CONFLICT);

        let err = AppointmentError::Visit(VisitError::Forbidden("no".into()));
        assert_eq!(AppError::from(err).status_code(), StatusCode::FORBIDDEN);

        assert_eq!(AppError::from(AppointmentError::SlotConflict(1)).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(AppointmentError::InvalidTime("past".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
