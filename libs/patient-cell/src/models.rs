use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub patient_number: String,
    pub branch_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub insurance_provider_id: Option<Uuid>,
    pub insurance_member_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<Vec<String>>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn age_on(&self, today: NaiveDate) -> u32 {
        today.years_since(self.date_of_birth).unwrap_or(0)
    }

    pub fn age(&self) -> u32 {
        self.age_on(Utc::now().date_naive())
    }

    pub fn is_insured(&self) -> bool {
        self.insurance_provider_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPatientRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub insurance_provider_id: Option<Uuid>,
    pub insurance_member_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<Vec<String>>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub insurance_provider_id: Option<Uuid>,
    pub insurance_member_number: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<Vec<String>>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    /// Matched against names, phone number and patient number.
    pub q: Option<String>,
    pub branch_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("A patient with phone number {0} is already registered at this branch")]
    DuplicatePhone(String),

    #[error("Invalid date of birth")]
    InvalidDateOfBirth,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PatientError> for shared_models::error::AppError {
    fn from(err: PatientError) -> Self {
        use shared_models::error::AppError;

        let message = err.to_string();
        match err {
            PatientError::NotFound => AppError::NotFound(message),
            PatientError::DuplicatePhone(_) => AppError::Conflict(message),
            PatientError::InvalidDateOfBirth | PatientError::ValidationError(_) => {
                AppError::ValidationError(message)
            }
            PatientError::DatabaseError(_) => AppError::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::error::AppError;
    use axum::http::StatusCode;

    #[test]
    fn age_counts_whole_years() {
        let patient: Patient = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "patient_number": "PAT-2601-A1B2C3",
            "branch_id": "b1",
            "first_name": "Ada",
            "last_name": "Obi",
            "date_of_birth": "1990-06-15",
            "gender": "female",
            "phone_number": "08012345678",
            "email": null,
            "address": null,
            "insurance_provider_id": null,
            "insurance_member_number": null,
            "allergies": null,
            "chronic_conditions": null,
            "emergency_contact_name": null,
            "emergency_contact_phone": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), 35);
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), 36);
        assert_eq!(patient.full_name(), "Ada Obi");
        assert!(!patient.is_insured());
    }

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(AppError::from(PatientError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(PatientError::DuplicatePhone("080".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(PatientError::InvalidDateOfBirth).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
