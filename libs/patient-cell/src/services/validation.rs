use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{PatientError, RegisterPatientRequest, UpdatePatientRequest};

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

/// Strips spaces, dashes and brackets, then checks the digits.
pub fn normalize_phone(raw: &str) -> Result<String, PatientError> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if phone_pattern().is_match(&compact) {
        Ok(compact)
    } else {
        Err(PatientError::ValidationError(format!("Invalid phone number: {}", raw)))
    }
}

pub fn validate_email(email: &str) -> Result<(), PatientError> {
    if email_pattern().is_match(email.trim()) {
        Ok(())
    } else {
        Err(PatientError::ValidationError(format!("Invalid email address: {}", email)))
    }
}

fn require_name(field: &str, value: &str) -> Result<(), PatientError> {
    if value.trim().is_empty() {
        return Err(PatientError::ValidationError(format!("{} cannot be empty", field)));
    }
    Ok(())
}

pub fn validate_registration(
    request: &RegisterPatientRequest,
    today: NaiveDate,
) -> Result<(), PatientError> {
    require_name("first_name", &request.first_name)?;
    require_name("last_name", &request.last_name)?;

    if request.date_of_birth > today {
        return Err(PatientError::InvalidDateOfBirth);
    }

    normalize_phone(&request.phone_number)?;
    if let Some(email) = &request.email {
        validate_email(email)?;
    }
    if let Some(phone) = &request.emergency_contact_phone {
        normalize_phone(phone)?;
    }
    Ok(())
}

pub fn validate_update(request: &UpdatePatientRequest) -> Result<(), PatientError> {
    if let Some(first_name) = &request.first_name {
        require_name("first_name", first_name)?;
    }
    if let Some(last_name) = &request.last_name {
        require_name("last_name", last_name)?;
    }
    if let Some(phone) = &request.phone_number {
        normalize_phone(phone)?;
    }
    if let Some(email) = &request.email {
        validate_email(email)?;
    }
    if let Some(phone) = &request.emergency_contact_phone {
        normalize_phone(phone)?;
    }
    Ok(())
}
