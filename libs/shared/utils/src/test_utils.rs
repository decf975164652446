use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::roles::StaffRole;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn with_url(url: &str) -> AppConfig {
        AppConfig {
            supabase_url: url.to_string(),
            ..Self::default().to_app_config()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub branch_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "staff@clinic.test".to_string(),
            role: StaffRole::FrontDesk.to_string(),
            branch_id: Some("branch-test".to_string()),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: StaffRole, branch_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            branch_id: Some(branch_id.to_string()),
        }
    }

    pub fn admin(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Admin, branch_id)
    }

    pub fn front_desk(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::FrontDesk, branch_id)
    }

    pub fn nurse(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Nurse, branch_id)
    }

    pub fn doctor(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Doctor, branch_id)
    }

    pub fn lab(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Lab, branch_id)
    }

    pub fn pharmacy(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Pharmacy, branch_id)
    }

    pub fn billing(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Billing, branch_id)
    }

    pub fn accounting(email: &str, branch_id: &str) -> Self {
        Self::new(email, StaffRole::Accounting, branch_id)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            branch_id: self.branch_id.clone(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": {
                "staff_role": user.role,
                "branch_id": user.branch_id,
            },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows shaped like the tables the cells read.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: &str, branch_id: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "patient_number": "PAT-2601-A1B2C3",
            "branch_id": branch_id,
            "first_name": "Ada",
            "last_name": "Obi",
            "date_of_birth": "1988-04-12",
            "gender": "female",
            "phone_number": "+2348012345678",
            "email": "ada@example.com",
            "address": null,
            "insurance_provider_id": null,
            "insurance_member_number": null,
            "allergies": null,
            "chronic_conditions": null,
            "emergency_contact_name": null,
            "emergency_contact_phone": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    /// A visit sitting at `stage` with an empty record for that stage.
    pub fn visit_response(visit_id: &str, patient_id: &str, branch_id: &str, stage: &str) -> serde_json::Value {
        json!({
            "id": visit_id,
            "visit_number": "VIS-20260101-ABC123",
            "branch_id": branch_id,
            "patient_id": patient_id,
            "appointment_id": null,
            "current_stage": stage,
            "status": "in_progress",
            "stage_entered_at": "2026-01-01T09:00:00Z",
            "stages": {
                stage: {
                    "clock_in": "2026-01-01T09:00:00Z",
                    "clock_out": null,
                    "handled_by": null,
                    "notes": null,
                    "data": null
                }
            },
            "created_by": "staff-1",
            "created_at": "2026-01-01T08:30:00Z",
            "updated_at": "2026-01-01T09:00:00Z"
        })
    }

    pub fn appointment_response(appointment_id: &str, patient_id: &str, doctor_id: &str, branch_id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "branch_id": branch_id,
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "scheduled_at": (Utc::now() + Duration::days(1)).to_rfc3339(),
            "duration_minutes": 30,
            "reason": "Follow-up",
            "status": status,
            "visit_id": null,
            "cancellation_reason": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn insurance_provider_response(provider_id: &str, coverage_percentage: f64, is_active: bool) -> serde_json::Value {
        json!({
            "id": provider_id,
            "name": "Acme Health",
            "coverage_percentage": coverage_percentage,
            "max_coverage_amount": null,
            "contact_email": "claims@acme.test",
            "contact_phone": null,
            "is_active": is_active,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    /// Uninsured invoice due in 30 days with `amount_paid` already received.
    pub fn invoice_response(invoice_id: &str, patient_id: &str, branch_id: &str, total: f64, amount_paid: f64, status: &str) -> serde_json::Value {
        json!({
            "id": invoice_id,
            "invoice_number": "INV-20260101-ABC123",
            "branch_id": branch_id,
            "patient_id": patient_id,
            "visit_id": null,
            "line_items": [
                { "description": "Consultation", "quantity": 1, "unit_price": total, "total": total }
            ],
            "tax_rate": 0.0,
            "discount": 0.0,
            "subtotal": total,
            "tax_amount": 0.0,
            "total": total,
            "insurance_provider_id": null,
            "insurance_coverage": 0.0,
            "patient_responsibility": total,
            "amount_paid": amount_paid,
            "balance": total - amount_paid,
            "status": status,
            "due_date": (Utc::now() + Duration::days(30)).date_naive().to_string(),
            "payments": [],
            "cancellation_reason": null,
            "created_by": "billing-1",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor("doc@clinic.test", "b1");
        assert_eq!(user.role, "DOCTOR");

        let user_model = user.to_user();
        assert_eq!(user_model.staff_role(), Some(StaffRole::Doctor));
        assert_eq!(user_model.branch_id.as_deref(), Some("b1"));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
