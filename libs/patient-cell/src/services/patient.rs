use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;
use shared_utils::identifiers::patient_number;
use shared_utils::scope::BranchScope;
use visit_cell::{PatientVisit, VisitListQuery, VisitService};

use crate::models::{Patient, PatientError, PatientSearchQuery, RegisterPatientRequest, UpdatePatientRequest};
use crate::services::validation::{normalize_phone, validate_registration, validate_update};

const PATIENTS_TABLE: &str = "patients";
const DEFAULT_SEARCH_LIMIT: i64 = 50;
const MAX_SEARCH_LIMIT: i64 = 200;

pub struct PatientService {
    supabase: Arc<SupabaseClient>,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Patient>, PatientError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
            })
            .collect()
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Patient>, PatientError> {
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await;
        Self::parse_rows(rows.map_err(|e| PatientError::DatabaseError(e.to_string()))?)
    }

    pub async fn register_patient(
        &self,
        request: RegisterPatientRequest,
        branch_id: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let now = Utc::now();
        validate_registration(&request, now.date_naive())?;
        let phone = normalize_phone(&request.phone_number)?;

        self.ensure_phone_free(branch_id, &phone, None, auth_token).await?;

        let id = Uuid::new_v4();
        let number = patient_number(now, id);
        debug!("Registering patient {} in branch {}", number, branch_id);

        let patient_data = json!({
            "id": id,
            "patient_number": number,
            "branch_id": branch_id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "date_of_birth": request.date_of_birth.format("%Y-%m-%d").to_string(),
            "gender": request.gender,
            "phone_number": phone,
            "email": request.email.map(|e| e.trim().to_lowercase()),
            "address": request.address,
            "insurance_provider_id": request.insurance_provider_id,
            "insurance_member_number": request.insurance_member_number,
            "allergies": request.allergies,
            "chronic_conditions": request.chronic_conditions,
            "emergency_contact_name": request.emergency_contact_name,
            "emergency_contact_phone": request.emergency_contact_phone,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let rows = self.supabase
            .request_returning(Method::POST, &RestQuery::table(PATIENTS_TABLE).build(), Some(auth_token), patient_data)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let patient = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| PatientError::DatabaseError("Failed to create patient".to_string()))?;

        info!("Patient {} registered with ID {}", patient.patient_number, patient.id);
        Ok(patient)
    }

    /// Rejects a phone number already held by another patient in the branch.
    async fn ensure_phone_free(
        &self,
        branch_id: &str,
        phone: &str,
        except: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        let mut query = RestQuery::table(PATIENTS_TABLE)
            .eq("branch_id", branch_id)
            .eq("phone_number", phone);
        if let Some(id) = except {
            query = query.neq("id", id);
        }
        let path = query.limit(1).build();

        if self.fetch(&path, auth_token).await?.is_empty() {
            Ok(())
        } else {
            warn!("Phone {} already registered in branch {}", phone, branch_id);
            Err(PatientError::DuplicatePhone(phone.to_string()))
        }
    }

    /// Looks a patient up by UUID or by `PAT-` number.
    pub async fn get_patient(
        &self,
        identifier: &str,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let query = match Uuid::parse_str(identifier) {
            Ok(id) => RestQuery::table(PATIENTS_TABLE).eq("id", id),
            Err(_) => RestQuery::table(PATIENTS_TABLE).eq("patient_number", identifier.trim().to_uppercase()),
        };
        let path = query.eq_opt("branch_id", scope.branch_id()).limit(1).build();

        self.fetch(&path, auth_token)
            .await?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)
    }

    pub async fn update_patient(
        &self,
        identifier: &str,
        request: UpdatePatientRequest,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        validate_update(&request)?;
        let current = self.get_patient(identifier, scope, auth_token).await?;

        let mut update_data = serde_json::Map::new();

        if let Some(first_name) = request.first_name {
            update_data.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            update_data.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(phone_number) = request.phone_number {
            let phone = normalize_phone(&phone_number)?;
            if phone != current.phone_number {
                self.ensure_phone_free(&current.branch_id, &phone, Some(current.id), auth_token).await?;
            }
            update_data.insert("phone_number".to_string(), json!(phone));
        }
        if let Some(email) = request.email {
            update_data.insert("email".to_string(), json!(email.trim().to_lowercase()));
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), json!(address));
        }
        if let Some(provider_id) = request.insurance_provider_id {
            update_data.insert("insurance_provider_id".to_string(), json!(provider_id));
        }
        if let Some(member_number) = request.insurance_member_number {
            update_data.insert("insurance_member_number".to_string(), json!(member_number));
        }
        if let Some(allergies) = request.allergies {
            update_data.insert("allergies".to_string(), json!(allergies));
        }
        if let Some(chronic_conditions) = request.chronic_conditions {
            update_data.insert("chronic_conditions".to_string(), json!(chronic_conditions));
        }
        if let Some(name) = request.emergency_contact_name {
            update_data.insert("emergency_contact_name".to_string(), json!(name));
        }
        if let Some(phone) = request.emergency_contact_phone {
            update_data.insert("emergency_contact_phone".to_string(), json!(phone));
        }

        if update_data.is_empty() {
            return Err(PatientError::ValidationError("No fields to update".to_string()));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = RestQuery::table(PATIENTS_TABLE)
            .eq("id", current.id)
            .eq("branch_id", &current.branch_id)
            .build();
        let rows = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Value::Object(update_data))
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let updated = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(PatientError::NotFound)?;

        debug!("Patient {} updated", updated.patient_number);
        Ok(updated)
    }

    pub async fn search_patients(
        &self,
        query: &PatientSearchQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        debug!("Searching patients with query: {:?}", query);

        let mut rest = RestQuery::table(PATIENTS_TABLE).eq_opt("branch_id", scope.branch_id());
        if let Some(term) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            rest = rest.or_ilike(&["first_name", "last_name", "phone_number", "patient_number"], term);
        }

        let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let path = rest
            .order("last_name.asc,first_name.asc")
            .limit(limit)
            .offset(query.offset.unwrap_or(0).max(0))
            .build();

        self.fetch(&path, auth_token).await
    }

    /// Visit history for one patient, newest first.
    pub async fn patient_visits(
        &self,
        identifier: &str,
        visits: &VisitService,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<(Patient, Vec<PatientVisit>), PatientError> {
        let patient = self.get_patient(identifier, scope, auth_token).await?;

        let visit_query = VisitListQuery {
            patient_id: Some(patient.id),
            limit: Some(MAX_SEARCH_LIMIT),
            ..VisitListQuery::default()
        };
        let history = visits
            .list_visits(&visit_query, scope, auth_token)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        Ok((patient, history))
    }
}
