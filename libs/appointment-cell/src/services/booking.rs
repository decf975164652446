// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_utils::scope::BranchScope;
use visit_cell::{CreateVisitRequest, VisitService};

use crate::models::{
    Appointment, AppointmentError, AppointmentQuery, AppointmentStatus, BookAppointmentRequest,
    CheckInResult, RescheduleAppointmentRequest, UpdateStatusRequest, DEFAULT_DURATION_MINUTES,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

const APPOINTMENTS_TABLE: &str = "appointments";
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            supabase,
        }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })
            .collect()
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, AppointmentError> {
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await;
        rows.map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        branch_id: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let duration = request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        self.lifecycle_service
            .validate_appointment_timing(request.scheduled_at, duration, now)?;

        let patient_path = RestQuery::table("patients")
            .eq("id", request.patient_id)
            .eq("branch_id", branch_id)
            .limit(1)
            .build();
        if self.fetch(&patient_path, auth_token).await?.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }

        let end = self.lifecycle_service.slot_end(request.scheduled_at, duration);
        self.conflict_service
            .ensure_doctor_free(request.doctor_id, request.scheduled_at, end, None, auth_token)
            .await?;

        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "branch_id": branch_id,
            "patient_id": request.patient_id,
            "doctor_id": request.doctor_id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "duration_minutes": duration,
            "reason": request.reason,
            "status": AppointmentStatus::Scheduled,
            "visit_id": null,
            "cancellation_reason": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let rows = self.supabase
            .request_returning(Method::POST, &RestQuery::table(APPOINTMENTS_TABLE).build(), Some(auth_token), appointment_data)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;

        info!(
            "Appointment {} booked with doctor {} at {}",
            appointment.id, appointment.doctor_id, appointment.scheduled_at
        );
        Ok(appointment)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = RestQuery::table(APPOINTMENTS_TABLE)
            .eq("id", appointment_id)
            .eq_opt("branch_id", scope.branch_id())
            .limit(1)
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        query: &AppointmentQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rest = RestQuery::table(APPOINTMENTS_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .eq_opt("doctor_id", query.doctor_id)
            .eq_opt("patient_id", query.patient_id)
            .eq_opt("status", query.status);

        if let Some(date) = query.date {
            let (day_start, day_end) = day_bounds(date)?;
            rest = rest.gte("scheduled_at", day_start).lt("scheduled_at", day_end);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let path = rest
            .order("scheduled_at.asc")
            .limit(limit)
            .offset(query.offset.unwrap_or(0).max(0))
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)
    }

    /// Appointments scheduled in [from, to), for dashboards.
    pub async fn appointments_in_window(
        &self,
        scope: &BranchScope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = RestQuery::table(APPOINTMENTS_TABLE)
            .eq_opt("branch_id", scope.branch_id())
            .gte("scheduled_at", from)
            .lt("scheduled_at", to)
            .order("scheduled_at.asc")
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, scope, auth_token).await?;
        if !self.lifecycle_service.validate_status_transition(current.status, request.status)? {
            return Ok(current);
        }

        let mut update = Map::new();
        update.insert("status".to_string(), json!(request.status));
        if request.status == AppointmentStatus::Cancelled {
            let reason = required_reason(request.reason.as_deref())?;
            update.insert("cancellation_reason".to_string(), json!(reason));
        }

        let updated = self.persist(&current, update, auth_token).await?;
        info!("Appointment {} moved {} -> {}", updated.id, current.status, updated.status);
        Ok(updated)
    }

    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, scope, auth_token).await?;
        if !self.lifecycle_service.can_reschedule(current.status) {
            return Err(AppointmentError::InvalidStatusTransition {
                from: current.status,
                to: AppointmentStatus::Scheduled,
            });
        }

        let duration = request.duration_minutes.unwrap_or(current.duration_minutes);
        self.lifecycle_service
            .validate_appointment_timing(request.scheduled_at, duration, Utc::now())?;

        let end = self.lifecycle_service.slot_end(request.scheduled_at, duration);
        self.conflict_service
            .ensure_doctor_free(current.doctor_id, request.scheduled_at, end, Some(current.id), auth_token)
            .await?;

        // A moved slot needs confirming again.
        let mut update = Map::new();
        update.insert("scheduled_at".to_string(), json!(request.scheduled_at.to_rfc3339()));
        update.insert("duration_minutes".to_string(), json!(duration));
        update.insert("status".to_string(), json!(AppointmentStatus::Scheduled));

        let updated = self.persist(&current, update, auth_token).await?;
        info!("Appointment {} rescheduled to {}", updated.id, updated.scheduled_at);
        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: &str,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.update_status(
            appointment_id,
            UpdateStatusRequest {
                status: AppointmentStatus::Cancelled,
                reason: Some(reason.to_string()),
            },
            scope,
            auth_token,
        )
        .await
    }

    /// Marks the patient as arrived and opens their visit at the front desk.
    pub async fn check_in(
        &self,
        appointment_id: Uuid,
        visits: &VisitService,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<CheckInResult, AppointmentError> {
        let current = self.get_appointment(appointment_id, scope, auth_token).await?;
        if current.status == AppointmentStatus::InProgress || current.visit_id.is_some() {
            return Err(AppointmentError::ValidationError(format!(
                "Appointment {} is already checked in",
                current.id
            )));
        }
        self.lifecycle_service
            .validate_status_transition(current.status, AppointmentStatus::InProgress)?;

        let visit = visits
            .create_visit(
                CreateVisitRequest {
                    patient_id: current.patient_id,
                    appointment_id: Some(current.id),
                    reason_for_visit: current.reason.clone(),
                    referral_source: None,
                },
                user,
                &current.branch_id,
                auth_token,
            )
            .await?;

        let mut update = Map::new();
        update.insert("status".to_string(), json!(AppointmentStatus::InProgress));
        update.insert("visit_id".to_string(), json!(visit.id));

        let appointment = match self.persist(&current, update, auth_token).await {
            Ok(appointment) => appointment,
            Err(e) => {
                warn!("Visit {} opened but appointment {} was not updated: {}", visit.visit_number, current.id, e);
                return Err(e);
            }
        };

        info!("Appointment {} checked in as visit {}", appointment.id, visit.visit_number);
        Ok(CheckInResult { appointment, visit })
    }

    /// PATCH guarded on the status the caller read.
    async fn persist(
        &self,
        current: &Appointment,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = RestQuery::table(APPOINTMENTS_TABLE)
            .eq("id", current.id)
            .eq("status", current.status)
            .build();

        debug!("Updating appointment {} from status {}", current.id, current.status);
        let rows = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), Value::Object(update))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(AppointmentError::ConcurrentUpdate)
    }
}

fn required_reason(reason: Option<&str>) -> Result<&str, AppointmentError> {
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason),
        _ => Err(AppointmentError::ValidationError("A cancellation reason is required".to_string())),
    }
}

fn day_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppointmentError::ValidationError(format!("Invalid date {}", date)))?
        .and_utc();
    Ok((start, start + Duration::days(1)))
}
