use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, MAX_DURATION_MINUTES};

/// Two slots overlap if start1 < end2 AND start2 < end1; touching edges do not.
pub fn appointments_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

pub fn find_conflicts<'a>(
    existing: &'a [Appointment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|apt| Some(apt.id) != exclude_appointment_id)
        .filter(|apt| apt.status.is_active())
        .filter(|apt| appointments_overlap(start, end, apt.scheduled_at, apt.ends_at()))
        .collect()
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fails with `SlotConflict` when the doctor already holds an active slot overlapping [start, end).
    pub async fn ensure_doctor_free(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start, end);

        let existing = self
            .get_doctor_appointments_in_range(doctor_id, start, end, auth_token)
            .await?;
        let conflicts = find_conflicts(&existing, start, end, exclude_appointment_id);

        if conflicts.is_empty() {
            return Ok(());
        }

        warn!("Conflict detected for doctor {} - {} conflicting appointments", doctor_id, conflicts.len());
        Err(AppointmentError::SlotConflict(conflicts.len()))
    }

    /// Anything starting up to one maximum duration before `start` may still reach into the slot.
    async fn get_doctor_appointments_in_range(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let window_start = start - Duration::minutes(MAX_DURATION_MINUTES as i64);
        let path = RestQuery::table("appointments")
            .eq("doctor_id", doctor_id)
            .in_list("status", &AppointmentStatus::active_values())
            .gte("scheduled_at", window_start)
            .lt("scheduled_at", end)
            .order("scheduled_at.asc")
            .build();

        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await;
        let rows = rows.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
            })
            .collect()
    }
}
