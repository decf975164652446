// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![AppointmentStatus::Completed],
            AppointmentStatus::Completed | AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Ok(false) when the appointment already has `new_status`.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<bool, AppointmentError> {
        if current_status == new_status {
            debug!("Appointment already {}", new_status);
            return Ok(false);
        }

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(true)
    }

    pub fn can_reschedule(&self, current_status: AppointmentStatus) -> bool {
        matches!(current_status, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    /// Validate appointment timing constraints
    pub fn validate_appointment_timing(
        &self,
        scheduled_at: DateTime<Utc>,
        duration_minutes: i32,
        current_time: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if scheduled_at <= current_time {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }

        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
            return Err(AppointmentError::InvalidTime(format!(
                "Duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }

        Ok(())
    }

    pub fn slot_end(&self, scheduled_at: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
        scheduled_at + Duration::minutes(duration_minutes as i64)
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
