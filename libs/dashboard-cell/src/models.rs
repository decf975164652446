use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use appointment_cell::{Appointment, AppointmentError};
use billing_cell::BillingError;
use shared_models::roles::StaffRole;
use visit_cell::{QueueEntry, VisitError, VisitStage};

/// Longest window a single dashboard request may cover.
pub const MAX_WINDOW_DAYS: i64 = 92;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub branch_id: Option<String>,
}

/// Half-open [from, to).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DashboardWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DashboardWindow {
    /// Defaults to the current UTC day.
    pub fn resolve(query: &DashboardQuery, now: DateTime<Utc>) -> Result<Self, DashboardError> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|start| start.and_utc())
            .unwrap_or(now);

        let from = query.from.unwrap_or(day_start);
        let to = match query.to {
            Some(to) => to,
            None => from
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| DashboardError::InvalidWindow("'from' is out of range".to_string()))?,
        };

        if to <= from {
            return Err(DashboardError::InvalidWindow("'to' must be after 'from'".to_string()));
        }
        if to - from > Duration::days(MAX_WINDOW_DAYS) {
            return Err(DashboardError::InvalidWindow(format!(
                "Window cannot exceed {} days",
                MAX_WINDOW_DAYS
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// Every figure the dashboards are cut from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub stage_counts: BTreeMap<VisitStage, usize>,
    pub visits_today: usize,
    pub completed_today: usize,
    pub cancelled_today: usize,
    pub consultations_today: usize,
    pub average_minutes_in_stage: BTreeMap<VisitStage, f64>,
    pub appointments_by_status: BTreeMap<String, usize>,
    pub revenue_collected: f64,
    pub outstanding_balance: f64,
    pub invoices_by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub revenue_collected: f64,
    pub outstanding_balance: f64,
    pub invoices_by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitActivity {
    pub visits_today: usize,
    pub completed_today: usize,
    pub cancelled_today: usize,
    pub stage_counts: BTreeMap<VisitStage, usize>,
    pub average_minutes_in_stage: BTreeMap<VisitStage, f64>,
}

/// What one role sees; sections the role has no use for stay empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDashboard {
    pub role: StaffRole,
    pub branch_id: Option<String>,
    pub window: DashboardWindow,
    pub queues: BTreeMap<VisitStage, Vec<QueueEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_visits: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultations_today: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments_today: Option<Vec<Appointment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments_by_status: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<VisitActivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financial: Option<FinancialSummary>,
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid dashboard window: {0}")]
    InvalidWindow(String),

    #[error(transparent)]
    Visit(#[from] VisitError),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl From<DashboardError> for shared_models::error::AppError {
    fn from(err: DashboardError) -> Self {
        use shared_models::error::AppError;

        match err {
            DashboardError::InvalidWindow(_) => AppError::BadRequest(err.to_string()),
            DashboardError::Visit(inner) => inner.into(),
            DashboardError::Appointment(inner) => inner.into(),
            DashboardError::Billing(inner) => inner.into(),
        }
    }
}
