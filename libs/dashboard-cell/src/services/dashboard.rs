use chrono::Utc;
use tracing::{debug, info};

use appointment_cell::{Appointment, AppointmentBookingService};
use billing_cell::InvoiceService;
use shared_config::AppConfig;
use shared_models::roles::StaffRole;
use shared_utils::scope::BranchScope;
use visit_cell::{PatientVisit, VisitService};

use crate::models::{DashboardError, DashboardQuery, DashboardSnapshot, DashboardWindow, RoleDashboard};
use crate::services::aggregator::DashboardAggregator;
use crate::services::projection::project_for_role;

pub struct DashboardService {
    visits: VisitService,
    appointments: AppointmentBookingService,
    invoices: InvoiceService,
}

impl DashboardService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            visits: VisitService::new(config),
            appointments: AppointmentBookingService::new(config),
            invoices: InvoiceService::new(config),
        }
    }

    /// Loads every source concurrently and aggregates them for the window.
    pub async fn snapshot(
        &self,
        window: DashboardWindow,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<(DashboardSnapshot, Vec<PatientVisit>, Vec<Appointment>), DashboardError> {
        debug!(
            "Building dashboard snapshot for {:?} from {} to {}",
            scope.branch_id(),
            window.from,
            window.to
        );

        let (window_visits, open_visits, appointments, invoices) = futures::try_join!(
            async {
                self.visits
                    .visits_in_window(scope, window.from, window.to, auth_token)
                    .await
                    .map_err(DashboardError::from)
            },
            async { self.visits.open_visits(scope, auth_token).await.map_err(DashboardError::from) },
            async {
                self.appointments
                    .appointments_in_window(scope, window.from, window.to, auth_token)
                    .await
                    .map_err(DashboardError::from)
            },
            async {
                self.invoices
                    .invoices_for_dashboard(scope, window.from, auth_token)
                    .await
                    .map_err(DashboardError::from)
            },
        )?;

        let snapshot = DashboardAggregator::new(window).snapshot(&window_visits, &open_visits, &appointments, &invoices);
        Ok((snapshot, open_visits, appointments))
    }

    pub async fn dashboard_for(
        &self,
        role: StaffRole,
        query: &DashboardQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<RoleDashboard, DashboardError> {
        let now = Utc::now();
        let window = DashboardWindow::resolve(query, now)?;
        let (snapshot, open_visits, appointments) = self.snapshot(window, scope, auth_token).await?;

        info!(
            "Dashboard for {} at {:?}: {} visits, {} open",
            role,
            scope.branch_id(),
            snapshot.visits_today,
            open_visits.len()
        );

        Ok(project_for_role(
            role,
            scope.branch_id().map(str::to_string),
            window,
            snapshot,
            &open_visits,
            appointments,
            now,
        ))
    }
}
