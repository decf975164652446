use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use appointment_cell::Appointment;
use shared_models::roles::StaffRole;
use visit_cell::services::build_queue;
use visit_cell::{PatientVisit, VisitStage};

use crate::models::{DashboardSnapshot, DashboardWindow, FinancialSummary, RoleDashboard, VisitActivity};

fn queues_for(role: StaffRole) -> Vec<VisitStage> {
    match role {
        StaffRole::Admin => VisitStage::DEPARTMENTS.to_vec(),
        StaffRole::FrontDesk => vec![VisitStage::FrontDesk, VisitStage::ReturnedToFrontDesk],
        StaffRole::Nurse => vec![VisitStage::Nurse],
        StaffRole::Doctor => vec![VisitStage::Doctor],
        StaffRole::Lab => vec![VisitStage::Lab],
        StaffRole::Pharmacy => vec![VisitStage::Pharmacy],
        StaffRole::Billing | StaffRole::Accounting => vec![VisitStage::Billing],
    }
}

/// Cuts the branch snapshot down to what `role` works with.
pub fn project_for_role(
    role: StaffRole,
    branch_id: Option<String>,
    window: DashboardWindow,
    snapshot: DashboardSnapshot,
    open_visits: &[PatientVisit],
    appointments: Vec<Appointment>,
    now: DateTime<Utc>,
) -> RoleDashboard {
    let queues: BTreeMap<VisitStage, Vec<_>> = queues_for(role)
        .into_iter()
        .map(|stage| (stage, build_queue(open_visits, stage, now)))
        .collect();

    let front_desk = matches!(role, StaffRole::FrontDesk | StaffRole::Admin);
    let clinical_lead = matches!(role, StaffRole::Doctor | StaffRole::Admin);

    let mut todays_appointments: Vec<Appointment> = appointments
        .into_iter()
        .filter(|a| window.contains(a.scheduled_at))
        .collect();
    todays_appointments.sort_by_key(|a| a.scheduled_at);

    RoleDashboard {
        role,
        branch_id,
        window,
        queues,
        new_visits: front_desk.then_some(snapshot.visits_today),
        consultations_today: clinical_lead.then_some(snapshot.consultations_today),
        appointments_today: front_desk.then_some(todays_appointments),
        appointments_by_status: role.is_admin().then(|| snapshot.appointments_by_status.clone()),
        activity: role.is_admin().then(|| VisitActivity {
            visits_today: snapshot.visits_today,
            completed_today: snapshot.completed_today,
            cancelled_today: snapshot.cancelled_today,
            stage_counts: snapshot.stage_counts.clone(),
            average_minutes_in_stage: snapshot.average_minutes_in_stage.clone(),
        }),
        financial: role.is_finance().then(|| FinancialSummary {
            revenue_collected: snapshot.revenue_collected,
            outstanding_balance: snapshot.outstanding_balance,
            invoices_by_status: snapshot.invoices_by_status.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> DashboardWindow {
        DashboardWindow {
            from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    fn project(role: StaffRole) -> RoleDashboard {
        let snapshot = DashboardSnapshot {
            visits_today: 4,
            consultations_today: 2,
            revenue_collected: 150.0,
            ..Default::default()
        };
        project_for_role(role, Some("b1".to_string()), window(), snapshot, &[], vec![], window().from)
    }

    #[test]
    fn nurse_sees_only_nurse_queue() {
        let view = project(StaffRole::Nurse);
        assert_eq!(view.queues.keys().copied().collect::<Vec<_>>(), vec![VisitStage::Nurse]);
        assert!(view.financial.is_none());
        assert!(view.appointments_today.is_none());
        assert!(view.consultations_today.is_none());
    }

    #[test]
    fn front_desk_sees_both_desk_queues_and_new_visits() {
        let view = project(StaffRole::FrontDesk);
        assert!(view.queues.contains_key(&VisitStage::FrontDesk));
        assert!(view.queues.contains_key(&VisitStage::ReturnedToFrontDesk));
        assert_eq!(view.new_visits, Some(4));
        assert_eq!(view.appointments_today.map(|a| a.len()), Some(0));
        assert!(view.financial.is_none());
    }

    #[test]
    fn doctor_sees_consultations() {
        let view = project(StaffRole::Doctor);
        assert_eq!(view.consultations_today, Some(2));
        assert!(view.new_visits.is_none());
    }

    #[test]
    fn accounting_sees_financials_and_billing_queue() {
        let view = project(StaffRole::Accounting);
        assert_eq!(view.queues.keys().copied().collect::<Vec<_>>(), vec![VisitStage::Billing]);
        assert_eq!(view.financial.map(|f| f.revenue_collected), Some(150.0));
    }

    #[test]
    fn admin_sees_everything() {
        let view = project(StaffRole::Admin);
        assert_eq!(view.queues.len(), VisitStage::DEPARTMENTS.len());
        assert!(view.activity.is_some());
        assert!(view.financial.is_some());
        assert!(view.appointments_by_status.is_some());
        assert_eq!(view.new_visits, Some(4));
        assert_eq!(view.consultations_today, Some(2));
    }
}
