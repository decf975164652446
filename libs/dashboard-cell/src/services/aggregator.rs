use std::collections::BTreeMap;

use appointment_cell::Appointment;
use billing_cell::services::calculation::round_cents;
use billing_cell::Invoice;
use visit_cell::{PatientVisit, VisitStage, VisitStatus};

use crate::models::{DashboardSnapshot, DashboardWindow};

/// Turns raw rows into dashboard figures. Holds no I/O so every number can be
/// checked against hand-built fixtures.
#[derive(Debug, Clone, Copy)]
pub struct DashboardAggregator {
    window: DashboardWindow,
}

impl DashboardAggregator {
    pub fn new(window: DashboardWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> DashboardWindow {
        self.window
    }

    /// `window_visits` are visits opened inside the window; `open_visits` are
    /// every in-progress visit regardless of age.
    pub fn snapshot(
        &self,
        window_visits: &[PatientVisit],
        open_visits: &[PatientVisit],
        appointments: &[Appointment],
        invoices: &[Invoice],
    ) -> DashboardSnapshot {
        DashboardSnapshot {
            stage_counts: self.stage_counts(open_visits),
            visits_today: window_visits.len(),
            completed_today: count_status(window_visits, VisitStatus::Completed),
            cancelled_today: count_status(window_visits, VisitStatus::Cancelled),
            consultations_today: self.consultations(window_visits),
            average_minutes_in_stage: self.average_minutes_in_stage(window_visits),
            appointments_by_status: self.appointments_by_status(appointments),
            revenue_collected: self.revenue_collected(invoices),
            outstanding_balance: self.outstanding_balance(invoices),
            invoices_by_status: self.invoices_by_status(invoices),
        }
    }

    pub fn stage_counts(&self, open_visits: &[PatientVisit]) -> BTreeMap<VisitStage, usize> {
        let mut counts: BTreeMap<VisitStage, usize> =
            VisitStage::DEPARTMENTS.iter().map(|stage| (*stage, 0)).collect();
        for visit in open_visits.iter().filter(|v| v.is_open()) {
            *counts.entry(visit.current_stage).or_insert(0) += 1;
        }
        counts
    }

    /// Visits whose doctor stage was clocked into inside the window.
    pub fn consultations(&self, visits: &[PatientVisit]) -> usize {
        visits
            .iter()
            .filter(|v| {
                v.stages
                    .get(&VisitStage::Doctor)
                    .is_some_and(|record| self.window.contains(record.clock_in))
            })
            .count()
    }

    pub fn average_minutes_in_stage(&self, visits: &[PatientVisit]) -> BTreeMap<VisitStage, f64> {
        let mut totals: BTreeMap<VisitStage, (i64, usize)> = BTreeMap::new();
        for (stage, minutes) in visits.iter().flat_map(|v| v.stage_durations()) {
            let entry = totals.entry(stage).or_insert((0, 0));
            entry.0 += minutes;
            entry.1 += 1;
        }

        totals
            .into_iter()
            .map(|(stage, (sum, count))| (stage, round_cents(sum as f64 / count as f64)))
            .collect()
    }

    pub fn appointments_by_status(&self, appointments: &[Appointment]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for appointment in appointments.iter().filter(|a| self.window.contains(a.scheduled_at)) {
            *counts.entry(appointment.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Money received inside the window, whatever invoice it landed on.
    pub fn revenue_collected(&self, invoices: &[Invoice]) -> f64 {
        let total: f64 = invoices
            .iter()
            .flat_map(|invoice| invoice.payments.iter())
            .filter(|payment| self.window.contains(payment.received_at))
            .map(|payment| payment.amount)
            .sum();
        round_cents(total)
    }

    pub fn outstanding_balance(&self, invoices: &[Invoice]) -> f64 {
        let total: f64 = invoices
            .iter()
            .filter(|invoice| invoice.status.is_open())
            .map(|invoice| invoice.balance.max(0.0))
            .sum();
        round_cents(total)
    }

    pub fn invoices_by_status(&self, invoices: &[Invoice]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for invoice in invoices {
            *counts.entry(invoice.status.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

fn count_status(visits: &[PatientVisit], status: VisitStatus) -> usize {
    visits.iter().filter(|v| v.status == status).count()
}
