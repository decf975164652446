use chrono::{DateTime, Utc};

use crate::models::{PatientVisit, QueueEntry, VisitStage};

/// First-come-first-served view of the open visits sitting at `stage`.
pub fn build_queue(visits: &[PatientVisit], stage: VisitStage, now: DateTime<Utc>) -> Vec<QueueEntry> {
    let mut waiting: Vec<&PatientVisit> = visits
        .iter()
        .filter(|v| v.is_open() && v.current_stage == stage)
        .collect();

    // Ties broken by visit number so positions are stable between polls.
    waiting.sort_by(|a, b| {
        a.stage_entered_at
            .cmp(&b.stage_entered_at)
            .then_with(|| a.visit_number.cmp(&b.visit_number))
    });

    waiting
        .into_iter()
        .enumerate()
        .map(|(index, visit)| QueueEntry {
            position: index + 1,
            visit_id: visit.id,
            visit_number: visit.visit_number.clone(),
            patient_id: visit.patient_id,
            stage,
            stage_entered_at: visit.stage_entered_at,
            waiting_minutes: (now - visit.stage_entered_at).num_minutes().max(0),
        })
        .collect()
}
