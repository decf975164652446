// libs/visit-cell/src/services/workflow.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shared_models::roles::StaffRole;

use crate::models::{
    PatientVisit, StageData, StageRecord, VisitError, VisitStage, VisitStatus,
};

/// Whether a requested transition moved the visit or was a re-entry of the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Moved { from: VisitStage, to: VisitStage },
    AlreadyThere(VisitStage),
}

impl TransitionOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Moved { .. })
    }
}

/// The visit stage state machine. Pure: callers load and persist the visit.
#[derive(Debug, Clone, Default)]
pub struct VisitWorkflow;

impl VisitWorkflow {
    pub fn new() -> Self {
        Self
    }

    /// Forward moves allowed out of a stage, excluding the return to the front desk.
    fn forward_targets(&self, from: VisitStage) -> &'static [VisitStage] {
        match from {
            VisitStage::FrontDesk => &[VisitStage::Nurse],
            VisitStage::Nurse => &[VisitStage::Doctor],
            VisitStage::Doctor => &[VisitStage::Lab, VisitStage::Pharmacy, VisitStage::Billing],
            VisitStage::Lab => &[VisitStage::Pharmacy, VisitStage::Billing],
            VisitStage::Pharmacy => &[VisitStage::Billing],
            VisitStage::Billing => &[VisitStage::Completed],
            VisitStage::ReturnedToFrontDesk => &[VisitStage::Completed],
            VisitStage::Completed => &[],
        }
    }

    fn can_return_to_front_desk(&self, from: VisitStage) -> bool {
        matches!(
            from,
            VisitStage::FrontDesk
                | VisitStage::Nurse
                | VisitStage::Doctor
                | VisitStage::Lab
                | VisitStage::Pharmacy
                | VisitStage::Billing
        )
    }

    /// All valid next stages for a stage.
    pub fn get_valid_transitions(&self, from: VisitStage) -> Vec<VisitStage> {
        let mut targets = self.forward_targets(from).to_vec();
        if self.can_return_to_front_desk(from) {
            targets.push(VisitStage::ReturnedToFrontDesk);
        }
        targets
    }

    pub fn is_valid_transition(&self, from: VisitStage, to: VisitStage) -> bool {
        self.get_valid_transitions(from).contains(&to)
    }

    /// Next stages offered for this visit right now; empty once it is closed.
    pub fn allowed_transitions(&self, visit: &PatientVisit) -> Vec<VisitStage> {
        if !visit.is_open() {
            return Vec::new();
        }
        self.get_valid_transitions(visit.current_stage)
    }

    pub fn authorize(&self, role: StaffRole, stage: VisitStage) -> Result<(), VisitError> {
        if role.is_admin() || stage.owning_roles().contains(&role) {
            return Ok(());
        }
        warn!("Role {} attempted to act on stage {}", role, stage);
        Err(VisitError::Forbidden(format!(
            "Role {} cannot act on visits at the {} stage",
            role, stage
        )))
    }

    /// Decide whether `target` is reachable from the visit's current state.
    pub fn validate_transition(
        &self,
        visit: &PatientVisit,
        target: VisitStage,
    ) -> Result<TransitionOutcome, VisitError> {
        let from = visit.current_stage;
        debug!("Validating visit {} transition {} -> {}", visit.id, from, target);

        if visit.status == VisitStatus::Cancelled {
            return Err(VisitError::VisitClosed(visit.status));
        }

        if from == target {
            return Ok(TransitionOutcome::AlreadyThere(from));
        }

        if visit.status == VisitStatus::Completed {
            return Err(VisitError::VisitClosed(visit.status));
        }

        if !self.is_valid_transition(from, target) {
            warn!("Invalid visit transition attempted: {} -> {}", from, target);
            return Err(VisitError::InvalidTransition { from, to: target });
        }

        if target != VisitStage::ReturnedToFrontDesk {
            self.check_exit_requirements(visit, target)?;
        }

        Ok(TransitionOutcome::Moved { from, to: target })
    }

    /// Data a department must capture before the visit may leave it for `target`.
    pub fn check_exit_requirements(
        &self,
        visit: &PatientVisit,
        target: VisitStage,
    ) -> Result<(), VisitError> {
        match visit.current_stage {
            VisitStage::FrontDesk | VisitStage::ReturnedToFrontDesk | VisitStage::Completed => Ok(()),
            VisitStage::Nurse => {
                let recorded = visit
                    .nurse_data()
                    .map(|d| d.vitals.has_measurement())
                    .unwrap_or(false);
                if recorded {
                    Ok(())
                } else {
                    Err(VisitError::StageRequirement(
                        "vitals must be recorded before leaving the nurse station".to_string(),
                    ))
                }
            }
            VisitStage::Doctor => {
                let data = visit.doctor_data().ok_or_else(|| {
                    VisitError::StageRequirement("doctor has not recorded a consultation".to_string())
                })?;
                if data.diagnosis.trim().is_empty() {
                    return Err(VisitError::StageRequirement("a diagnosis is required".to_string()));
                }
                match target {
                    VisitStage::Lab if data.lab_orders.is_empty() => Err(VisitError::StageRequirement(
                        "at least one lab order is required to send the patient to the lab".to_string(),
                    )),
                    VisitStage::Pharmacy if data.prescriptions.is_empty() => Err(VisitError::StageRequirement(
                        "at least one prescription is required to send the patient to the pharmacy".to_string(),
                    )),
                    _ => Ok(()),
                }
            }
            VisitStage::Lab => {
                let has_results = visit.lab_data().map(|d| !d.results.is_empty()).unwrap_or(false);
                if has_results {
                    Ok(())
                } else {
                    Err(VisitError::StageRequirement(
                        "lab results must be recorded before leaving the lab".to_string(),
                    ))
                }
            }
            VisitStage::Pharmacy => {
                let dispensed = visit.pharmacy_data().map(|d| !d.dispensed.is_empty()).unwrap_or(false);
                if dispensed {
                    Ok(())
                } else {
                    Err(VisitError::StageRequirement(
                        "dispensed medication must be recorded before leaving the pharmacy".to_string(),
                    ))
                }
            }
            VisitStage::Billing => {
                let settled = visit.billing_data().map(|d| d.is_settled()).unwrap_or(false);
                if settled {
                    Ok(())
                } else {
                    Err(VisitError::StageRequirement(
                        "billing must be settled or invoiced before completing the visit".to_string(),
                    ))
                }
            }
        }
    }

    /// Validate and apply a transition in place.
    pub fn apply_transition(
        &self,
        visit: &mut PatientVisit,
        target: VisitStage,
        actor_id: &str,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, VisitError> {
        let outcome = self.validate_transition(visit, target)?;

        let TransitionOutcome::Moved { from, to } = outcome else {
            debug!("Visit {} already at {}, nothing to do", visit.id, target);
            return Ok(outcome);
        };

        let entered = visit.stage_entered_at;
        let departing = visit
            .stages
            .entry(from)
            .or_insert_with(|| StageRecord::opened_at(entered));
        departing.clock_out = Some(now);
        if departing.handled_by.is_none() {
            departing.handled_by = Some(actor_id.to_string());
        }
        if let Some(notes) = notes {
            departing.append_notes(notes);
        }

        if to == VisitStage::Completed {
            // Completion closes the visit; there is no department to clock into.
            visit.status = VisitStatus::Completed;
            visit.closed_at = Some(now);
        } else {
            visit.stages.insert(to, StageRecord::opened_at(now));
        }

        visit.current_stage = to;
        visit.stage_entered_at = now;
        visit.updated_at = now;

        info!("Visit {} moved {} -> {} by {}", visit.visit_number, from, to, actor_id);
        Ok(outcome)
    }

    /// Record department data on the visit's current stage.
    pub fn apply_stage_data(
        &self,
        visit: &mut PatientVisit,
        stage: VisitStage,
        data: StageData,
        notes: Option<&str>,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VisitError> {
        if !visit.is_open() {
            return Err(VisitError::VisitClosed(visit.status));
        }
        if visit.current_stage != stage {
            return Err(VisitError::StageMismatch { current: visit.current_stage, requested: stage });
        }
        if !data.belongs_to(stage) {
            return Err(VisitError::StageDataMismatch { stage, kind: data.kind().to_string() });
        }

        self.validate_stage_data(visit, &data)?;

        let entered = visit.stage_entered_at;
        let record = visit
            .stages
            .entry(stage)
            .or_insert_with(|| StageRecord::opened_at(entered));
        record.data = Some(data);
        record.handled_by = Some(actor_id.to_string());
        if let Some(notes) = notes {
            record.append_notes(notes);
        }
        visit.updated_at = now;

        debug!("Recorded {} data on visit {}", stage, visit.id);
        Ok(())
    }

    fn validate_stage_data(&self, visit: &PatientVisit, data: &StageData) -> Result<(), VisitError> {
        match data {
            StageData::Nurse(nurse) => {
                if !nurse.vitals.has_measurement() {
                    return Err(VisitError::ValidationError("at least one vital sign is required".to_string()));
                }
                nurse.vitals.validate()
            }
            StageData::Doctor(doctor) => {
                if doctor.prescriptions.iter().any(|p| p.medication.trim().is_empty()) {
                    return Err(VisitError::ValidationError("prescription medication is required".to_string()));
                }
                if doctor.lab_orders.iter().any(|o| o.test_name.trim().is_empty()) {
                    return Err(VisitError::ValidationError("lab order test name is required".to_string()));
                }
                Ok(())
            }
            StageData::Lab(lab) => {
                let ordered: Vec<String> = visit
                    .doctor_data()
                    .map(|d| d.lab_orders.iter().map(|o| o.test_name.trim().to_lowercase()).collect())
                    .unwrap_or_default();
                match lab
                    .results
                    .iter()
                    .find(|r| !ordered.contains(&r.test_name.trim().to_lowercase()))
                {
                    Some(unordered) => Err(VisitError::ValidationError(format!(
                        "result for {} has no matching lab order",
                        unordered.test_name
                    ))),
                    None => Ok(()),
                }
            }
            StageData::Pharmacy(pharmacy) => {
                if pharmacy.dispensed.iter().any(|d| d.quantity == 0) {
                    return Err(VisitError::ValidationError("dispensed quantity must be positive".to_string()));
                }
                Ok(())
            }
            StageData::Billing(billing) => {
                if billing.amount_charged < 0.0 || billing.amount_paid < 0.0 {
                    return Err(VisitError::ValidationError("billing amounts cannot be negative".to_string()));
                }
                Ok(())
            }
            StageData::FrontDesk(_) => Ok(()),
        }
    }

    /// Cancel an open visit, clocking out of the stage it was sitting in.
    pub fn apply_cancel(
        &self,
        visit: &mut PatientVisit,
        reason: &str,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VisitError> {
        if !visit.is_open() {
            return Err(VisitError::VisitClosed(visit.status));
        }
        if reason.trim().is_empty() {
            return Err(VisitError::ValidationError("a cancellation reason is required".to_string()));
        }

        let entered = visit.stage_entered_at;
        let record = visit
            .stages
            .entry(visit.current_stage)
            .or_insert_with(|| StageRecord::opened_at(entered));
        record.clock_out = Some(now);
        if record.handled_by.is_none() {
            record.handled_by = Some(actor_id.to_string());
        }

        visit.status = VisitStatus::Cancelled;
        visit.cancellation_reason = Some(reason.trim().to_string());
        visit.closed_at = Some(now);
        visit.updated_at = now;

        info!("Visit {} cancelled at {} by {}", visit.visit_number, visit.current_stage, actor_id);
        Ok(())
    }
}
