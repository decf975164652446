// libs/visit-cell/src/services/visit.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::filters::RestQuery;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::roles::StaffRole;
use shared_utils::identifiers::visit_number;
use shared_utils::scope::BranchScope;

use crate::models::{
    BillingData, CreateVisitRequest, DepartmentQueue, FrontDeskData, PatientVisit, RecordStageDataRequest,
    StageData, StageRecord, TransitionRequest, TransitionResult, VisitError, VisitListQuery,
    VisitStage, VisitStatus,
};
use crate::services::queue::build_queue;
use crate::services::workflow::VisitWorkflow;

const VISITS_TABLE: &str = "patient_visits";
const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

pub struct VisitService {
    supabase: Arc<SupabaseClient>,
    workflow: VisitWorkflow,
}

impl VisitService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            workflow: VisitWorkflow::new(),
        }
    }

    pub fn workflow(&self) -> &VisitWorkflow {
        &self.workflow
    }

    fn actor_role(user: &User) -> Result<StaffRole, VisitError> {
        user.staff_role()
            .ok_or_else(|| VisitError::Forbidden("Staff role required".to_string()))
    }

    fn scoped(query: RestQuery, scope: &BranchScope) -> RestQuery {
        query.eq_opt("branch_id", scope.branch_id())
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<PatientVisit>, VisitError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| VisitError::DatabaseError(format!("Failed to parse visit: {}", e)))
            })
            .collect()
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, VisitError> {
        let rows: AnyResult<Vec<Value>> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await;
        rows.map_err(|e| VisitError::DatabaseError(e.to_string()))
    }

    // ==============================================================================
    // REGISTRATION
    // ==============================================================================

    pub async fn create_visit(
        &self,
        request: CreateVisitRequest,
        user: &User,
        branch_id: &str,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let role = Self::actor_role(user)?;
        self.workflow.authorize(role, VisitStage::FrontDesk)?;

        debug!("Opening visit for patient {} in branch {}", request.patient_id, branch_id);

        let patient_path = RestQuery::table("patients")
            .eq("id", request.patient_id)
            .eq("branch_id", branch_id)
            .limit(1)
            .build();
        if self.fetch(&patient_path, auth_token).await?.is_empty() {
            return Err(VisitError::PatientNotFound);
        }

        let open_path = RestQuery::table(VISITS_TABLE)
            .eq("patient_id", request.patient_id)
            .eq("branch_id", branch_id)
            .eq("status", VisitStatus::InProgress)
            .limit(1)
            .build();
        if let Some(open) = Self::parse_rows(self.fetch(&open_path, auth_token).await?)?.into_iter().next() {
            warn!("Patient {} already has open visit {}", request.patient_id, open.visit_number);
            return Err(VisitError::DuplicateOpenVisit(open.visit_number));
        }

        let now = Utc::now();
        let visit = Self::new_visit(request, user, branch_id, now);

        let body = serde_json::to_value(&visit)
            .map_err(|e| VisitError::DatabaseError(e.to_string()))?;
        let rows = self.supabase
            .request_returning(Method::POST, &RestQuery::table(VISITS_TABLE).build(), Some(auth_token), body)
            .await
            .map_err(|e| VisitError::DatabaseError(e.to_string()))?;

        let created = Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| VisitError::DatabaseError("Failed to create visit".to_string()))?;

        info!("Visit {} opened for patient {} by {}", created.visit_number, created.patient_id, user.id);
        Ok(created)
    }

    fn new_visit(request: CreateVisitRequest, user: &User, branch_id: &str, now: DateTime<Utc>) -> PatientVisit {
        let id = Uuid::new_v4();

        let mut front_desk = StageRecord::opened_at(now);
        front_desk.handled_by = Some(user.id.clone());
        front_desk.data = Some(StageData::FrontDesk(FrontDeskData {
            reason_for_visit: request.reason_for_visit,
            referral_source: request.referral_source,
            checked_in_by: Some(user.id.clone()),
        }));

        let mut stages = BTreeMap::new();
        stages.insert(VisitStage::FrontDesk, front_desk);

        PatientVisit {
            id,
            visit_number: visit_number(now, id),
            branch_id: branch_id.to_string(),
            patient_id: request.patient_id,
            appointment_id: request.appointment_id,
            current_stage: VisitStage::FrontDesk,
            status: VisitStatus::InProgress,
            stage_entered_at: now,
            stages,
            cancellation_reason: None,
            closed_at: None,
            created_by: user.id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_visit(
        &self,
        visit_id: Uuid,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let path = Self::scoped(RestQuery::table(VISITS_TABLE).eq("id", visit_id), scope)
            .limit(1)
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)?
            .into_iter()
            .next()
            .ok_or(VisitError::NotFound)
    }

    pub async fn list_visits(
        &self,
        query: &VisitListQuery,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<Vec<PatientVisit>, VisitError> {
        let mut rest = Self::scoped(RestQuery::table(VISITS_TABLE), scope)
            .eq_opt("current_stage", query.stage)
            .eq_opt("status", query.status)
            .eq_opt("patient_id", query.patient_id);

        if let Some(from) = query.from_date {
            rest = rest.gte("created_at", from);
        }
        if let Some(to) = query.to_date {
            rest = rest.lt("created_at", to);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let path = rest
            .order("created_at.desc")
            .limit(limit)
            .offset(query.offset.unwrap_or(0).max(0))
            .build();

        Self::parse_rows(self.fetch(&path, auth_token).await?)
    }

    /// Every visit created in a window, for dashboard aggregation.
    pub async fn visits_in_window(
        &self,
        scope: &BranchScope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<PatientVisit>, VisitError> {
        let path = Self::scoped(RestQuery::table(VISITS_TABLE), scope)
            .gte("created_at", from)
            .lt("created_at", to)
            .order("created_at.asc")
            .build();
        Self::parse_rows(self.fetch(&path, auth_token).await?)
    }

    /// Every visit still in progress, whenever it was opened.
    pub async fn open_visits(&self, scope: &BranchScope, auth_token: &str) -> Result<Vec<PatientVisit>, VisitError> {
        let path = Self::scoped(RestQuery::table(VISITS_TABLE), scope)
            .eq("status", VisitStatus::InProgress)
            .order("stage_entered_at.asc")
            .build();
        Self::parse_rows(self.fetch(&path, auth_token).await?)
    }

    pub async fn department_queue(
        &self,
        stage: VisitStage,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<DepartmentQueue, VisitError> {
        if stage.is_terminal() {
            return Err(VisitError::ValidationError("completed visits have no queue".to_string()));
        }

        let path = Self::scoped(RestQuery::table(VISITS_TABLE), scope)
            .eq("current_stage", stage)
            .eq("status", VisitStatus::InProgress)
            .order("stage_entered_at.asc")
            .build();
        let visits = Self::parse_rows(self.fetch(&path, auth_token).await?)?;

        let entries = build_queue(&visits, stage, Utc::now());
        let longest_wait_minutes = entries.iter().map(|e| e.waiting_minutes).max().unwrap_or(0);
        debug!("Queue {} has {} waiting", stage, entries.len());

        Ok(DepartmentQueue {
            stage,
            branch_id: scope.branch_id().map(str::to_string),
            entries,
            longest_wait_minutes,
        })
    }

    // ==============================================================================
    // STAGE WORK
    // ==============================================================================

    pub async fn record_stage_data(
        &self,
        visit_id: Uuid,
        stage: VisitStage,
        request: RecordStageDataRequest,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let role = Self::actor_role(user)?;
        let mut visit = self.get_visit(visit_id, scope, auth_token).await?;
        self.workflow.authorize(role, stage)?;

        let expected = visit.current_stage;
        self.workflow.apply_stage_data(
            &mut visit,
            stage,
            request.data,
            request.notes.as_deref(),
            &user.id,
            Utc::now(),
        )?;

        let saved = self.persist(&visit, expected, auth_token).await?;
        info!("Recorded {} data on visit {} by {}", stage, saved.visit_number, user.id);
        Ok(saved)
    }

    pub async fn transition(
        &self,
        visit_id: Uuid,
        request: TransitionRequest,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<TransitionResult, VisitError> {
        let role = Self::actor_role(user)?;
        let mut visit = self.get_visit(visit_id, scope, auth_token).await?;
        let from_stage = visit.current_stage;
        // Closed visits have no owning department; the workflow reports them as closed.
        if visit.is_open() {
            self.workflow.authorize(role, from_stage)?;
        }

        let outcome = self.workflow.apply_transition(
            &mut visit,
            request.target_stage,
            &user.id,
            request.notes.as_deref(),
            Utc::now(),
        )?;

        if !outcome.changed() {
            return Ok(TransitionResult { visit, changed: false, from_stage });
        }

        let saved = self.persist(&visit, from_stage, auth_token).await?;
        Ok(TransitionResult { visit: saved, changed: true, from_stage })
    }

    pub async fn return_to_front_desk(
        &self,
        visit_id: Uuid,
        reason: &str,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<TransitionResult, VisitError> {
        if reason.trim().is_empty() {
            return Err(VisitError::ValidationError("a reason is required to return a visit".to_string()));
        }
        let request = TransitionRequest {
            target_stage: VisitStage::ReturnedToFrontDesk,
            notes: Some(reason.to_string()),
        };
        self.transition(visit_id, request, user, scope, auth_token).await
    }

    pub async fn cancel_visit(
        &self,
        visit_id: Uuid,
        reason: &str,
        user: &User,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let role = Self::actor_role(user)?;
        self.workflow.authorize(role, VisitStage::FrontDesk)?;

        let mut visit = self.get_visit(visit_id, scope, auth_token).await?;
        let expected = visit.current_stage;
        self.workflow.apply_cancel(&mut visit, reason, &user.id, Utc::now())?;

        self.persist(&visit, expected, auth_token).await
    }

    /// Link a visit to the invoice raised for it, recording the charge on the billing stage.
    pub async fn attach_invoice(
        &self,
        visit_id: Uuid,
        invoice_id: Uuid,
        amount_charged: f64,
        scope: &BranchScope,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let mut visit = self.get_visit(visit_id, scope, auth_token).await?;
        if visit.current_stage != VisitStage::Billing || !visit.is_open() {
            debug!("Visit {} not at billing, invoice link skipped", visit.visit_number);
            return Ok(visit);
        }

        let amount_paid = visit.billing_data().map(|b| b.amount_paid).unwrap_or(0.0);
        let expected = visit.current_stage;
        let entered = visit.stage_entered_at;
        let record = visit
            .stages
            .entry(VisitStage::Billing)
            .or_insert_with(|| StageRecord::opened_at(entered));
        record.data = Some(StageData::Billing(BillingData {
            invoice_id: Some(invoice_id),
            amount_charged,
            amount_paid,
        }));
        visit.updated_at = Utc::now();

        self.persist(&visit, expected, auth_token).await
    }

    /// Write back the mutable part of a visit, guarded on the stage it was read at.
    async fn persist(
        &self,
        visit: &PatientVisit,
        expected_stage: VisitStage,
        auth_token: &str,
    ) -> Result<PatientVisit, VisitError> {
        let path = RestQuery::table(VISITS_TABLE)
            .eq("id", visit.id)
            .eq("current_stage", expected_stage)
            .eq("status", VisitStatus::InProgress)
            .build();

        let body = json!({
            "current_stage": visit.current_stage,
            "status": visit.status,
            "stage_entered_at": visit.stage_entered_at,
            "stages": visit.stages,
            "cancellation_reason": visit.cancellation_reason,
            "closed_at": visit.closed_at,
            "updated_at": visit.updated_at,
        });

        let rows = self.supabase
            .request_returning(Method::PATCH, &path, Some(auth_token), body)
            .await
            .map_err(|e| VisitError::DatabaseError(e.to_string()))?;

        match Self::parse_rows(rows)?.into_iter().next() {
            Some(saved) => Ok(saved),
            None => {
                warn!("Visit {} changed underneath this update (expected stage {})", visit.id, expected_stage);
                Err(VisitError::ConcurrentUpdate)
            }
        }
    }
}
