use std::sync::Arc;
use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::roles::StaffRole;
use shared_utils::scope::{require_any_role, require_staff, BranchScope, ScopeQuery};
use visit_cell::VisitService;

use crate::models::{RegisterPatientRequest, UpdatePatientRequest, PatientSearchQuery};
use crate::services::PatientService;

const CHART_EDITORS: &[StaffRole] = &[StaffRole::FrontDesk, StaffRole::Nurse, StaffRole::Doctor];

#[axum::debug_handler]
pub async fn register_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[StaffRole::FrontDesk])?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;
    let branch_id = scope.require_branch()?;

    let service = PatientService::new(&config);
    let patient = service.register_patient(request, branch_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "patient": patient,
        "message": format!("Patient {} registered", patient.patient_number)
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = PatientService::new(&config);
    let patient = service.get_patient(&patient_id, &scope, auth.token()).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, CHART_EDITORS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = PatientService::new(&config);
    let patient = service.update_patient(&patient_id, request, &scope, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let service = PatientService::new(&config);
    let patients = service.search_patients(&query, &scope, auth.token()).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient_visits(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = PatientService::new(&config);
    let visits = VisitService::new(&config);
    let (patient, history) = service
        .patient_visits(&patient_id, &visits, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "patient_id": patient.id,
        "patient_number": patient.patient_number,
        "visits": history,
        "total": history.len()
    })))
}
