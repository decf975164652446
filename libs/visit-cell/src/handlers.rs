// libs/visit-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::scope::{BranchScope, ScopeQuery};

use crate::models::{
    CancelVisitRequest, CreateVisitRequest, RecordStageDataRequest, ReturnToFrontDeskRequest,
    TransitionRequest, VisitListQuery, VisitStage,
};
use crate::services::visit::VisitService;

#[axum::debug_handler]
pub async fn create_visit(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<CreateVisitRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;
    let branch_id = scope.require_branch()?;

    let service = VisitService::new(&state);
    let visit = service.create_visit(request, &user, branch_id, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit,
        "message": format!("Visit {} opened", visit.visit_number)
    })))
}

#[axum::debug_handler]
pub async fn list_visits(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<VisitListQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let visits = service.list_visits(&query, &scope, auth.token()).await?;

    Ok(Json(json!({
        "visits": visits,
        "total": visits.len()
    })))
}

#[axum::debug_handler]
pub async fn get_visit(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(visit_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let visit = service.get_visit(visit_id, &scope, auth.token()).await?;

    Ok(Json(json!(visit)))
}

#[axum::debug_handler]
pub async fn get_allowed_transitions(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(visit_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let visit = service.get_visit(visit_id, &scope, auth.token()).await?;

    let can_act = user
        .staff_role()
        .map(|role| service.workflow().authorize(role, visit.current_stage).is_ok())
        .unwrap_or(false);

    Ok(Json(json!({
        "visit_id": visit.id,
        "current_stage": visit.current_stage,
        "status": visit.status,
        "allowed_transitions": service.workflow().allowed_transitions(&visit),
        "can_act": can_act
    })))
}

#[axum::debug_handler]
pub async fn record_stage_data(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((visit_id, stage)): Path<(Uuid, VisitStage)>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<RecordStageDataRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let visit = service
        .record_stage_data(visit_id, stage, request, &user, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit
    })))
}

#[axum::debug_handler]
pub async fn transition_visit(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(visit_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let result = service.transition(visit_id, request, &user, &scope, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "changed": result.changed,
        "from_stage": result.from_stage,
        "visit": result.visit
    })))
}

#[axum::debug_handler]
pub async fn return_to_front_desk(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(visit_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<ReturnToFrontDeskRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let result = service
        .return_to_front_desk(visit_id, &request.reason, &user, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "changed": result.changed,
        "from_stage": result.from_stage,
        "visit": result.visit
    })))
}

#[axum::debug_handler]
pub async fn cancel_visit(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(visit_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<CancelVisitRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let visit = service
        .cancel_visit(visit_id, &request.reason, &user, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "visit": visit,
        "message": "Visit cancelled"
    })))
}

#[axum::debug_handler]
pub async fn get_department_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(stage): Path<VisitStage>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let service = VisitService::new(&state);
    let queue = service.department_queue(stage, &scope, auth.token()).await?;

    Ok(Json(json!(queue)))
}
