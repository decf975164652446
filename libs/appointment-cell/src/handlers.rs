// libs/appointment-cell/src/handlers.rs
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
use shared_models::roles::StaffRole;
use shared_utils::scope::{require_any_role, require_staff, BranchScope, ScopeQuery};
use visit_cell::VisitService;

use crate::models::{
    AppointmentQuery, BookAppointmentRequest, CancelAppointmentRequest,
    RescheduleAppointmentRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

const SCHEDULERS: &[StaffRole] = &[StaffRole::FrontDesk, StaffRole::Doctor];

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, SCHEDULERS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;
    let branch_id = scope.require_branch()?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .book_appointment(request, branch_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service
        .list_appointments(&query, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id, &scope, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, SCHEDULERS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .update_status(appointment_id, request, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, SCHEDULERS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .reschedule_appointment(appointment_id, request, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, SCHEDULERS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service
        .cancel_appointment(appointment_id, &request.reason, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn check_in_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[StaffRole::FrontDesk])?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let booking_service = AppointmentBookingService::new(&state);
    let visit_service = VisitService::new(&state);
    let result = booking_service
        .check_in(appointment_id, &visit_service, &user, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": result.appointment,
        "visit": result.visit,
        "message": format!("Checked in as visit {}", result.visit.visit_number)
    })))
}
