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
    CancelInvoiceRequest, ClaimQuery, CreateInsuranceProviderRequest, CreateInvoiceRequest, InvoiceQuery,
    ProviderListQuery, RecordPaymentRequest, UpdateInsuranceProviderRequest,
};
use crate::services::{InsuranceService, InvoiceService};

const FINANCE: &[StaffRole] = &[StaffRole::Billing, StaffRole::Accounting];
const INVOICE_READERS: &[StaffRole] = &[StaffRole::Billing, StaffRole::Accounting, StaffRole::FrontDesk];

// ==============================================================================
// INVOICE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_invoice(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, FINANCE)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;
    let branch_id = scope.require_branch()?;

    let invoice_service = InvoiceService::new(&state);
    let visit_service = VisitService::new(&state);
    let invoice = invoice_service
        .create_invoice(request, &visit_service, &user, branch_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "invoice": invoice,
        "message": format!("Invoice {} created", invoice.invoice_number)
    })))
}

#[axum::debug_handler]
pub async fn list_invoices(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, INVOICE_READERS)?;
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let invoice_service = InvoiceService::new(&state);
    let invoices = invoice_service.list_invoices(&query, &scope, auth.token()).await?;

    Ok(Json(json!({
        "invoices": invoices,
        "total": invoices.len()
    })))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, INVOICE_READERS)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let invoice_service = InvoiceService::new(&state);
    let invoice = invoice_service.get_invoice(invoice_id, &scope, auth.token()).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, FINANCE)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let invoice_service = InvoiceService::new(&state);
    let (invoice, payment) = invoice_service
        .record_payment(invoice_id, request, &user, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "invoice": invoice
    })))
}

#[axum::debug_handler]
pub async fn cancel_invoice(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
    Query(scope_query): Query<ScopeQuery>,
    Json(request): Json<CancelInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, FINANCE)?;
    let scope = BranchScope::resolve(&user, scope_query.branch_id.as_deref())?;

    let invoice_service = InvoiceService::new(&state);
    let invoice = invoice_service
        .cancel_invoice(invoice_id, &request.reason, &scope, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "invoice": invoice,
        "message": "Invoice cancelled"
    })))
}

#[axum::debug_handler]
pub async fn get_claim_summary(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ClaimQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, FINANCE)?;
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let invoice_service = InvoiceService::new(&state);
    let claims = invoice_service.claim_summary(&query, &scope, auth.token()).await?;

    Ok(Json(json!({
        "claims": claims,
        "total": claims.len()
    })))
}

// ==============================================================================
// INSURANCE PROVIDER HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_insurance_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateInsuranceProviderRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[StaffRole::Accounting])?;

    let insurance_service = InsuranceService::new(&state);
    let provider = insurance_service.create_provider(request, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}

#[axum::debug_handler]
pub async fn list_insurance_providers(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ProviderListQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let insurance_service = InsuranceService::new(&state);
    let providers = insurance_service
        .list_providers(query.active_only.unwrap_or(false), auth.token())
        .await?;

    Ok(Json(json!({
        "providers": providers,
        "total": providers.len()
    })))
}

#[axum::debug_handler]
pub async fn get_insurance_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let insurance_service = InsuranceService::new(&state);
    let provider = insurance_service.get_provider(provider_id, auth.token()).await?;

    Ok(Json(json!(provider)))
}

#[axum::debug_handler]
pub async fn update_insurance_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<UpdateInsuranceProviderRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[StaffRole::Accounting])?;

    let insurance_service = InsuranceService::new(&state);
    let provider = insurance_service
        .update_provider(provider_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}
