use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::scope::{require_staff, BranchScope};

use crate::models::DashboardQuery;
use crate::services::DashboardService;

#[axum::debug_handler]
pub async fn get_dashboard(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Value>, AppError> {
    let role = require_staff(&user)?;
    let scope = BranchScope::resolve(&user, query.branch_id.as_deref())?;

    let dashboard_service = DashboardService::new(&state);
    let dashboard = dashboard_service
        .dashboard_for(role, &query, &scope, auth.token())
        .await?;

    Ok(Json(json!(dashboard)))
}
