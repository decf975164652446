use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn billing_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/invoices", post(handlers::create_invoice).get(handlers::list_invoices))
        .route("/invoices/{invoice_id}", get(handlers::get_invoice))
        .route("/invoices/{invoice_id}/payments", post(handlers::record_payment))
        .route("/invoices/{invoice_id}/cancel", post(handlers::cancel_invoice))
        .route("/claims", get(handlers::get_claim_summary))
        .route("/insurance", post(handlers::create_insurance_provider).get(handlers::list_insurance_providers))
        .route(
            "/insurance/{provider_id}",
            get(handlers::get_insurance_provider).put(handlers::update_insurance_provider),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
