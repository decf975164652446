// libs/visit-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn visit_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_visit).get(handlers::list_visits))
        .route("/queue/{stage}", get(handlers::get_department_queue))
        .route("/{visit_id}", get(handlers::get_visit))
        .route("/{visit_id}/transitions", get(handlers::get_allowed_transitions))
        .route("/{visit_id}/stages/{stage}", put(handlers::record_stage_data))
        .route("/{visit_id}/transition", post(handlers::transition_visit))
        .route("/{visit_id}/return", post(handlers::return_to_front_desk))
        .route("/{visit_id}/cancel", post(handlers::cancel_visit))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
