use axum::{middleware, Router};

use crate::{
    auth::middleware::{authenticate, require_admin},
    state::AppState,
};

mod dto;
pub mod filter;
pub mod handlers;
pub mod repo;
pub mod repo_types;

/// Every task route requires a bearer token; stats and purge also need admin.
pub fn router(state: AppState) -> Router<AppState> {
    let admin = handlers::admin_routes().route_layer(middleware::from_fn(require_admin));

    handlers::task_routes()
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}
