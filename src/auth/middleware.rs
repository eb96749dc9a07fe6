use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{
    auth::{extractors::AuthUser, repo_types::Role},
    error::AppError,
    state::AppState,
};

/// Verifies the bearer token and attaches an [`AuthUser`] to the request.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let claims = state.keys.verify_header(header).map_err(|e| {
        warn!(reason = %e, uri = %req.uri(), "rejected bearer credential");
        AppError::from(e)
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role: claims.role,
    });
    Ok(next.run(req).await)
}

/// Lets the request through only if the attached identity holds one of
/// `allowed`. Without an identity the request is treated as unauthenticated.
pub async fn require_roles(
    allowed: &[Role],
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    if !allowed.contains(&user.role) {
        warn!(user_id = %user.id, role = %user.role, ?allowed, "role not permitted");
        return Err(AppError::Forbidden("Access denied".into()));
    }

    Ok(next.run(req).await)
}

pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    require_roles(&[Role::Admin], req, next).await
}
