use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, RegisterResponse},
        password::{hash_password, verify_password},
        repo_types::{NewUser, Role},
    },
    error::AppError,
    state::AppState,
    validation::ValidatedJson,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let RegisterRequest {
        email,
        password,
        name,
        role,
    } = payload;
    let email = email.unwrap_or_default().trim().to_lowercase();
    let password = password.unwrap_or_default();
    let name = name.unwrap_or_default().trim().to_string();
    let role = role
        .as_deref()
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or_default();

    let existing = state
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| AppError::internal("Registration failed", e))?;
    if existing.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    let password_hash =
        hash_password(&password).map_err(|e| AppError::internal("Registration failed", e))?;

    let user = state
        .users
        .create(NewUser {
            email,
            password_hash,
            name,
            role,
        })
        .await
        .map_err(|e| AppError::internal("Registration failed", e))?
        .ok_or_else(|| AppError::BadRequest("Email already registered".into()))?;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.unwrap_or_default().trim().to_lowercase();
    let password = payload.password.unwrap_or_default();

    let user = match state
        .users
        .find_by_email(&email)
        .await
        .map_err(|e| AppError::internal("Login failed", e))?
    {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
    };

    let ok = verify_password(&password, &user.password_hash)
        .map_err(|e| AppError::internal("Login failed", e))?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = state
        .keys
        .sign(user.id, user.role)
        .map_err(|e| AppError::internal("Login failed", e))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user: PublicUser::from(user),
    }))
}
