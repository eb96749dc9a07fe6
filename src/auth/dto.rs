use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::repo_types::{Role, User},
    validation::{trimmed, validate_email, violation, BodyFields, FieldType},
};

fn validate_role(role: &str) -> Result<(), ValidationError> {
    role.parse::<Role>()
        .map(|_| ())
        .map_err(|_| violation("role", "Role must be one of: regular, admin"))
}

/// Request body for user registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Email is required"),
        custom(function = "validate_email")
    )]
    pub email: Option<String>,
    #[validate(
        required(message = "Password is required"),
        length(min = 8, message = "Password must be at least 8 characters")
    )]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Name is required"),
        length(min = 2, message = "Name must be at least 2 characters")
    )]
    pub name: Option<String>,
    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        required(message = "Email is required"),
        custom(function = "validate_email")
    )]
    pub email: Option<String>,
    #[validate(required(message = "Password is required"))]
    pub password: Option<String>,
}

impl BodyFields for RegisterRequest {
    const FIELDS: &'static [FieldType] = &[
        FieldType::text("email", "email", "Please provide a valid email address"),
        FieldType::text("password", "password", "Password must be a string"),
        FieldType::text("name", "name", "Name must be a string"),
        FieldType::text("role", "role", "Role must be one of: regular, admin"),
    ];
}

impl BodyFields for LoginRequest {
    const FIELDS: &'static [FieldType] = &[
        FieldType::text("email", "email", "Please provide a valid email address"),
        FieldType::text("password", "password", "Password must be a string"),
    ];
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: PublicUser,
}
