use std::borrow::Cow;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use time::{macros::format_description, Date, OffsetDateTime, PrimitiveDateTime};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::AppError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Builds a `ValidationError` whose message is shown to clients verbatim.
pub(crate) fn violation(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

pub(crate) fn validate_email(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(violation("email", "Please provide a valid email address"))
    }
}

/// Accepts RFC 3339 date-times, ISO date-times without an offset and plain
/// `YYYY-MM-DD` dates. Values without an offset are taken as UTC.
pub(crate) fn parse_iso_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(at) = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = PrimitiveDateTime::parse(
        raw,
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute][optional [:[second][optional [.[subsecond]]]]]"
        ),
    ) {
        return Some(at.assume_utc());
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Trims string fields before any rule sees them.
pub(crate) fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(|s| s.trim().to_string()))
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Key validator uses for struct-level (`schema`) violations.
const SCHEMA_KEY: &str = "__all__";

/// Flattens validator output into `(field, message)` pairs.
fn field_messages(errors: &ValidationErrors) -> Vec<(String, String)> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|msg| msg.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            })
        })
        .collect()
}

fn into_messages(mut pairs: Vec<(String, String)>) -> Vec<String> {
    pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    pairs.into_iter().map(|(_, message)| message).collect()
}

/// Client messages ordered by field name.
fn collect_messages(errors: &ValidationErrors) -> Vec<String> {
    into_messages(field_messages(errors))
}

/// JSON type a body field must have. `null` is always admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Boolean,
}

impl JsonKind {
    fn admits(self, value: &Value) -> bool {
        value.is_null()
            || match self {
                JsonKind::String => value.is_string(),
                JsonKind::Boolean => value.is_boolean(),
            }
    }
}

/// Expected type of one body field. `key` is the JSON name, `field` the
/// struct field the rule errors are keyed by.
#[derive(Debug, Clone, Copy)]
pub struct FieldType {
    pub key: &'static str,
    pub field: &'static str,
    pub kind: JsonKind,
    pub message: &'static str,
}

impl FieldType {
    pub const fn text(key: &'static str, field: &'static str, message: &'static str) -> Self {
        Self {
            key,
            field,
            kind: JsonKind::String,
            message,
        }
    }

    pub const fn flag(key: &'static str, field: &'static str, message: &'static str) -> Self {
        Self {
            key,
            field,
            kind: JsonKind::Boolean,
            message,
        }
    }
}

/// Field types of a request body, checked before deserialization so a
/// mismatch is reported next to the rule violations instead of replacing them.
pub trait BodyFields {
    const FIELDS: &'static [FieldType];
}

/// Nulls out every field whose JSON type is wrong and returns the struct
/// fields that were affected together with their messages.
fn check_field_types(
    object: &mut serde_json::Map<String, Value>,
    fields: &[FieldType],
) -> Vec<(String, String)> {
    let mut mismatches = Vec::new();
    for expected in fields {
        if let Some(value) = object.get_mut(expected.key) {
            if !expected.kind.admits(value) {
                *value = Value::Null;
                mismatches.push((expected.field.to_string(), expected.message.to_string()));
            }
        }
    }
    mismatches
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Missing 'Content-Type: application/json' header".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON".to_string(),
        _ => "Invalid request body".to_string(),
    }
}

/// JSON body extractor that checks field types, runs the `validator` rules of
/// `T` and rejects with every violation found.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + BodyFields,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(mut body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(vec![rejection_message(&rejection)]))?;

        let mismatches = match body.as_object_mut() {
            Some(object) => check_field_types(object, T::FIELDS),
            None => {
                return Err(AppError::Validation(vec![
                    "Request body must be a JSON object".to_string(),
                ]))
            }
        };

        let value: T = serde_json::from_value(body)
            .map_err(|_| AppError::Validation(vec!["Invalid request body".to_string()]))?;

        // A nulled field would also trip its own rules and the schema rules.
        let rule_errors = match value.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => field_messages(&errors),
        };
        let mut problems: Vec<(String, String)> = rule_errors
            .into_iter()
            .filter(|(field, _)| {
                let shadowed = mismatches.iter().any(|(bad, _)| bad == field);
                let schema = field == SCHEMA_KEY && !mismatches.is_empty();
                !shadowed && !schema
            })
            .collect();
        problems.extend(mismatches);

        if !problems.is_empty() {
            return Err(AppError::Validation(into_messages(problems)));
        }
        Ok(ValidatedJson(value))
    }
}
