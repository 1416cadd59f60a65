//! Validation schemas for the gated endpoints.

use std::sync::LazyLock;

use serde_json::Value;

use crate::security::validator::{FieldRule, ValidationSchema};

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub static CONTACT_FORM: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field("name", FieldRule::string().required().length(2, 100))
        .field("email", FieldRule::email().required().max_length(254))
        .field("phone", FieldRule::phone())
        .field("subject", FieldRule::string().max_length(200))
        .field("message", FieldRule::string().required().length(10, 5000))
});

pub static NEWSLETTER_SIGNUP: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field("email", FieldRule::email().required().max_length(254))
        .field("name", FieldRule::string().max_length(100))
});

pub static LOGIN: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field("email", FieldRule::email().required().max_length(254))
        .field("password", FieldRule::string().required().max_length(128).sensitive())
});

pub static REGISTRATION: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field("name", FieldRule::string().required().length(2, 100))
        .field("email", FieldRule::email().required().max_length(254))
        .field(
            "password",
            FieldRule::string()
                .required()
                .length(8, 128)
                .sensitive()
                .validate(password_strength),
        )
        .field("phone", FieldRule::phone())
});

pub static APPOINTMENT_BOOKING: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field("name", FieldRule::string().required().length(2, 100))
        .field("email", FieldRule::email().required().max_length(254))
        .field("phone", FieldRule::phone().required())
        .field(
            "serviceType",
            FieldRule::string()
                .required()
                .pattern(r"^[a-z0-9_\-]{2,50}$", "must be a known service identifier"),
        )
        .field("preferredDate", FieldRule::date().required())
        .field("notes", FieldRule::string().max_length(1000))
});

pub static UPLOAD_METADATA: LazyLock<ValidationSchema> = LazyLock::new(|| {
    ValidationSchema::new()
        .field(
            "fileName",
            FieldRule::string()
                .required()
                .length(1, 255)
                .pattern(r"^[A-Za-z0-9 _\-]+\.[A-Za-z0-9]{1,8}$", "must be a plain file name"),
        )
        .field(
            "contentType",
            FieldRule::string().required().pattern(
                r"^(image/(jpeg|png|webp|gif)|application/pdf)$",
                "must be an accepted file type",
            ),
        )
        .field("size", FieldRule::number().required().validate(upload_size))
});

fn password_strength(value: &Value) -> Option<String> {
    let password = value.as_str()?;
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if has_letter && has_digit {
        None
    } else {
        Some("password must contain at least one letter and one number".to_string())
    }
}

fn upload_size(value: &Value) -> Option<String> {
    let size = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
    if size <= 0.0 || size > MAX_UPLOAD_BYTES as f64 {
        Some(format!("size must be between 1 and {} bytes", MAX_UPLOAD_BYTES))
    } else {
        None
    }
}
