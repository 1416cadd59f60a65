//! Declarative payload validation.
//!
//! A [`ValidationSchema`] is an ordered list of field rules. Validation walks
//! every rule and collects every violation, so a client sees all problems
//! with a submission at once.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9\s\-\(\)\.]{7,20}$").expect("phone regex is valid")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("url regex is valid")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").expect("date regex is valid")
});

/// Expected value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Email,
    Phone,
    Url,
    Number,
    Boolean,
    /// `YYYY-MM-DD`.
    Date,
}

/// Custom check returning an error message on failure.
pub type CustomCheck = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Rules for one field.
#[derive(Clone)]
pub struct FieldRule {
    pub required: bool,
    pub field_type: FieldType,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<(Regex, String)>,
    pub validate: Option<CustomCheck>,
    /// Never sanitized, never logged.
    pub sensitive: bool,
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule")
            .field("required", &self.required)
            .field("field_type", &self.field_type)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern.as_ref().map(|(re, _)| re.as_str()))
            .field("validate", &self.validate.is_some())
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

impl FieldRule {
    fn of(field_type: FieldType) -> Self {
        Self {
            required: false,
            field_type,
            min_length: None,
            max_length: None,
            pattern: None,
            validate: None,
            sensitive: false,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn email() -> Self {
        Self::of(FieldType::Email)
    }

    pub fn phone() -> Self {
        Self::of(FieldType::Phone)
    }

    pub fn url() -> Self {
        Self::of(FieldType::Url)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::of(FieldType::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn length(self, min: usize, max: usize) -> Self {
        self.min_length(min).max_length(max)
    }

    /// Require a regex match; `message` is reported as `"<field> <message>"`.
    ///
    /// # Panics
    /// If `pattern` is not a valid regex. Schemas are declared in code.
    pub fn pattern(mut self, pattern: &str, message: &str) -> Self {
        let re = Regex::new(pattern).unwrap_or_else(|e| panic!("invalid schema pattern {pattern}: {e}"));
        self.pattern = Some((re, message.to_string()));
        self
    }

    pub fn validate<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(check));
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Ordered field rules for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: Vec<(String, FieldRule)>,
}

impl ValidationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        self.fields.push((name.to_string(), rule));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, rule)| rule)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.rule(name).is_some_and(|rule| rule.sensitive)
    }
}

/// Result of validating a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Validate `payload` against `schema`.
pub fn validate(payload: &Map<String, Value>, schema: &ValidationSchema) -> ValidationOutcome {
    let mut errors = Vec::new();

    for (name, rule) in schema.fields() {
        let value = payload.get(name).filter(|v| !is_absent(v));
        match value {
            None if rule.required => errors.push(format!("{} is required", name)),
            None => {}
            Some(value) => check_field(name, value, rule, &mut errors),
        }
    }

    ValidationOutcome {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Missing, null, or whitespace-only text.
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn check_field(name: &str, value: &Value, rule: &FieldRule, errors: &mut Vec<String>) {
    if let Some(message) = type_error(name, value, rule.field_type) {
        errors.push(message);
        return;
    }

    if let Value::String(text) = value {
        let length = text.trim().chars().count();
        if let Some(min) = rule.min_length {
            if length < min {
                errors.push(format!("{} must be at least {} characters", name, min));
            }
        }
        if let Some(max) = rule.max_length {
            if length > max {
                errors.push(format!("{} must be no more than {} characters", name, max));
            }
        }
        if let Some((re, message)) = &rule.pattern {
            if !re.is_match(text.trim()) {
                errors.push(format!("{} {}", name, message));
            }
        }
    }

    if let Some(check) = &rule.validate {
        if let Some(message) = check(value) {
            errors.push(message);
        }
    }
}

fn type_error(name: &str, value: &Value, field_type: FieldType) -> Option<String> {
    let text = value.as_str().map(str::trim);
    let ok = match field_type {
        FieldType::String => text.is_some(),
        FieldType::Email => text.is_some_and(|t| EMAIL_RE.is_match(t)),
        FieldType::Phone => text.is_some_and(|t| PHONE_RE.is_match(t)),
        FieldType::Url => text.is_some_and(|t| URL_RE.is_match(t)),
        FieldType::Date => text.is_some_and(|t| DATE_RE.is_match(t)),
        FieldType::Number => {
            value.is_number() || text.is_some_and(|t| t.parse::<f64>().is_ok_and(f64::is_finite))
        }
        FieldType::Boolean => value.is_boolean(),
    };
    if ok {
        return None;
    }

    Some(match field_type {
        FieldType::String => format!("{} must be text", name),
        FieldType::Email => format!("{} must be a valid email address", name),
        FieldType::Phone => format!("{} must be a valid phone number", name),
        FieldType::Url => format!("{} must be a valid URL", name),
        FieldType::Number => format!("{} must be a number", name),
        FieldType::Boolean => format!("{} must be true or false", name),
        FieldType::Date => format!("{} must be a date in YYYY-MM-DD format", name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> ValidationSchema {
        ValidationSchema::new()
            .field("name", FieldRule::string().required().length(2, 10))
            .field("email", FieldRule::email().required())
            .field("phone", FieldRule::phone())
            .field("code", FieldRule::string().pattern(r"^[A-Z]{3}$", "must be three capital letters"))
    }

    #[test]
    fn test_empty_payload_names_required_fields() {
        let outcome = validate(&Map::new(), &schema());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec!["name is required", "email is required"]);
    }

    #[test]
    fn test_accumulates_errors_across_fields() {
        let outcome = validate(
            &payload(json!({
                "name": "A",
                "email": "not-an-email",
                "phone": "abc",
                "code": "abc",
            })),
            &schema(),
        );
        assert_eq!(
            outcome.errors,
            vec![
                "name must be at least 2 characters",
                "email must be a valid email address",
                "phone must be a valid phone number",
                "code must be three capital letters",
            ]
        );
    }

    #[test]
    fn test_optional_absent_fields_skipped() {
        let outcome = validate(
            &payload(json!({ "name": "Ada", "email": "ada@example.com", "phone": "  ", "code": null })),
            &schema(),
        );
        assert!(outcome.is_valid, "{:?}", outcome.errors);
    }

    #[test]
    fn test_whitespace_counts_as_missing_for_required() {
        let outcome = validate(&payload(json!({ "name": "   ", "email": "a@b.co" })), &schema());
        assert_eq!(outcome.errors, vec!["name is required"]);
    }

    #[test]
    fn test_wrong_type_reported_once() {
        let outcome = validate(&payload(json!({ "name": 42, "email": "a@b.co" })), &schema());
        assert_eq!(outcome.errors, vec!["name must be text"]);
    }

    #[test]
    fn test_max_length_counts_characters() {
        let outcome = validate(
            &payload(json!({ "name": "ééééééééééé", "email": "a@b.co" })),
            &schema(),
        );
        assert_eq!(outcome.errors, vec!["name must be no more than 10 characters"]);
    }

    #[test]
    fn test_custom_check() {
        let schema = ValidationSchema::new().field(
            "age",
            FieldRule::number().required().validate(|v| {
                let n = v.as_f64().unwrap_or(0.0);
                (n < 18.0).then(|| "age must be at least 18".to_string())
            }),
        );
        assert!(validate(&payload(json!({ "age": 30 })), &schema).is_valid);
        assert_eq!(
            validate(&payload(json!({ "age": 12 })), &schema).errors,
            vec!["age must be at least 18"]
        );
    }

    #[test]
    fn test_number_boolean_date_url() {
        let schema = ValidationSchema::new()
            .field("size", FieldRule::number())
            .field("agree", FieldRule::boolean())
            .field("day", FieldRule::date())
            .field("site", FieldRule::url());

        assert!(validate(
            &payload(json!({ "size": "12.5", "agree": true, "day": "2026-03-01", "site": "https://example.com/x" })),
            &schema
        )
        .is_valid);

        let outcome = validate(
            &payload(json!({ "size": "big", "agree": "yes", "day": "2026-13-01", "site": "ftp://x" })),
            &schema,
        );
        assert_eq!(outcome.errors.len(), 4);
    }

    #[test]
    fn test_sensitive_lookup() {
        let schema = ValidationSchema::new().field("password", FieldRule::string().sensitive());
        assert!(schema.is_sensitive("password"));
        assert!(!schema.is_sensitive("email"));
    }
}
