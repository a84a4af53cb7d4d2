//! Input validation.
//!
//! A field is checked against a list of [`Rule`]s and every failure is pushed
//! onto a [`Validator`]; callers collect all failures before answering instead
//! of stopping at the first one.

use crate::auth::models::{PrincipalUpdate, RegisterRequest};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_]{3,20}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    MinLen(usize),
    MaxLen(usize),
    Email,
    Username,
    Password,
    Url,
}

impl Rule {
    /// Failures of `value` against this rule as `(code, message)` pairs.
    /// Format rules skip empty values; `Required` reports those.
    fn violations(self, value: &str) -> Vec<(&'static str, String)> {
        let len = value.chars().count();
        match self {
            Rule::Required if value.trim().is_empty() => {
                vec![("REQUIRED", "This field is required".to_string())]
            }
            Rule::MinLen(min) if len < min => vec![(
                "MIN_LENGTH",
                format!("Minimum length is {min} characters"),
            )],
            Rule::MaxLen(max) if len > max => vec![(
                "MAX_LENGTH",
                format!("Maximum length is {max} characters"),
            )],
            Rule::Email if !value.is_empty() && !EMAIL_RE.is_match(value) => {
                vec![("INVALID_EMAIL", "Invalid email format".to_string())]
            }
            Rule::Username if !value.is_empty() && !USERNAME_RE.is_match(value) => vec![(
                "INVALID_USERNAME",
                "Username must be 3-20 characters, alphanumeric and underscores only".to_string(),
            )],
            Rule::Password if !value.is_empty() => password_violations(value),
            Rule::Url
                if !value.is_empty()
                    && !(value.starts_with("http://") || value.starts_with("https://")) =>
            {
                vec![(
                    "INVALID_URL",
                    "URL must start with http:// or https://".to_string(),
                )]
            }
            _ => Vec::new(),
        }
    }
}

fn password_violations(value: &str) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    if value.chars().count() < 8 {
        out.push((
            "PASSWORD_TOO_SHORT",
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_upper = value.chars().any(char::is_uppercase);
    let has_lower = value.chars().any(char::is_lowercase);
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_special = value
        .chars()
        .any(|c| c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace()));

    let classes = [
        (has_upper, "PASSWORD_NO_UPPER", "one uppercase letter"),
        (has_lower, "PASSWORD_NO_LOWER", "one lowercase letter"),
        (has_digit, "PASSWORD_NO_DIGIT", "one digit"),
        (has_special, "PASSWORD_NO_SPECIAL", "one special character"),
    ];
    for (present, code, what) in classes {
        if !present {
            out.push((code, format!("Password must contain at least {what}")));
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, field: &str, value: &str, rules: &[Rule]) -> &mut Self {
        for rule in rules {
            for (code, message) in rule.violations(value) {
                self.add(field, message, code);
            }
        }
        self
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>, code: &'static str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
            code,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Trim and escape HTML-significant characters.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Sanitizes the free-text fields in place; the password is left untouched.
pub fn validate_registration(req: &mut RegisterRequest) -> Result<(), Vec<FieldError>> {
    req.username = sanitize(&req.username);
    req.email = sanitize(&req.email);
    req.first_name = sanitize(&req.first_name);
    req.last_name = sanitize(&req.last_name);

    let mut v = Validator::new();
    v.check("username", &req.username, &[Rule::Required, Rule::Username])
        .check("email", &req.email, &[Rule::Required, Rule::Email, Rule::MaxLen(100)])
        .check("password", &req.password, &[Rule::Required, Rule::Password])
        .check("first_name", &req.first_name, &[Rule::MaxLen(50)])
        .check("last_name", &req.last_name, &[Rule::MaxLen(50)]);
    v.finish()
}

/// Only the fields present in the update are checked.
pub fn validate_user_update(update: &mut PrincipalUpdate) -> Result<(), Vec<FieldError>> {
    let mut v = Validator::new();

    if let Some(username) = update.username.as_mut() {
        *username = sanitize(username);
        v.check("username", username, &[Rule::Required, Rule::Username]);
    }
    if let Some(email) = update.email.as_mut() {
        *email = sanitize(email);
        v.check("email", email, &[Rule::Required, Rule::Email, Rule::MaxLen(100)]);
    }
    if let Some(first_name) = update.first_name.as_mut() {
        *first_name = sanitize(first_name);
        v.check("first_name", first_name, &[Rule::MaxLen(50)]);
    }
    if let Some(last_name) = update.last_name.as_mut() {
        *last_name = sanitize(last_name);
        v.check("last_name", last_name, &[Rule::MaxLen(50)]);
    }

    v.finish()
}
