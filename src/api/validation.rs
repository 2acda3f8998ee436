//! Input validation for API requests.
//!
//! Validators return `Err(message)` on failure. Collect them into an
//! `ApiError` with `ValidationErrorBuilder` from the `error` module.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{AppointmentStatus, ROOM_IDS};

lazy_static! {
    /// Loose email shape check; the mail server is the real authority
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// 24-hour `HH:MM`
    static ref TIME_REGEX: Regex = Regex::new(
        r"^([01][0-9]|2[0-3]):[0-5][0-9]$"
    ).unwrap();

    /// Digits, spaces and the usual phone punctuation
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9 ()\-.]{6,20}$"
    ).unwrap();
}

/// A required free-text field: present, not blank, at most `max` characters.
/// Returns the trimmed value.
pub fn required_text(value: Option<&str>, label: &str, max: usize) -> Result<String, String> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(value.to_string())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 || email.chars().any(char::is_control) || !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

/// Validate an optional email (empty string treated as absent)
pub fn validate_optional_email(email: &Option<String>) -> Result<(), String> {
    match email.as_deref() {
        Some(e) if !e.is_empty() => validate_email(e),
        _ => Ok(()),
    }
}

pub fn validate_phone(phone: &Option<String>) -> Result<(), String> {
    match phone.as_deref() {
        Some(p) if !p.is_empty() && !PHONE_REGEX.is_match(p) => {
            Err("Invalid phone number".to_string())
        }
        _ => Ok(()),
    }
}

/// Room ids are a single letter A-Z. Lowercase input is accepted and upper-cased.
pub fn parse_room_id(id: Option<&str>) -> Result<String, String> {
    let id = id.map(str::trim).unwrap_or_default().to_uppercase();
    if id.is_empty() {
        return Err("Room id is required".to_string());
    }
    if id.chars().count() != 1 || !ROOM_IDS.contains(id.as_str()) {
        return Err("Room id must be a single letter from A to Z".to_string());
    }
    Ok(id)
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(date: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| "Invalid date format. Use YYYY-MM-DD".to_string())
}

pub fn validate_time(time: &str) -> Result<(), String> {
    if TIME_REGEX.is_match(time.trim()) {
        Ok(())
    } else {
        Err("Invalid time format. Use HH:MM (24-hour)".to_string())
    }
}

/// Parse an appointment status; only the exact labels are accepted.
pub fn parse_status(status: &str) -> Result<AppointmentStatus, String> {
    status.parse::<AppointmentStatus>().map_err(|_| {
        let valid: Vec<&str> = AppointmentStatus::ALL.iter().map(|s| s.as_str()).collect();
        format!("Invalid status. Must be one of: {}", valid.join(", "))
    })
}

pub fn validate_capacity(capacity: Option<u32>) -> Result<(), String> {
    match capacity {
        Some(0) => Err("Capacity must be at least 1".to_string()),
        Some(c) if c > 100 => Err("Capacity is too high (max 100)".to_string()),
        _ => Ok(()),
    }
}

/// Password rules for staff accounts
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_uppercase {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !has_lowercase {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}
