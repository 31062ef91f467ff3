//! Input validation for RPC requests.
//!
//! Each validator returns `Err(message)` so handlers can collect failures
//! with `ValidationErrorBuilder::check`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::engine::{MAX_MONTHS, MIN_MONTHS};

pub const MIN_DELETE_AFTER_MINUTES: i64 = 1;
/// One week
pub const MAX_DELETE_AFTER_MINUTES: i64 = 10_080;

lazy_static! {
    /// Pragmatic email shape check: local@domain.tld
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();

    /// Opaque record ids (UUIDs in practice)
    static ref ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();

    static ref COUNTRY_REGEX: Regex = Regex::new(r"^[\p{L} .'-]{1,64}$").unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

/// Display name chosen at first login
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty".to_string());
    }
    if trimmed.chars().count() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Session and payment ids from the client
pub fn validate_id(field: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field));
    }
    if !ID_REGEX.is_match(id) {
        return Err(format!("{} is not a valid id", field));
    }
    Ok(())
}

pub fn validate_delete_after_minutes(minutes: i64) -> Result<(), String> {
    if !(MIN_DELETE_AFTER_MINUTES..=MAX_DELETE_AFTER_MINUTES).contains(&minutes) {
        return Err(format!(
            "Delete-after must be between {} and {} minutes",
            MIN_DELETE_AFTER_MINUTES, MAX_DELETE_AFTER_MINUTES
        ));
    }
    Ok(())
}

/// Preferred VPN country; an empty string clears the preference
pub fn validate_country(country: &str) -> Result<(), String> {
    if country.trim().is_empty() {
        return Ok(());
    }
    if !COUNTRY_REGEX.is_match(country) {
        return Err("Country must be a plain country name (max 64 characters)".to_string());
    }
    Ok(())
}

pub fn validate_months(months: i64) -> Result<(), String> {
    if !(MIN_MONTHS..=MAX_MONTHS).contains(&months) {
        return Err(format!(
            "Months must be between {} and {}",
            MIN_MONTHS, MAX_MONTHS
        ));
    }
    Ok(())
}
