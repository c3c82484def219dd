//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` on failure. Collect them into an
//! `ApiError` with `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email check: something@something.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// HTTP/HTTPS URL for externally hosted media
    static ref HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9.]*(:\d+)?(/\S*)?$"
    ).unwrap();

    /// CSS hex color, e.g. #3B82F6 or #fff
    static ref HEX_COLOR_REGEX: Regex = Regex::new(
        r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$"
    ).unwrap();
}

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_RATING: f64 = 5.0;

/// Item types an order line may reference
const ORDER_ITEM_TYPES: [&str; 2] = ["book", "video"];

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
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

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }

    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Display name is required".to_string());
    }

    if name.chars().count() > 100 {
        return Err("Display name is too long (max 100 characters)".to_string());
    }

    Ok(())
}

/// Required short text such as a title, author or instructor
pub fn validate_required_text(value: &str, label: &str, max: usize) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }

    if value.chars().count() > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }

    Ok(())
}

pub fn validate_optional_text(value: &Option<String>, label: &str, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(format!("{} is too long (max {} characters)", label, max))
        }
        _ => Ok(()),
    }
}

pub fn validate_rating(rating: f64) -> Result<(), String> {
    if !rating.is_finite() || !(0.0..=MAX_RATING).contains(&rating) {
        return Err(format!("Rating must be between 0 and {}", MAX_RATING));
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be zero or positive".to_string());
    }
    Ok(())
}

pub fn validate_non_negative(value: i64, label: &str) -> Result<(), String> {
    if value < 0 {
        return Err(format!("{} must be zero or positive", label));
    }
    Ok(())
}

pub fn validate_media_url(url: &Option<String>) -> Result<(), String> {
    if let Some(u) = url {
        if u.is_empty() {
            return Ok(());
        }

        if u.len() > 2048 {
            return Err("URL is too long (max 2048 characters)".to_string());
        }

        if !HTTP_URL_REGEX.is_match(u) {
            return Err("URL must be an http(s) address".to_string());
        }
    }
    Ok(())
}

pub fn validate_color(color: &Option<String>) -> Result<(), String> {
    match color {
        Some(c) if !HEX_COLOR_REGEX.is_match(c) => {
            Err("Color must be a hex value like #3B82F6".to_string())
        }
        _ => Ok(()),
    }
}

pub fn validate_item_type(item_type: &str) -> Result<(), String> {
    if !ORDER_ITEM_TYPES.contains(&item_type) {
        return Err(format!(
            "Invalid item type. Must be one of: {}",
            ORDER_ITEM_TYPES.join(", ")
        ));
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if !(1..=1000).contains(&quantity) {
        return Err("Quantity must be between 1 and 1000".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("reader@example.com").is_ok());
        assert!(validate_email("  reader@example.com ").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("reader").is_err());
        assert!(validate_email("reader@example").is_err());
        assert!(validate_email("read er@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Ada").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_required_text() {
        assert!(validate_required_text("Dune", "Title", 200).is_ok());
        assert_eq!(
            validate_required_text("", "Title", 200).unwrap_err(),
            "Title is required"
        );
        assert!(validate_required_text("abc", "Title", 2).is_err());
    }

    #[test]
    fn test_validate_rating() {
        assert!(validate_rating(0.0).is_ok());
        assert!(validate_rating(4.5).is_ok());
        assert!(validate_rating(5.0).is_ok());
        assert!(validate_rating(5.1).is_err());
        assert!(validate_rating(-1.0).is_err());
        assert!(validate_rating(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0.0).is_ok());
        assert!(validate_price(19.99).is_ok());
        assert!(validate_price(-0.01).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_media_url() {
        assert!(validate_media_url(&None).is_ok());
        assert!(validate_media_url(&Some(String::new())).is_ok());
        assert!(validate_media_url(&Some("https://cdn.example.com/v/1.mp4".to_string())).is_ok());
        assert!(validate_media_url(&Some("ftp://example.com/v.mp4".to_string())).is_err());
        assert!(validate_media_url(&Some("javascript:alert(1)".to_string())).is_err());
    }

    #[test]
    fn test_validate_color() {
        assert!(validate_color(&None).is_ok());
        assert!(validate_color(&Some("#fff".to_string())).is_ok());
        assert!(validate_color(&Some("#3B82F6".to_string())).is_ok());
        assert!(validate_color(&Some("blue".to_string())).is_err());
    }

    #[test]
    fn test_validate_order_fields() {
        assert!(validate_item_type("book").is_ok());
        assert!(validate_item_type("video").is_ok());
        assert!(validate_item_type("course").is_err());
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1001).is_err());
    }
}
