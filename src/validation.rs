use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// A single failed check, reported back to the caller by field name.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn check_username(username: &str) -> Option<FieldError> {
    let len = username.chars().count();
    if !(2..=20).contains(&len) {
        return Some(FieldError::new(
            "username",
            "Username must be between 2 and 20 characters.",
        ));
    }
    None
}

pub fn check_email(email: &str) -> Option<FieldError> {
    if !is_valid_email(email) {
        return Some(FieldError::new("email", "Invalid email address."));
    }
    None
}

pub fn check_password_pair(password: &str, confirm: &str) -> Option<FieldError> {
    if password.is_empty() {
        return Some(FieldError::new("password", "Password must not be empty."));
    }
    if password != confirm {
        return Some(FieldError::new(
            "confirm_password",
            "Passwords do not match.",
        ));
    }
    None
}

pub fn check_post_title(title: &str) -> Option<FieldError> {
    if title.trim().is_empty() {
        return Some(FieldError::new("title", "Title must not be empty."));
    }
    if title.chars().count() > 100 {
        return Some(FieldError::new(
            "title",
            "Title must be at most 100 characters.",
        ));
    }
    None
}

pub fn check_post_content(content: &str) -> Option<FieldError> {
    if content.trim().is_empty() {
        return Some(FieldError::new("content", "Content must not be empty."));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spaces in@x.com"));
        assert!(!is_valid_email("noext@host"));
    }

    #[test]
    fn username_bounds() {
        assert!(check_username("a").is_some());
        assert!(check_username("ab").is_none());
        assert!(check_username(&"x".repeat(20)).is_none());
        assert!(check_username(&"x".repeat(21)).is_some());
    }

    #[test]
    fn password_pair_checks() {
        assert!(check_password_pair("", "").is_some());
        assert!(check_password_pair("pw123", "pw124").is_some());
        assert!(check_password_pair("pw123", "pw123").is_none());
    }

    #[test]
    fn title_bounds() {
        assert!(check_post_title("").is_some());
        assert!(check_post_title("   ").is_some());
        assert!(check_post_title(&"t".repeat(100)).is_none());
        assert!(check_post_title(&"t".repeat(101)).is_some());
    }

    #[test]
    fn content_must_be_non_empty() {
        assert!(check_post_content("").is_some());
        assert!(check_post_content("hello").is_none());
    }
}
