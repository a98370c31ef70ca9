//! Client-side predicates for credentials and profile fields.
//!
//! These mirror the service's own rules so obviously bad input is rejected
//! before a request is made.  None of them touch the network.

/// Shortest accepted login.
pub const LOGIN_MIN_LEN: usize = 3;
/// Longest accepted login.
pub const LOGIN_MAX_LEN: usize = 20;
/// Shortest accepted password.
pub const PASSWORD_MIN_LEN: usize = 6;
/// Shortest accepted first or last name.
pub const NAME_MIN_LEN: usize = 2;
/// Longest accepted first or last name.
pub const NAME_MAX_LEN: usize = 50;

/// A login is 3 to 20 ASCII letters, digits or underscores.
pub fn validate_login(login: &str) -> bool {
    (LOGIN_MIN_LEN..=LOGIN_MAX_LEN).contains(&login.len())
        && login
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// A password is at least six characters.
pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LEN
}

/// The confirmation must repeat the password exactly.
pub fn validate_password_match(password: &str, confirm: &str) -> bool {
    password == confirm
}

/// A name is 2 to 50 characters.
pub fn validate_name(name: &str) -> bool {
    (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name.chars().count())
}

/// A message is sendable if anything but whitespace remains after trimming.
pub fn validate_message(text: &str) -> bool {
    !text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_rules() {
        assert!(validate_login("ivan_p"));
        assert!(validate_login("abc"));
        assert!(validate_login("a2345678901234567890"));
        assert!(!validate_login("ab"));
        assert!(!validate_login("a23456789012345678901"));
        assert!(!validate_login("ivan-p"));
        assert!(!validate_login("иван"));
        assert!(!validate_login(""));
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("secret"));
        assert!(!validate_password("short"));
        assert!(validate_password_match("secret", "secret"));
        assert!(!validate_password_match("secret", "Secret"));
    }

    #[test]
    fn name_rules_count_characters() {
        assert!(validate_name("Ян"));
        assert!(!validate_name("Я"));
        assert!(validate_name(&"x".repeat(50)));
        assert!(!validate_name(&"x".repeat(51)));
    }

    #[test]
    fn message_rules() {
        assert!(validate_message(" hi "));
        assert!(!validate_message("   \n\t"));
        assert!(!validate_message(""));
    }
}
