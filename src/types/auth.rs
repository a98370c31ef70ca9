use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::validation;

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginParams {
    /// Login name.
    pub login: String,

    /// Password in clear; the transport is expected to provide secrecy.
    pub password: String,
}

impl LoginParams {
    /// Create new login parameters.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// Body returned by `POST /api/auth/login`.
///
/// The service answers `{"status": "success", "auth_token": ...}` on success
/// and an error object otherwise; both shapes deserialize into this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    /// `"success"` when the credentials were accepted.
    #[serde(default)]
    pub status: Option<String>,

    /// The issued token.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Error kind or reason.
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable reason.
    #[serde(default)]
    pub message: Option<String>,
}

impl LoginResponse {
    /// Turn the response into the issued token or an authentication error
    /// carrying the server-supplied reason.
    pub fn into_token(self) -> Result<String> {
        match (self.status.as_deref(), self.auth_token) {
            (Some("success"), Some(token)) if !token.is_empty() => Ok(token),
            _ => Err(Error::authentication(
                self.message
                    .or(self.error)
                    .unwrap_or_else(|| "login failed".to_string()),
            )),
        }
    }
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterParams {
    /// Login name, `[A-Za-z0-9_]{3,20}`.
    pub login: String,

    /// Password, at least six characters.
    pub password: String,

    /// Given name, 2 to 50 characters.
    pub first_name: String,

    /// Family name, 2 to 50 characters.
    pub last_name: String,
}

impl RegisterParams {
    /// Create new registration parameters.  Names and login are trimmed.
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into().trim().to_string(),
            password: password.into(),
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
        }
    }

    /// Check every field and the password confirmation, reporting all
    /// violations at once.
    pub fn validate(&self, confirm_password: &str) -> Result<()> {
        let mut errors = Vec::new();
        if self.login.is_empty() {
            errors.push("login is required");
        } else if !validation::validate_login(&self.login) {
            errors.push("login must be 3 to 20 letters, digits or underscores");
        }
        if self.password.is_empty() {
            errors.push("password is required");
        } else if !validation::validate_password(&self.password) {
            errors.push("password must be at least 6 characters");
        }
        if !validation::validate_password_match(&self.password, confirm_password) {
            errors.push("passwords do not match");
        }
        if self.first_name.is_empty() {
            errors.push("first name is required");
        } else if !validation::validate_name(&self.first_name) {
            errors.push("first name must be 2 to 50 characters");
        }
        if self.last_name.is_empty() {
            errors.push("last name is required");
        } else if !validation::validate_name(&self.last_name) {
            errors.push("last name must be 2 to 50 characters");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(errors.join(", "), None))
        }
    }

    /// The credentials to log in with after a successful registration.
    pub fn login_params(&self) -> LoginParams {
        LoginParams::new(self.login.clone(), self.password.clone())
    }
}

/// Body returned by `POST /api/auth/register`.
///
/// Deployments answer either `{"status": "success"}` or
/// `{"success": true}`; failures carry `error` and possibly `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    /// `"success"` on success.
    #[serde(default)]
    pub status: Option<String>,

    /// `true` on success.
    #[serde(default)]
    pub success: Option<bool>,

    /// Error kind or reason.
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable reason.
    #[serde(default)]
    pub message: Option<String>,
}

impl RegisterResponse {
    /// Returns true if the service accepted the registration.
    pub fn is_success(&self) -> bool {
        self.success == Some(true) || self.status.as_deref() == Some("success")
    }

    /// Turn the response into `Ok(())` or an error with the server's reason.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::validation(
                self.message
                    .or(self.error)
                    .unwrap_or_else(|| "registration failed".to_string()),
                None,
            ))
        }
    }
}

/// Body of `POST /api/check_token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckTokenParams {
    /// The token to validate.
    pub token: String,
}

/// Body returned by `POST /api/check_token`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckTokenResponse {
    /// Whether the service still knows the token.
    #[serde(default)]
    pub check_status: bool,
}
