//! Session ownership and token freshness.
//!
//! [`SessionGuard`] is the only component that touches the token store.  It
//! never trusts a cached verdict: every [`SessionGuard::acquire`] is a fresh
//! round trip to the service, and a negative answer deletes the local token
//! on the spot, so a rejected session cannot come back without a new login.

use std::sync::{Arc, Mutex, PoisonError};

use crate::api::ChatApi;
use crate::error::{Error, Result};
use crate::observability::{SESSION_CHECKS, SESSION_LOGINS, SESSION_LOGOUTS, SESSION_REJECTIONS};
use crate::token_store::TokenStore;
use crate::types::{LoginParams, RegisterParams};

/// Reason given when login or registration cannot reach the service.
pub const NETWORK_FAILURE_REASON: &str = "network failure, try again later";

/// Outcome of the most recent server-side check of the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// No round trip has been made yet.
    #[default]
    Unknown,
    /// The last round trip accepted the token.
    Valid,
    /// The last round trip rejected the token, or there was none to check.
    Invalid,
}

/// A snapshot of the session.
///
/// `validity` describes the last round trip only; it is informational and is
/// never consulted in place of [`SessionGuard::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The stored token, if any.
    pub token: Option<String>,
    /// The verdict of the last check.
    pub validity: Validity,
}

/// Owns the session token and enforces its freshness.
pub struct SessionGuard {
    api: Arc<dyn ChatApi>,
    store: Arc<dyn TokenStore>,
    validity: Mutex<Validity>,
    // Serializes store mutations so a rejection of an old token cannot wipe a
    // token saved by a concurrent login.
    store_lock: Mutex<()>,
}

impl SessionGuard {
    /// Create a guard over the given service and token store.
    pub fn new(api: Arc<dyn ChatApi>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            store,
            validity: Mutex::new(Validity::Unknown),
            store_lock: Mutex::new(()),
        }
    }

    /// Return the stored token after the service has confirmed it.
    ///
    /// A missing token, a negative verdict, or any failure to obtain a verdict
    /// yields [`Error::Authentication`]; in the latter two cases the stored
    /// token is deleted first.
    pub async fn acquire(&self) -> Result<String> {
        SESSION_CHECKS.click();
        let Some(token) = self.store.load()? else {
            self.set_validity(Validity::Invalid);
            return Err(Error::authentication("not logged in"));
        };
        match self.api.check_token(&token).await {
            Ok(true) => {
                self.set_validity(Validity::Valid);
                Ok(token)
            }
            Ok(false) => Err(self.reject(&token, "token rejected by the service".to_string())),
            Err(err) => Err(self.reject(&token, format!("could not validate token: {err}"))),
        }
    }

    /// Returns true if [`acquire`](Self::acquire) succeeds right now.
    pub async fn is_authenticated(&self) -> bool {
        self.acquire().await.is_ok()
    }

    /// Submit credentials and store the issued token.
    ///
    /// Failures are always [`Error::Authentication`], carrying the service's
    /// reason or [`NETWORK_FAILURE_REASON`].
    pub async fn login(&self, login: &str, password: &str) -> Result<Session> {
        let params = LoginParams::new(login, password);
        let response = match self.api.login(&params).await {
            Ok(response) => response,
            Err(err) if err.is_transient() => {
                tracing::warn!(target: "pollchat::session", error = %err, "login request failed");
                return Err(Error::authentication(NETWORK_FAILURE_REASON));
            }
            Err(err) => return Err(Error::authentication(err.to_string())),
        };
        let token = response.into_token()?;
        {
            let _guard = self.store_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.store.save(&token)?;
        }
        self.set_validity(Validity::Valid);
        SESSION_LOGINS.click();
        tracing::info!(target: "pollchat::session", login, "logged in");
        Ok(Session {
            token: Some(token),
            validity: Validity::Valid,
        })
    }

    /// Validate and submit a registration, then log in with the same
    /// credentials.
    pub async fn register(&self, params: &RegisterParams, confirm_password: &str) -> Result<Session> {
        params.validate(confirm_password)?;
        let response = match self.api.register(params).await {
            Ok(response) => response,
            Err(err) if err.is_transient() => {
                tracing::warn!(target: "pollchat::session", error = %err, "register request failed");
                return Err(Error::connection(NETWORK_FAILURE_REASON, None));
            }
            Err(err) => return Err(err),
        };
        response.into_result()?;
        tracing::info!(target: "pollchat::session", login = %params.login, "registered");
        self.login(&params.login, &params.password).await
    }

    /// Forget the session locally and tell the service, best effort.
    ///
    /// The local token is deleted before the service is contacted, so it is
    /// gone even if the notification fails, times out, or is abandoned.
    pub async fn logout(&self) -> Result<()> {
        SESSION_LOGOUTS.click();
        let token = {
            let _guard = self.store_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let token = self.store.load().ok().flatten();
            self.set_validity(Validity::Invalid);
            self.store.clear()?;
            token
        };
        if let Some(token) = token
            && let Err(err) = self.api.logout(&token).await
        {
            tracing::debug!(target: "pollchat::session", error = %err, "logout notification failed");
        }
        Ok(())
    }

    /// Tear the session down after the service refused a request made with
    /// `token`.
    ///
    /// Nothing is deleted if the store already holds a different token.
    pub fn expire(&self, token: &str) {
        let _ = self.reject(token, "session expired".to_string());
    }

    /// A snapshot of the stored token and last verdict.
    pub fn session(&self) -> Session {
        Session {
            token: self.store.load().ok().flatten(),
            validity: *self.validity.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn set_validity(&self, validity: Validity) {
        *self.validity.lock().unwrap_or_else(PoisonError::into_inner) = validity;
    }

    fn reject(&self, token: &str, reason: String) -> Error {
        SESSION_REJECTIONS.click();
        tracing::warn!(target: "pollchat::session", reason = %reason, "session rejected");
        let _guard = self.store_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.store.load() {
            Ok(Some(current)) if current != token => {}
            _ => {
                self.set_validity(Validity::Invalid);
                if let Err(err) = self.store.clear() {
                    tracing::error!(target: "pollchat::session", error = %err, "failed to delete token");
                }
            }
        }
        Error::authentication(reason)
    }
}
