//! The service contract consumed by the synchronization core.
//!
//! [`ChatApi`] has one method per endpoint.  [`ChatClient`](crate::ChatClient)
//! implements it over HTTP; tests substitute a scripted implementation.
//! Methods that need authentication take the token explicitly so callers must
//! obtain it from the [`SessionGuard`](crate::SessionGuard) first.

use crate::error::Result;
use crate::types::{
    LoginParams, LoginResponse, Message, PresenceSnapshot, RegisterParams, RegisterResponse,
    SendMessageParams, User,
};

/// Operations offered by the remote chat service.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /api/auth/login`.
    ///
    /// Returns the decoded body for both accepted and rejected credentials;
    /// only transport problems are errors.
    async fn login(&self, params: &LoginParams) -> Result<LoginResponse>;

    /// `POST /api/auth/register`.
    async fn register(&self, params: &RegisterParams) -> Result<RegisterResponse>;

    /// `POST /api/auth/logout`.
    async fn logout(&self, token: &str) -> Result<()>;

    /// `POST /api/check_token`; `Ok(true)` only if the service still knows
    /// the token.
    async fn check_token(&self, token: &str) -> Result<bool>;

    /// `GET /api/users/me`.
    async fn current_user(&self, token: &str) -> Result<User>;

    /// `GET /api/messages?limit=N`: the most recent `limit` messages, oldest
    /// first.
    async fn history(&self, token: &str, limit: u32) -> Result<Vec<Message>>;

    /// `GET /api/messages/new?after_id=ID`: every message with an id greater
    /// than `after_id`, in server order.
    async fn messages_after(&self, token: &str, after_id: u64) -> Result<Vec<Message>>;

    /// `POST /api/messages`.
    async fn send_message(&self, token: &str, params: &SendMessageParams) -> Result<()>;

    /// `GET /api/users/online`.
    async fn online_users(&self, token: &str) -> Result<PresenceSnapshot>;

    /// `GET /api/messages/count`.
    async fn message_count(&self, token: &str) -> Result<u64>;

    /// `GET /api/users/count`.
    async fn user_count(&self, token: &str) -> Result<u64>;
}
