// Public modules
pub mod auth;
pub mod message;
pub mod presence;
pub mod user;

// Re-exports
pub use auth::{
    CheckTokenParams, CheckTokenResponse, LoginParams, LoginResponse, RegisterParams,
    RegisterResponse,
};
pub use message::{Message, MessageList, SendMessageParams};
pub use presence::{CountResponse, PresenceSnapshot, ServerStats};
pub use user::User;
