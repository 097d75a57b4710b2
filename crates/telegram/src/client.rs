use {async_trait::async_trait, secrecy::Secret, teletrim_sessions::SessionPaths};

use crate::{
    error::ClientError,
    types::{Account, Conversation, MessagePreview, PeerRef},
};

/// Operations the application needs from a Telegram user client.
///
/// Login is split into steps so a caller can prompt between them:
/// `request_login_code` → `sign_in` → (`check_password` when
/// [`ClientError::PasswordRequired`] is returned). Implementations keep the
/// pending login state internally.
#[async_trait]
pub trait MessengerClient: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, ClientError>;

    /// Ask the server to send a login code to `phone`.
    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError>;

    async fn sign_in(&self, code: &str) -> Result<Account, ClientError>;

    async fn check_password(&self, password: &Secret<String>) -> Result<Account, ClientError>;

    /// The logged-in account.
    async fn me(&self) -> Result<Account, ClientError>;

    /// All dialogs, in the server's order (most recent activity first).
    async fn dialogs(&self) -> Result<Vec<Conversation>, ClientError>;

    /// Up to `limit` most recent messages, newest first.
    async fn recent_messages(
        &self,
        peer: &PeerRef,
        limit: usize,
    ) -> Result<Vec<MessagePreview>, ClientError>;

    /// Delete the whole history with `peer`, for both sides where possible.
    async fn delete_history(&self, peer: &PeerRef) -> Result<(), ClientError>;

    /// Leave the conversation (or drop a private dialog from the list).
    async fn leave(&self, peer: &PeerRef) -> Result<(), ClientError>;

    /// Persist session state and release the connection.
    async fn disconnect(&self) -> Result<(), ClientError>;
}

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub session: String,
    pub paths: SessionPaths,
    pub api_id: i32,
    pub api_hash: Secret<String>,
}

/// Opens a client for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget)
    -> Result<Box<dyn MessengerClient>, ClientError>;
}
