use std::{io, time::Duration};

/// Errors surfaced by a [`MessengerClient`](crate::MessengerClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The session file is held by another process or handle.
    #[error("session is locked by another process")]
    SessionLocked,

    #[error("could not connect: {0}")]
    Connect(String),

    /// Network or protocol failure below the RPC layer.
    #[error("network error: {0}")]
    Transport(String),

    /// The account has two-factor authentication enabled.
    #[error("two-factor password required")]
    PasswordRequired { hint: Option<String> },

    #[error("the phone number is invalid")]
    InvalidPhone,

    #[error("this phone number is banned from Telegram")]
    PhoneBanned,

    #[error("the login code is invalid or expired")]
    InvalidCode,

    #[error("the two-factor password is incorrect")]
    InvalidPassword,

    #[error("this phone number is not registered; sign up with an official app first")]
    SignUpRequired,

    /// `sign_in`/`check_password` without a preceding code request or 2FA prompt.
    #[error("no login in progress")]
    NoPendingLogin,

    #[error("session is not authorized")]
    Unauthorized,

    #[error("rate limited by the server for {seconds}s")]
    FloodWait { seconds: u32 },

    #[error("server error {code}: {name}")]
    Rpc { code: i32, name: String },

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    /// The worker task owning the client has stopped.
    #[error("client worker is no longer running")]
    WorkerGone,

    #[error("session storage: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Suggested wait before retrying, for flood-wait errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::FloodWait { seconds } => Some(Duration::from_secs(u64::from(*seconds))),
            _ => None,
        }
    }
}
