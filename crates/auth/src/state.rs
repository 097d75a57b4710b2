use {
    teletrim_sessions::{SessionCredentials, SessionName},
    teletrim_telegram::Account,
};

use crate::error::LoginError;

/// Values to pre-populate the credentials form with.
#[derive(Debug, Clone, Default)]
pub struct Prefill {
    pub session: Option<SessionName>,
    /// Saved credentials of `session`, when a credentials file exists.
    pub credentials: Option<SessionCredentials>,
}

impl Prefill {
    pub fn named(session: &SessionName) -> Self {
        Self {
            session: Some(session.clone()),
            credentials: None,
        }
    }
}

/// Where a [`LoginFlow`](crate::LoginFlow) currently is.
#[derive(Debug, Clone)]
pub enum LoginState {
    /// Waiting for API credentials and a phone number.
    NeedCredentials { prefill: Prefill },
    /// A login code was sent to `phone`.
    AwaitingCode { phone: String },
    /// The account has a two-factor password.
    AwaitingTwoFactor { hint: Option<String> },
    Authorized { account: Account },
    Failed { error: LoginError },
}

impl LoginState {
    /// Short name for messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NeedCredentials { .. } => "waiting for credentials",
            Self::AwaitingCode { .. } => "waiting for the login code",
            Self::AwaitingTwoFactor { .. } => "waiting for the two-factor password",
            Self::Authorized { .. } => "authorized",
            Self::Failed { .. } => "failed",
        }
    }

    /// `Authorized` and `Failed` end a login attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized { .. } | Self::Failed { .. })
    }
}
