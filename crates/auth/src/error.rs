use std::{sync::Arc, time::Duration};

use {teletrim_sessions::SessionError, teletrim_telegram::ClientError};

/// Why a login step did not succeed.
///
/// Cheap to clone so the same error can be both returned to the caller and
/// kept in [`LoginState::Failed`](crate::LoginState::Failed).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoginError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("session is still in use by another process after {attempts} attempts")]
    SessionLocked { attempts: u32 },

    #[error("the login code is invalid or expired")]
    InvalidCode,

    #[error("the two-factor password is incorrect")]
    InvalidPassword,

    #[error("this phone number has no Telegram account; sign up with an official app first")]
    SignUpRequired,

    #[error("Telegram did not answer within {0:?}")]
    Timeout(Duration),

    #[error("login cancelled")]
    Cancelled,

    #[error(transparent)]
    Client(Arc<ClientError>),

    #[error(transparent)]
    Storage(Arc<SessionError>),
}

impl LoginError {
    /// Recoverable errors leave the flow in its current state so the user can
    /// correct the input and try again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidCode | Self::InvalidPassword
        )
    }
}

impl From<ClientError> for LoginError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::SessionLocked => Self::SessionLocked { attempts: 1 },
            ClientError::InvalidPhone => Self::InvalidInput(ClientError::InvalidPhone.to_string()),
            ClientError::InvalidCode => Self::InvalidCode,
            ClientError::InvalidPassword => Self::InvalidPassword,
            ClientError::SignUpRequired => Self::SignUpRequired,
            ClientError::Timeout(after) => Self::Timeout(after),
            ClientError::Cancelled => Self::Cancelled,
            other => Self::Client(Arc::new(other)),
        }
    }
}

impl From<SessionError> for LoginError {
    fn from(err: SessionError) -> Self {
        Self::Storage(Arc::new(err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(LoginError::InvalidInput("x".into()), true)]
    #[case(LoginError::InvalidCode, true)]
    #[case(LoginError::InvalidPassword, true)]
    #[case(LoginError::SessionLocked { attempts: 3 }, false)]
    #[case(LoginError::SignUpRequired, false)]
    #[case(LoginError::Cancelled, false)]
    #[case(LoginError::Timeout(Duration::from_secs(1)), false)]
    fn recoverability(#[case] err: LoginError, #[case] recoverable: bool) {
        assert_eq!(err.is_recoverable(), recoverable);
    }

    #[test]
    fn client_errors_map_to_login_errors() {
        assert!(matches!(
            LoginError::from(ClientError::InvalidCode),
            LoginError::InvalidCode
        ));
        assert!(matches!(
            LoginError::from(ClientError::Cancelled),
            LoginError::Cancelled
        ));
        let err = LoginError::from(ClientError::InvalidPhone);
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "the phone number is invalid");
        assert!(!LoginError::from(ClientError::PhoneBanned).is_recoverable());
        let err = LoginError::from(ClientError::FloodWait { seconds: 5 });
        assert!(matches!(err, LoginError::Client(_)));
        assert_eq!(err.to_string(), "rate limited by the server for 5s");
    }
}
