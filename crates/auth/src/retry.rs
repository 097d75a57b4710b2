//! Bounded retry around opening a session that another process may hold.

use std::time::Duration;

use {
    teletrim_telegram::{ClientError, ConnectTarget, Connector, MessengerClient},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::error::LoginError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Total connect attempts while the session is locked.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
    /// Upper bound for a single connect attempt.
    pub timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Connect, retrying only while the session is locked.
///
/// Any other failure is returned immediately. `cancel` aborts both a pending
/// attempt and the pause between attempts.
pub async fn connect_with_retry<C: Connector + ?Sized>(
    connector: &C,
    target: &ConnectTarget,
    policy: ConnectPolicy,
    cancel: &CancellationToken,
) -> Result<Box<dyn MessengerClient>, LoginError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoginError::Cancelled),
            result = tokio::time::timeout(policy.timeout, connector.connect(target)) => {
                result.unwrap_or(Err(ClientError::Timeout(policy.timeout)))
            },
        };

        match result {
            Ok(client) => {
                debug!(session = %target.session, attempt, "connected");
                return Ok(client);
            },
            Err(ClientError::SessionLocked) if attempt < attempts => {
                warn!(
                    session = %target.session,
                    attempt,
                    attempts,
                    delay = ?policy.delay,
                    "session is locked, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LoginError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {},
                }
                attempt += 1;
            },
            Err(ClientError::SessionLocked) => return Err(LoginError::SessionLocked { attempts }),
            Err(e) => return Err(e.into()),
        }
    }
}
