//! Config schema types (preferences, client behaviour, storage locations).

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides `storage.sessions_dir`.
pub const SESSIONS_DIR_ENV: &str = "TELETRIM_SESSIONS_DIR";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeletrimConfig {
    pub preferences: Preferences,
    pub client: ClientConfig,
    pub storage: StorageConfig,
}

/// Confirmation prompts the user can switch off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Ask before deleting a saved session.
    pub warn_session_delete: bool,
    /// Ask before leaving chats and deleting their history.
    pub warn_chat_delete: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            warn_session_delete: true,
            warn_chat_delete: true,
        }
    }
}

/// Messaging client tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound for a single remote call.
    pub call_timeout_secs: u64,
    /// How many times to try opening a session that another process holds.
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
    /// Number of messages shown when previewing a chat.
    pub preview_limit: usize,
    /// Longest server-imposed flood wait that is slept through and retried.
    pub flood_wait_max_secs: u64,
    /// Pending requests buffered in front of the client worker.
    pub queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
            connect_attempts: 3,
            connect_retry_delay_ms: 500,
            preview_limit: 10,
            flood_wait_max_secs: 60,
            queue_depth: 16,
        }
    }
}

impl ClientConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn flood_wait_max(&self) -> Duration {
        Duration::from_secs(self.flood_wait_max_secs)
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<name>.session` and `<name>.json` files.
    /// Defaults to `./sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_dir: Option<PathBuf>,
}

/// Resolve the sessions directory.
///
/// Priority:
/// 1. `TELETRIM_SESSIONS_DIR`
/// 2. `storage.sessions_dir`
/// 3. `./sessions`
pub fn sessions_dir(config: &TeletrimConfig) -> PathBuf {
    resolve_sessions_dir(config, std::env::var_os(SESSIONS_DIR_ENV).map(PathBuf::from))
}

fn resolve_sessions_dir(config: &TeletrimConfig, env_override: Option<PathBuf>) -> PathBuf {
    env_override
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| config.storage.sessions_dir.clone())
        .unwrap_or_else(|| PathBuf::from("sessions"))
}
