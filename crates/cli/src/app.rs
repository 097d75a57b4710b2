use {
    anyhow::Result,
    teletrim_auth::{ConnectPolicy, LoginFlow},
    teletrim_chat::Purger,
    teletrim_config::{Preferences, TeletrimConfig},
    teletrim_sessions::{CredentialStore, SessionDir},
    teletrim_telegram::{GrammersConnector, WorkerOptions},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Loaded configuration plus the storage it points at.
pub struct App {
    pub config: TeletrimConfig,
    pub sessions: SessionDir,
    pub store: CredentialStore,
}

impl App {
    pub fn new(config: TeletrimConfig) -> Self {
        let sessions = SessionDir::new(teletrim_config::sessions_dir(&config));
        debug!(path = %sessions.root().display(), "sessions directory");
        Self {
            store: CredentialStore::new(sessions.clone()),
            sessions,
            config,
        }
    }

    pub fn login_flow(&self) -> LoginFlow<GrammersConnector> {
        let client = &self.config.client;
        let policy = ConnectPolicy {
            attempts: client.connect_attempts,
            delay: client.connect_retry_delay(),
            timeout: client.call_timeout(),
        };
        LoginFlow::new(GrammersConnector, self.store.clone(), policy).with_worker_options(
            WorkerOptions {
                call_timeout: client.call_timeout(),
                queue_depth: client.queue_depth,
            },
        )
    }

    pub fn purger(&self, cancel: CancellationToken) -> Purger {
        Purger::new(self.config.client.flood_wait_max()).with_cancellation(cancel)
    }

    pub fn preview_limit(&self) -> usize {
        self.config.client.preview_limit
    }

    /// Change preferences both in memory and in the config file.
    pub fn update_preferences(
        &mut self,
        f: impl Fn(&mut Preferences),
    ) -> Result<()> {
        f(&mut self.config.preferences);
        let path = teletrim_config::update_config(|c| f(&mut c.preferences))?;
        debug!(path = %path.display(), "preferences saved");
        Ok(())
    }
}
