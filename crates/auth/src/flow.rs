use {
    secrecy::{ExposeSecret, Secret},
    teletrim_sessions::{CredentialStore, SessionCredentials, SessionName},
    teletrim_telegram::{
        Account, ClientError, ClientHandle, ClientWorker, ConnectTarget, Connector,
        MessengerClient, WorkerOptions,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::LoginError,
    retry::{ConnectPolicy, connect_with_retry},
    state::{LoginState, Prefill},
};

/// Raw input from the credentials form.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub session: String,
    pub api_id: String,
    pub api_hash: Secret<String>,
    pub phone: String,
    /// Tried automatically when the account asks for a two-factor password.
    pub twofa: Option<Secret<String>>,
}

impl LoginRequest {
    /// Check the form and turn it into what gets saved for the session.
    pub fn validate(&self) -> Result<(SessionName, SessionCredentials), LoginError> {
        let session = SessionName::parse(&self.session)
            .map_err(|e| LoginError::InvalidInput(e.to_string()))?;

        let api_id = self
            .api_id
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| LoginError::InvalidInput("API ID must be a positive number".into()))?;

        let api_hash = self.api_hash.expose_secret().trim();
        if api_hash.is_empty() {
            return Err(LoginError::InvalidInput("API hash is required".into()));
        }

        let phone = self.phone.trim();
        if phone.is_empty() {
            return Err(LoginError::InvalidInput("phone number is required".into()));
        }

        let twofa = self
            .twofa
            .as_ref()
            .filter(|secret| !secret.expose_secret().is_empty())
            .cloned();

        Ok((session, SessionCredentials {
            api_id,
            api_hash: Secret::new(api_hash.to_string()),
            phone: phone.to_string(),
            twofa,
        }))
    }
}

/// A logged-in session, ready for use.
pub struct AuthorizedSession {
    pub name: SessionName,
    pub account: Account,
    /// Handle to the client worker. Close it to persist the session.
    pub client: ClientHandle,
}

struct Connection {
    session: SessionName,
    credentials: SessionCredentials,
    client: ClientHandle,
}

/// Login state machine for one session.
///
/// ```text
/// NeedCredentials ──submit_credentials──▶ AwaitingCode ──submit_code──▶ Authorized
///        ▲  │                                  │                          ▲
///        │  └──(already logged in)─────────────┼──────────────────────────┤
///      reset                          (2FA required)                      │
///        │                                     ▼                          │
///     Failed ◀──cancel / fatal error── AwaitingTwoFactor ──submit_password┘
/// ```
pub struct LoginFlow<C> {
    connector: C,
    store: CredentialStore,
    policy: ConnectPolicy,
    worker: WorkerOptions,
    state: LoginState,
    prefill: Prefill,
    connection: Option<Connection>,
    cancel: CancellationToken,
}

impl<C: Connector> LoginFlow<C> {
    pub fn new(connector: C, store: CredentialStore, policy: ConnectPolicy) -> Self {
        Self {
            connector,
            store,
            policy,
            worker: WorkerOptions::default(),
            state: LoginState::NeedCredentials {
                prefill: Prefill::default(),
            },
            prefill: Prefill::default(),
            connection: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_worker_options(mut self, worker: WorkerOptions) -> Self {
        self.worker = worker;
        self
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    /// Cancelling this token aborts the step in progress and fails the flow.
    /// A fresh token is issued once the flow is restarted, so fetch it again
    /// before each step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Try to log in with the saved credentials of `session`.
    ///
    /// Ends in `Authorized` when the saved session is still logged in, and in
    /// `NeedCredentials` otherwise, prefilled with whatever was saved. Only
    /// cancellation fails the flow.
    pub async fn resume(&mut self, session: &SessionName) -> Result<&LoginState, LoginError> {
        self.expect_start("resume a session")?;
        self.begin_attempt();

        let Some(credentials) = self.store.load(session) else {
            debug!(session = %session, "no saved credentials");
            return Ok(self.need_credentials(Prefill::named(session)));
        };
        let prefill = Prefill {
            session: Some(session.clone()),
            credentials: Some(credentials.clone()),
        };

        let client = match self.open(session, &credentials).await {
            Ok(client) => client,
            Err(LoginError::Cancelled) => return Err(self.fail(LoginError::Cancelled)),
            Err(e) => {
                warn!(session = %session, error = %e, "auto-login failed");
                return Ok(self.need_credentials(prefill));
            },
        };

        let cancel = self.cancel.clone();
        let checked = current_account(&cancel, &client).await;
        match checked {
            Ok(Some(account)) => {
                self.connection = Some(Connection {
                    session: session.clone(),
                    credentials,
                    client,
                });
                Ok(self.authorized(account))
            },
            Ok(None) => {
                info!(session = %session, "saved session is no longer logged in");
                client.shutdown();
                Ok(self.need_credentials(prefill))
            },
            Err(ClientError::Cancelled) => {
                client.shutdown();
                Err(self.fail(LoginError::Cancelled))
            },
            Err(e) => {
                warn!(session = %session, error = %e, "auto-login failed");
                client.shutdown();
                Ok(self.need_credentials(prefill))
            },
        }
    }

    /// Connect with the submitted credentials and start logging in.
    pub async fn submit_credentials(
        &mut self,
        request: LoginRequest,
    ) -> Result<&LoginState, LoginError> {
        self.expect_start("submit credentials")?;
        let (session, credentials) = request.validate()?;
        self.begin_attempt();
        self.prefill = Prefill {
            session: Some(session.clone()),
            credentials: Some(credentials.clone()),
        };

        if let Err(e) = self.store.dir().ensure() {
            return Err(self.fail(e.into()));
        }
        let client = match self.open(&session, &credentials).await {
            Ok(client) => client,
            Err(e) => return Err(self.fail(e)),
        };

        let cancel = self.cancel.clone();
        let account = match current_account(&cancel, &client).await {
            Ok(account) => account,
            Err(e) => {
                client.shutdown();
                return Err(self.fail(e.into()));
            },
        };
        if let Some(account) = account {
            self.connection = Some(Connection {
                session,
                credentials,
                client,
            });
            return Ok(self.authorized(account));
        }

        let phone = credentials.phone.clone();
        if let Err(e) = guarded(&cancel, client.request_login_code(&phone)).await {
            client.shutdown();
            let error = LoginError::from(e);
            if error.is_recoverable() {
                // Keep what was typed so only the phone needs fixing.
                self.need_credentials(self.prefill.clone());
            }
            return Err(self.fail(error));
        }
        info!(session = %session, "login code requested");

        self.connection = Some(Connection {
            session,
            credentials,
            client,
        });
        self.state = LoginState::AwaitingCode { phone };
        Ok(&self.state)
    }

    /// Submit the login code the user received.
    ///
    /// When the account has a two-factor password and one was given with the
    /// credentials, it is tried before asking the user.
    pub async fn submit_code(&mut self, code: &str) -> Result<&LoginState, LoginError> {
        if !matches!(self.state, LoginState::AwaitingCode { .. }) {
            return Err(self.invalid("submit a login code"));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(LoginError::InvalidInput("login code is empty".into()));
        }
        let (client, saved_password) = match &self.connection {
            Some(conn) => (conn.client.clone(), conn.credentials.twofa.clone()),
            None => return Err(self.invalid("submit a login code")),
        };

        let cancel = self.cancel.clone();
        let hint = match guarded(&cancel, client.sign_in(code)).await {
            Ok(account) => return Ok(self.authorized(account)),
            Err(ClientError::PasswordRequired { hint }) => hint,
            Err(e) => return Err(self.fail(e.into())),
        };

        if let Some(password) = saved_password {
            match guarded(&cancel, client.check_password(&password)).await {
                Ok(account) => return Ok(self.authorized(account)),
                Err(ClientError::InvalidPassword) => {
                    warn!("saved two-factor password was rejected");
                    if let Some(conn) = self.connection.as_mut() {
                        conn.credentials.twofa = None;
                    }
                },
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        self.state = LoginState::AwaitingTwoFactor { hint };
        Ok(&self.state)
    }

    pub async fn submit_password(
        &mut self,
        password: &Secret<String>,
    ) -> Result<&LoginState, LoginError> {
        if !matches!(self.state, LoginState::AwaitingTwoFactor { .. }) {
            return Err(self.invalid("submit a two-factor password"));
        }
        if password.expose_secret().is_empty() {
            return Err(LoginError::InvalidInput("two-factor password is empty".into()));
        }
        let client = match &self.connection {
            Some(conn) => conn.client.clone(),
            None => return Err(self.invalid("submit a two-factor password")),
        };

        let cancel = self.cancel.clone();
        match guarded(&cancel, client.check_password(password)).await {
            Ok(account) => Ok(self.authorized(account)),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Abandon the login attempt and drop the connection.
    pub fn cancel(&mut self) -> Result<&LoginState, LoginError> {
        if self.state.is_terminal() {
            return Err(self.invalid("cancel"));
        }
        self.cancel.cancel();
        self.fail(LoginError::Cancelled);
        Ok(&self.state)
    }

    /// Start over after a failure, keeping what was entered.
    pub fn reset(&mut self) -> Result<&LoginState, LoginError> {
        if !matches!(self.state, LoginState::Failed { .. }) {
            return Err(self.invalid("reset"));
        }
        self.begin_attempt();
        let prefill = self.prefill.clone();
        Ok(self.need_credentials(prefill))
    }

    /// Hand over the logged-in client.
    pub fn into_session(self) -> Result<AuthorizedSession, LoginError> {
        match (self.state, self.connection) {
            (LoginState::Authorized { account }, Some(conn)) => Ok(AuthorizedSession {
                name: conn.session,
                account,
                client: conn.client,
            }),
            (state, _) => Err(LoginError::InvalidTransition {
                action: "take the session",
                state: state.name(),
            }),
        }
    }

    fn expect_start(&self, action: &'static str) -> Result<(), LoginError> {
        match self.state {
            LoginState::NeedCredentials { .. } | LoginState::Failed { .. } => Ok(()),
            _ => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> LoginError {
        LoginError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    /// Drop any previous connection and replace a spent cancellation token.
    fn begin_attempt(&mut self) {
        self.disconnect();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            debug!(session = %conn.session, "dropping login connection");
            conn.client.shutdown();
        }
    }

    async fn open(
        &self,
        session: &SessionName,
        credentials: &SessionCredentials,
    ) -> Result<ClientHandle, LoginError> {
        let target = ConnectTarget {
            session: session.to_string(),
            paths: self.store.dir().paths(session),
            api_id: credentials.api_id,
            api_hash: credentials.api_hash.clone(),
        };
        let client = connect_with_retry(&self.connector, &target, self.policy, &self.cancel).await?;
        let (handle, _task) = ClientWorker::spawn(client, self.worker);
        Ok(handle)
    }

    fn need_credentials(&mut self, prefill: Prefill) -> &LoginState {
        self.prefill = prefill.clone();
        self.state = LoginState::NeedCredentials { prefill };
        &self.state
    }

    fn authorized(&mut self, account: Account) -> &LoginState {
        if let Some(conn) = &self.connection {
            if let Err(e) = self.store.save(&conn.session, &conn.credentials) {
                warn!(session = %conn.session, error = %e, "could not save credentials");
            }
            info!(session = %conn.session, account = %account, "logged in");
        }
        self.state = LoginState::Authorized { account };
        &self.state
    }

    /// Record `error`. Recoverable errors leave the state alone; anything else
    /// drops the connection and fails the flow.
    fn fail(&mut self, error: LoginError) -> LoginError {
        if error.is_recoverable() {
            debug!(state = self.state.name(), error = %error, "login step rejected");
            return error;
        }
        warn!(state = self.state.name(), error = %error, "login failed");
        self.disconnect();
        self.state = LoginState::Failed {
            error: error.clone(),
        };
        error
    }
}

/// The account if the client is already logged in.
async fn current_account(
    cancel: &CancellationToken,
    client: &ClientHandle,
) -> Result<Option<Account>, ClientError> {
    if !guarded(cancel, client.is_authorized()).await? {
        return Ok(None);
    }
    guarded(cancel, client.me()).await.map(Some)
}

async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = call => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        std::time::Duration,
        teletrim_sessions::SessionDir,
        teletrim_telegram::fake::{FakeClient, FakeConnector, Op},
        tempfile::TempDir,
    };

    const PHONE: &str = "+15550100";

    fn setup(client: FakeClient) -> (TempDir, CredentialStore, FakeConnector) {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(SessionDir::new(tmp.path().join("sessions")));
        (tmp, store, FakeConnector::new(client))
    }

    fn flow(store: &CredentialStore, connector: &FakeConnector) -> LoginFlow<FakeConnector> {
        LoginFlow::new(connector.clone(), store.clone(), ConnectPolicy {
            attempts: 3,
            delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        })
    }

    fn request(twofa: Option<&str>) -> LoginRequest {
        LoginRequest {
            session: "main".into(),
            api_id: "12345".into(),
            api_hash: Secret::new("0123456789abcdef".into()),
            phone: PHONE.into(),
            twofa: twofa.map(|p| Secret::new(p.to_string())),
        }
    }

    fn main_session() -> SessionName {
        SessionName::parse("main").unwrap()
    }

    fn saved_twofa(store: &CredentialStore) -> Option<String> {
        store
            .load(&main_session())
            .unwrap()
            .twofa
            .map(|s| s.expose_secret().clone())
    }

    #[tokio::test]
    async fn resume_without_saved_credentials_asks_for_them() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        let mut flow = flow(&store, &connector);

        let state = flow.resume(&main_session()).await.unwrap();
        match state {
            LoginState::NeedCredentials { prefill } => {
                assert_eq!(prefill.session, Some(main_session()));
                assert!(prefill.credentials.is_none());
            },
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn resume_logged_in_session() {
        let (_tmp, store, connector) = setup(FakeClient::authorized(42));
        let (_, creds) = request(None).validate().unwrap();
        store.save(&main_session(), &creds).unwrap();

        let mut flow = flow(&store, &connector);
        let state = flow.resume(&main_session()).await.unwrap();
        assert!(matches!(state, LoginState::Authorized { account } if account.id == 42));

        let session = flow.into_session().unwrap();
        assert_eq!(session.name, main_session());
        assert_eq!(session.account.id, 42);
        assert_eq!(session.client.me().await.unwrap().id, 42);
    }

    #[tokio::test]
    async fn resume_logged_out_session_prefills_saved_credentials() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        let (_, creds) = request(None).validate().unwrap();
        store.save(&main_session(), &creds).unwrap();

        let mut flow = flow(&store, &connector);
        let state = flow.resume(&main_session()).await.unwrap();
        match state {
            LoginState::NeedCredentials { prefill } => {
                let saved = prefill.credentials.as_ref().unwrap();
                assert_eq!(saved.phone, PHONE);
                assert_eq!(saved.api_id, 12345);
            },
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(connector.client().count(Op::RequestLoginCode), 0);
    }

    #[tokio::test]
    async fn resume_connect_failure_is_not_fatal() {
        let (_tmp, store, connector) = setup(FakeClient::authorized(1));
        let (_, creds) = request(None).validate().unwrap();
        store.save(&main_session(), &creds).unwrap();
        connector.fail_connect(ClientError::Connect("offline".into()));

        let mut flow = flow(&store, &connector);
        let state = flow.resume(&main_session()).await.unwrap();
        assert!(matches!(state, LoginState::NeedCredentials { prefill } if prefill.credentials.is_some()));
    }

    #[tokio::test]
    async fn code_login_saves_credentials() {
        let (_tmp, store, connector) = setup(FakeClient::new(7));
        let mut flow = flow(&store, &connector);

        let state = flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(state, LoginState::AwaitingCode { phone } if phone == PHONE));

        let state = flow.submit_code(" 12345 ").await.unwrap();
        assert!(matches!(state, LoginState::Authorized { account } if account.id == 7));

        let saved = store.load(&main_session()).unwrap();
        assert_eq!(saved.api_id, 12345);
        assert_eq!(saved.phone, PHONE);
        assert!(saved.twofa.is_none());
    }

    #[tokio::test]
    async fn already_logged_in_skips_the_code() {
        let (_tmp, store, connector) = setup(FakeClient::authorized(7));
        let mut flow = flow(&store, &connector);

        let state = flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(state, LoginState::Authorized { .. }));
        assert_eq!(connector.client().count(Op::RequestLoginCode), 0);
        assert!(store.load(&main_session()).is_some());
    }

    #[tokio::test]
    async fn rejected_phone_keeps_asking_for_credentials() {
        let (_tmp, store, connector) = setup(FakeClient::new(7));
        connector
            .client()
            .fail_next(Op::RequestLoginCode, ClientError::InvalidPhone);
        let mut flow = flow(&store, &connector);

        let err = flow.submit_credentials(request(None)).await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidInput(_)));
        match flow.state() {
            LoginState::NeedCredentials { prefill } => {
                let typed = prefill.credentials.as_ref().unwrap();
                assert_eq!(typed.phone, PHONE);
            },
            other => panic!("unexpected state {other:?}"),
        }

        let state = flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(state, LoginState::AwaitingCode { .. }));
        assert_eq!(connector.client().count(Op::RequestLoginCode), 2);
    }

    #[tokio::test]
    async fn wrong_code_can_be_retried() {
        let (_tmp, store, connector) = setup(FakeClient::new(7));
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(None)).await.unwrap();

        let err = flow.submit_code("00000").await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidCode));
        assert!(matches!(flow.state(), LoginState::AwaitingCode { .. }));

        let err = flow.submit_code("   ").await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidInput(_)));

        flow.submit_code("12345").await.unwrap();
        assert!(matches!(flow.state(), LoginState::Authorized { .. }));
    }

    #[tokio::test]
    async fn two_factor_prompt_and_wrong_password() {
        let client = FakeClient::new(7).with_password("s3cret", Some("pet name"));
        let (_tmp, store, connector) = setup(client);
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(None)).await.unwrap();

        let state = flow.submit_code("12345").await.unwrap();
        assert!(matches!(
            state,
            LoginState::AwaitingTwoFactor { hint } if hint.as_deref() == Some("pet name")
        ));

        let err = flow
            .submit_password(&Secret::new("wrong".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::InvalidPassword));
        assert!(matches!(flow.state(), LoginState::AwaitingTwoFactor { .. }));

        flow.submit_password(&Secret::new("s3cret".into()))
            .await
            .unwrap();
        assert!(matches!(flow.state(), LoginState::Authorized { .. }));
        // A password typed at the prompt is not persisted.
        assert_eq!(saved_twofa(&store), None);
    }

    #[tokio::test]
    async fn saved_two_factor_password_is_tried_first() {
        let client = FakeClient::new(7).with_password("s3cret", None);
        let (_tmp, store, connector) = setup(client);
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(Some("s3cret"))).await.unwrap();

        let state = flow.submit_code("12345").await.unwrap();
        assert!(matches!(state, LoginState::Authorized { .. }));
        assert_eq!(connector.client().count(Op::CheckPassword), 1);
        assert_eq!(saved_twofa(&store).as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn rejected_saved_password_falls_back_to_prompt() {
        let client = FakeClient::new(7).with_password("s3cret", None);
        let (_tmp, store, connector) = setup(client);
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(Some("stale"))).await.unwrap();

        let state = flow.submit_code("12345").await.unwrap();
        assert!(matches!(state, LoginState::AwaitingTwoFactor { hint: None }));

        flow.submit_password(&Secret::new("s3cret".into()))
            .await
            .unwrap();
        assert_eq!(saved_twofa(&store), None);
    }

    #[rstest]
    #[case("", "12345", "hash", PHONE)]
    #[case("../etc", "12345", "hash", PHONE)]
    #[case("main", "abc", "hash", PHONE)]
    #[case("main", "-5", "hash", PHONE)]
    #[case("main", "12345", "  ", PHONE)]
    #[case("main", "12345", "hash", " ")]
    #[tokio::test]
    async fn invalid_credentials_keep_the_form_open(
        #[case] session: &str,
        #[case] api_id: &str,
        #[case] api_hash: &str,
        #[case] phone: &str,
    ) {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        let mut flow = flow(&store, &connector);
        let request = LoginRequest {
            session: session.into(),
            api_id: api_id.into(),
            api_hash: Secret::new(api_hash.into()),
            phone: phone.into(),
            twofa: None,
        };

        let err = flow.submit_credentials(request).await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidInput(_)));
        assert!(err.is_recoverable());
        assert!(matches!(flow.state(), LoginState::NeedCredentials { .. }));
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn steps_out_of_order_are_rejected() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        let mut flow = flow(&store, &connector);

        assert!(matches!(
            flow.submit_code("12345").await,
            Err(LoginError::InvalidTransition { .. })
        ));
        assert!(matches!(
            flow.submit_password(&Secret::new("x".into())).await,
            Err(LoginError::InvalidTransition { .. })
        ));
        assert!(matches!(flow.reset(), Err(LoginError::InvalidTransition { .. })));
        assert!(matches!(flow.state(), LoginState::NeedCredentials { .. }));

        flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(
            flow.submit_credentials(request(None)).await,
            Err(LoginError::InvalidTransition { .. })
        ));
        assert!(matches!(flow.state(), LoginState::AwaitingCode { .. }));

        assert!(matches!(
            flow.into_session(),
            Err(LoginError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn fatal_error_fails_then_reset_restores_form() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        connector
            .client()
            .fail_next(Op::SignIn, ClientError::SignUpRequired);
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(None)).await.unwrap();

        let err = flow.submit_code("12345").await.unwrap_err();
        assert!(matches!(err, LoginError::SignUpRequired));
        assert!(matches!(
            flow.state(),
            LoginState::Failed {
                error: LoginError::SignUpRequired
            }
        ));
        assert!(store.load(&main_session()).is_none());

        match flow.reset().unwrap() {
            LoginState::NeedCredentials { prefill } => {
                assert_eq!(prefill.session, Some(main_session()));
                assert_eq!(prefill.credentials.as_ref().unwrap().phone, PHONE);
            },
            other => panic!("unexpected state {other:?}"),
        }

        // A second attempt goes through.
        flow.submit_credentials(request(None)).await.unwrap();
        flow.submit_code("12345").await.unwrap();
        assert!(matches!(flow.state(), LoginState::Authorized { .. }));
    }

    #[tokio::test]
    async fn cancel_and_reset() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        let mut flow = flow(&store, &connector);
        flow.submit_credentials(request(None)).await.unwrap();
        let token = flow.cancellation_token();

        let state = flow.cancel().unwrap();
        assert!(matches!(state, LoginState::Failed {
            error: LoginError::Cancelled
        }));
        assert!(token.is_cancelled());
        assert!(matches!(flow.cancel(), Err(LoginError::InvalidTransition { .. })));

        flow.reset().unwrap();
        assert!(!flow.cancellation_token().is_cancelled());
        flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(flow.state(), LoginState::AwaitingCode { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn token_cancels_a_call_in_flight() {
        let fake = FakeClient::new(1).with_delay(Duration::from_secs(600));
        let (_tmp, store, connector) = setup(fake.clone());
        let mut flow = flow(&store, &connector);

        let token = flow.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let err = flow.submit_credentials(request(None)).await.unwrap_err();
        assert!(matches!(err, LoginError::Cancelled));
        assert!(matches!(flow.state(), LoginState::Failed { .. }));

        fake.set_delay(None);
        flow.reset().unwrap();
        flow.submit_credentials(request(None)).await.unwrap();
        assert!(matches!(flow.state(), LoginState::AwaitingCode { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn locked_session_gives_up_after_retries() {
        let (_tmp, store, connector) = setup(FakeClient::new(1));
        for _ in 0..3 {
            connector.fail_connect(ClientError::SessionLocked);
        }
        let mut flow = flow(&store, &connector);

        let err = flow.submit_credentials(request(None)).await.unwrap_err();
        assert!(matches!(err, LoginError::SessionLocked { attempts: 3 }));
        assert!(matches!(flow.state(), LoginState::Failed { .. }));
        assert_eq!(connector.attempts(), 3);
    }
}
