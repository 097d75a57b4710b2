//! Scripted in-memory client for tests.
//!
//! `FakeClient` is cheap to clone; clones share state, so a test can hand one
//! clone to the code under test and inspect the other afterwards.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
};

use crate::{
    client::{ConnectTarget, Connector, MessengerClient},
    error::ClientError,
    types::{Account, Conversation, MessagePreview, PeerKind, PeerRef, UserProfile},
};

/// Client operations, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    IsAuthorized,
    RequestLoginCode,
    SignIn,
    CheckPassword,
    Me,
    Dialogs,
    RecentMessages,
    DeleteHistory,
    Leave,
    Disconnect,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Self::IsAuthorized => "is_authorized",
            Self::RequestLoginCode => "request_login_code",
            Self::SignIn => "sign_in",
            Self::CheckPassword => "check_password",
            Self::Me => "me",
            Self::Dialogs => "dialogs",
            Self::RecentMessages => "recent_messages",
            Self::DeleteHistory => "delete_history",
            Self::Leave => "leave",
            Self::Disconnect => "disconnect",
        }
    }
}

struct State {
    account: Account,
    authorized: bool,
    code: String,
    password: Option<String>,
    hint: Option<String>,
    code_requested: bool,
    awaiting_password: bool,
    dialogs: Vec<Conversation>,
    messages: HashMap<i64, Vec<MessagePreview>>,
    failures: HashMap<Op, VecDeque<ClientError>>,
    calls: Vec<String>,
    delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct FakeClient {
    state: Arc<Mutex<State>>,
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight(Arc<Mutex<State>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.0).in_flight -= 1;
    }
}

impl FakeClient {
    /// A client for account `account_id` that is not logged in yet.
    /// The valid login code is `12345`.
    pub fn new(account_id: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                account: Account {
                    id: account_id,
                    display_name: format!("User {account_id}"),
                    username: None,
                },
                authorized: false,
                code: "12345".into(),
                password: None,
                hint: None,
                code_requested: false,
                awaiting_password: false,
                dialogs: Vec::new(),
                messages: HashMap::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                delay: None,
                in_flight: 0,
                max_in_flight: 0,
            })),
        }
    }

    pub fn authorized(account_id: i64) -> Self {
        let client = Self::new(account_id);
        lock(&client.state).authorized = true;
        client
    }

    /// Require a two-factor password after the code.
    pub fn with_password(self, password: &str, hint: Option<&str>) -> Self {
        {
            let mut state = lock(&self.state);
            state.password = Some(password.into());
            state.hint = hint.map(Into::into);
        }
        self
    }

    pub fn with_dialogs(self, dialogs: Vec<Conversation>) -> Self {
        lock(&self.state).dialogs = dialogs;
        self
    }

    /// Messages for `peer_id`, newest first.
    pub fn with_messages(self, peer_id: i64, messages: Vec<MessagePreview>) -> Self {
        lock(&self.state).messages.insert(peer_id, messages);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        lock(&self.state).delay = delay;
    }

    /// Make the next call of `op` fail with `error`. Queued per operation.
    pub fn fail_next(&self, op: Op, error: ClientError) {
        lock(&self.state)
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Every call made so far, as `op` or `op:peer_id`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        let name = op.as_str();
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(name))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        lock(&self.state).max_in_flight
    }

    pub fn is_logged_in(&self) -> bool {
        lock(&self.state).authorized
    }

    pub fn dialog_ids(&self) -> Vec<i64> {
        lock(&self.state).dialogs.iter().map(|d| d.peer.id).collect()
    }

    async fn begin(&self, op: Op, peer: Option<&PeerRef>) -> Result<InFlight, ClientError> {
        let delay = {
            let mut state = lock(&self.state);
            state.calls.push(match peer {
                Some(peer) => format!("{}:{}", op.as_str(), peer.id),
                None => op.as_str().to_string(),
            });
            if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
                return Err(error);
            }
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.delay
        };
        let guard = InFlight(Arc::clone(&self.state));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(guard)
    }
}

#[async_trait]
impl MessengerClient for FakeClient {
    async fn is_authorized(&self) -> Result<bool, ClientError> {
        let _call = self.begin(Op::IsAuthorized, None).await?;
        Ok(lock(&self.state).authorized)
    }

    async fn request_login_code(&self, _phone: &str) -> Result<(), ClientError> {
        let _call = self.begin(Op::RequestLoginCode, None).await?;
        lock(&self.state).code_requested = true;
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<Account, ClientError> {
        let _call = self.begin(Op::SignIn, None).await?;
        let mut state = lock(&self.state);
        if !state.code_requested {
            return Err(ClientError::NoPendingLogin);
        }
        if code != state.code {
            return Err(ClientError::InvalidCode);
        }
        if state.password.is_some() {
            state.awaiting_password = true;
            return Err(ClientError::PasswordRequired {
                hint: state.hint.clone(),
            });
        }
        state.authorized = true;
        Ok(state.account.clone())
    }

    async fn check_password(&self, password: &Secret<String>) -> Result<Account, ClientError> {
        let _call = self.begin(Op::CheckPassword, None).await?;
        let mut state = lock(&self.state);
        if !state.awaiting_password {
            return Err(ClientError::NoPendingLogin);
        }
        if state.password.as_deref() != Some(password.expose_secret().as_str()) {
            return Err(ClientError::InvalidPassword);
        }
        state.awaiting_password = false;
        state.authorized = true;
        Ok(state.account.clone())
    }

    async fn me(&self) -> Result<Account, ClientError> {
        let _call = self.begin(Op::Me, None).await?;
        let state = lock(&self.state);
        if !state.authorized {
            return Err(ClientError::Unauthorized);
        }
        Ok(state.account.clone())
    }

    async fn dialogs(&self) -> Result<Vec<Conversation>, ClientError> {
        let _call = self.begin(Op::Dialogs, None).await?;
        Ok(lock(&self.state).dialogs.clone())
    }

    async fn recent_messages(
        &self,
        peer: &PeerRef,
        limit: usize,
    ) -> Result<Vec<MessagePreview>, ClientError> {
        let _call = self.begin(Op::RecentMessages, Some(peer)).await?;
        Ok(lock(&self.state)
            .messages
            .get(&peer.id)
            .map(|msgs| msgs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_history(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let _call = self.begin(Op::DeleteHistory, Some(peer)).await?;
        if peer.kind == PeerKind::Channel {
            return Err(ClientError::Unsupported(
                "history of broadcast channels cannot be deleted",
            ));
        }
        lock(&self.state).messages.remove(&peer.id);
        Ok(())
    }

    async fn leave(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let _call = self.begin(Op::Leave, Some(peer)).await?;
        lock(&self.state).dialogs.retain(|d| d.peer.id != peer.id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let _call = self.begin(Op::Disconnect, None).await?;
        Ok(())
    }
}

/// Hands out clones of one [`FakeClient`], optionally failing first.
#[derive(Clone)]
pub struct FakeConnector {
    client: FakeClient,
    failures: Arc<Mutex<VecDeque<ClientError>>>,
    attempts: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(client: FakeClient) -> Self {
        Self {
            client,
            failures: Arc::new(Mutex::new(VecDeque::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next connect attempt fail with `error`.
    pub fn fail_connect(&self, error: ClientError) {
        lock(&self.failures).push_back(error);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> &FakeClient {
        &self.client
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _target: &ConnectTarget,
    ) -> Result<Box<dyn MessengerClient>, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        Ok(Box::new(self.client.clone()))
    }
}

/// Build a conversation for tests.
pub fn conversation(id: i64, kind: PeerKind, name: &str) -> Conversation {
    Conversation {
        peer: PeerRef::new(id, kind, id.to_le_bytes().to_vec()),
        name: name.into(),
        profile: kind.is_user().then(|| UserProfile {
            first_name: (!name.is_empty()).then(|| name.to_string()),
            last_name: None,
            deleted: false,
        }),
    }
}

/// Build a text message preview for tests.
pub fn text_message(id: i32, text: &str) -> MessagePreview {
    MessagePreview {
        id,
        text: text.into(),
        media: None,
    }
}
