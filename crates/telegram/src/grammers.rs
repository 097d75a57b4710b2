//! [`MessengerClient`] backed by a grammers MTProto client.

use {
    async_trait::async_trait,
    grammers_client::{
        Client, Config, InitParams, InvocationError, SignInError,
        client::auth::AuthorizationError,
        types::{Chat, LoginToken, Media, Message, PasswordToken, User},
    },
    grammers_session::{PackedChat, PackedType, Session},
    grammers_tl_types as tl,
    secrecy::{ExposeSecret, Secret},
    teletrim_sessions::{LockError, SessionPaths, with_session_lock},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    client::{ConnectTarget, Connector, MessengerClient},
    error::ClientError,
    types::{Account, Conversation, MediaKind, MessagePreview, PeerKind, PeerRef, UserProfile},
};

/// Opens grammers clients, loading the session file under the session lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrammersConnector;

#[async_trait]
impl Connector for GrammersConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn MessengerClient>, ClientError> {
        let session_file = target.paths.session_file.clone();
        let session = with_session_lock(&target.paths.lock_file, || {
            Session::load_file_or_create(&session_file)
        })
        .map_err(from_lock_error)?;

        let client = Client::connect(Config {
            session,
            api_id: target.api_id,
            api_hash: target.api_hash.expose_secret().clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

        info!(session = %target.session, "connected to Telegram");
        Ok(Box::new(GrammersClient {
            client,
            session: target.session.clone(),
            paths: target.paths.clone(),
            login_token: Mutex::new(None),
            password_token: Mutex::new(None),
        }))
    }
}

/// A connected grammers client plus the pending login steps.
pub struct GrammersClient {
    client: Client,
    session: String,
    paths: SessionPaths,
    login_token: Mutex<Option<LoginToken>>,
    password_token: Mutex<Option<PasswordToken>>,
}

impl GrammersClient {
    fn save_session(&self) -> Result<(), ClientError> {
        let session_file = &self.paths.session_file;
        with_session_lock(&self.paths.lock_file, || {
            self.client.session().save_to_file(session_file)
        })
        .map_err(from_lock_error)?;
        debug!(session = %self.session, "session saved");
        Ok(())
    }

    async fn signed_in(&self, user: &User) -> Result<Account, ClientError> {
        *self.login_token.lock().await = None;
        *self.password_token.lock().await = None;
        self.save_session()?;
        let account = account_from_user(user);
        info!(session = %self.session, account = %account, "signed in");
        Ok(account)
    }
}

#[async_trait]
impl MessengerClient for GrammersClient {
    async fn is_authorized(&self) -> Result<bool, ClientError> {
        self.client.is_authorized().await.map_err(from_invocation)
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError> {
        let token = self
            .client
            .request_login_code(phone)
            .await
            .map_err(from_authorization)?;
        *self.login_token.lock().await = Some(token);
        debug!(session = %self.session, "login code requested");
        Ok(())
    }

    async fn sign_in(&self, code: &str) -> Result<Account, ClientError> {
        let result = {
            let pending = self.login_token.lock().await;
            let token = pending.as_ref().ok_or(ClientError::NoPendingLogin)?;
            self.client.sign_in(token, code).await
        };

        match result {
            Ok(user) => self.signed_in(&user).await,
            Err(SignInError::PasswordRequired(token)) => {
                let hint = token.hint().map(|h| h.to_string());
                *self.password_token.lock().await = Some(token);
                Err(ClientError::PasswordRequired { hint })
            },
            Err(SignInError::InvalidCode) => Err(ClientError::InvalidCode),
            Err(SignInError::InvalidPassword) => Err(ClientError::InvalidPassword),
            Err(SignInError::SignUpRequired { .. }) => Err(ClientError::SignUpRequired),
            Err(SignInError::Other(e)) => Err(from_invocation(e)),
        }
    }

    async fn check_password(&self, password: &Secret<String>) -> Result<Account, ClientError> {
        // Kept until success so a mistyped password can be retried.
        let token = self
            .password_token
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NoPendingLogin)?;

        match self
            .client
            .check_password(token, password.expose_secret().as_bytes())
            .await
        {
            Ok(user) => self.signed_in(&user).await,
            Err(SignInError::InvalidPassword) => Err(ClientError::InvalidPassword),
            Err(SignInError::Other(e)) => Err(from_invocation(e)),
            Err(e) => Err(ClientError::Transport(e.to_string())),
        }
    }

    async fn me(&self) -> Result<Account, ClientError> {
        let user = self.client.get_me().await.map_err(from_invocation)?;
        Ok(account_from_user(&user))
    }

    async fn dialogs(&self) -> Result<Vec<Conversation>, ClientError> {
        let mut dialogs = self.client.iter_dialogs();
        let mut out = Vec::new();
        while let Some(dialog) = dialogs.next().await.map_err(from_invocation)? {
            out.push(conversation_from_chat(dialog.chat()));
        }
        debug!(session = %self.session, count = out.len(), "fetched dialogs");
        Ok(out)
    }

    async fn recent_messages(
        &self,
        peer: &PeerRef,
        limit: usize,
    ) -> Result<Vec<MessagePreview>, ClientError> {
        let chat = unpack(peer)?;
        let mut messages = self.client.iter_messages(chat).limit(limit);
        let mut out = Vec::with_capacity(limit);
        while let Some(message) = messages.next().await.map_err(from_invocation)? {
            out.push(preview_from_message(&message));
        }
        Ok(out)
    }

    async fn delete_history(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let chat = unpack(peer)?;
        match peer.kind {
            PeerKind::User | PeerKind::Bot | PeerKind::Group => {
                // The server deletes in batches and reports how much is left.
                loop {
                    let tl::enums::messages::AffectedHistory::History(affected) = self
                        .client
                        .invoke(&tl::functions::messages::DeleteHistory {
                            just_clear: false,
                            revoke: true,
                            peer: chat.to_input_peer(),
                            max_id: 0,
                            min_date: None,
                            max_date: None,
                        })
                        .await
                        .map_err(from_invocation)?;
                    if affected.offset <= 0 {
                        break;
                    }
                }
            },
            PeerKind::Supergroup => {
                let channel = chat
                    .try_to_input_channel()
                    .ok_or(ClientError::Unsupported("peer is not a channel"))?;
                self.client
                    .invoke(&tl::functions::channels::DeleteHistory {
                        for_everyone: false,
                        channel,
                        max_id: 0,
                    })
                    .await
                    .map_err(from_invocation)?;
            },
            PeerKind::Channel => {
                return Err(ClientError::Unsupported(
                    "history of broadcast channels cannot be deleted",
                ));
            },
        }
        debug!(session = %self.session, peer = ?peer, "history deleted");
        Ok(())
    }

    async fn leave(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let chat = unpack(peer)?;
        self.client
            .delete_dialog(chat)
            .await
            .map_err(from_invocation)?;
        debug!(session = %self.session, peer = ?peer, "left conversation");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.save_session()?;
        info!(session = %self.session, "disconnected");
        Ok(())
    }
}

fn from_lock_error(err: LockError) -> ClientError {
    match err {
        LockError::Busy { path } => {
            warn!(path = %path.display(), "session file busy");
            ClientError::SessionLocked
        },
        LockError::Io { source, .. } => ClientError::Io(source),
    }
}

fn from_invocation(err: InvocationError) -> ClientError {
    match err {
        InvocationError::Rpc(rpc) => rpc_error(rpc.code, &rpc.name, rpc.value),
        other => ClientError::Transport(other.to_string()),
    }
}

fn from_authorization(err: AuthorizationError) -> ClientError {
    match err {
        AuthorizationError::Invoke(e) => from_invocation(e),
        other => ClientError::Transport(other.to_string()),
    }
}

fn rpc_error(code: i32, name: &str, value: Option<u32>) -> ClientError {
    match name {
        "FLOOD_WAIT" | "SLOWMODE_WAIT" => ClientError::FloodWait {
            seconds: value.unwrap_or(0),
        },
        "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "USER_DEACTIVATED" => {
            ClientError::Unauthorized
        },
        "PHONE_CODE_INVALID" | "PHONE_CODE_EXPIRED" | "PHONE_CODE_EMPTY" => {
            ClientError::InvalidCode
        },
        "PASSWORD_HASH_INVALID" => ClientError::InvalidPassword,
        "PHONE_NUMBER_INVALID" => ClientError::InvalidPhone,
        "PHONE_NUMBER_BANNED" => ClientError::PhoneBanned,
        _ => ClientError::Rpc {
            code,
            name: name.to_string(),
        },
    }
}

fn unpack(peer: &PeerRef) -> Result<PackedChat, ClientError> {
    PackedChat::from_bytes(peer.packed())
        .map_err(|_| ClientError::Unsupported("conversation handle is not from this client"))
}

fn peer_kind(ty: PackedType) -> PeerKind {
    match ty {
        PackedType::User => PeerKind::User,
        PackedType::Bot => PeerKind::Bot,
        PackedType::Chat => PeerKind::Group,
        PackedType::Megagroup | PackedType::Gigagroup => PeerKind::Supergroup,
        PackedType::Broadcast => PeerKind::Channel,
    }
}

fn account_from_user(user: &User) -> Account {
    Account {
        id: user.id(),
        display_name: user.full_name(),
        username: user.username().map(str::to_string),
    }
}

fn conversation_from_chat(chat: &Chat) -> Conversation {
    let packed = chat.pack();
    let kind = peer_kind(packed.ty);
    let profile = match chat {
        Chat::User(user) => Some(UserProfile {
            first_name: user.raw.first_name.clone().filter(|n| !n.is_empty()),
            last_name: user.raw.last_name.clone().filter(|n| !n.is_empty()),
            deleted: user.raw.deleted,
        }),
        _ => None,
    };
    Conversation {
        peer: PeerRef::new(kind.marked_id(chat.id()), kind, packed.to_bytes().to_vec()),
        name: chat.name().to_string(),
        profile,
    }
}

fn preview_from_message(message: &Message) -> MessagePreview {
    let media = match message.media() {
        Some(Media::Photo(_)) => Some(MediaKind::Photo),
        Some(Media::Document(doc)) if is_voice(&doc.raw) => Some(MediaKind::Voice),
        Some(Media::Document(_)) => Some(MediaKind::File),
        _ => None,
    };
    MessagePreview {
        id: message.id(),
        text: message.text().to_string(),
        media,
    }
}

fn is_voice(media: &tl::types::MessageMediaDocument) -> bool {
    match &media.document {
        Some(tl::enums::Document::Document(doc)) => has_voice_attribute(&doc.attributes),
        _ => false,
    }
}

fn has_voice_attribute(attributes: &[tl::enums::DocumentAttribute]) -> bool {
    attributes
        .iter()
        .any(|a| matches!(a, tl::enums::DocumentAttribute::Audio(audio) if audio.voice))
}
