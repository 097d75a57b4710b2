use {
    teletrim_telegram::{
        Account, ClientError, Conversation, MessengerClient, PeerKind, PeerRef, UserProfile,
    },
    tracing::{debug, warn},
};

pub const SAVED_MESSAGES: &str = "Saved Messages";
pub const DELETED_ACCOUNT: &str = "[Deleted Account]";
pub const UNKNOWN: &str = "[Unknown]";

/// A conversation with the label shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub conversation: Conversation,
    pub label: String,
    /// The conversation with oneself. It can be cleared but never left.
    pub is_saved: bool,
}

impl ChatEntry {
    pub fn id(&self) -> i64 {
        self.conversation.peer.id
    }

    pub fn kind(&self) -> PeerKind {
        self.conversation.peer.kind
    }

    pub fn peer(&self) -> &PeerRef {
        &self.conversation.peer
    }
}

/// Labelled dialog list, in the server's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatList {
    entries: Vec<ChatEntry>,
}

impl ChatList {
    /// Label `conversations`. Without `me`, Saved Messages is not detected.
    pub fn build(conversations: Vec<Conversation>, me: Option<&Account>) -> Self {
        let me_id = me.map(|account| account.id);
        let entries = conversations
            .into_iter()
            .map(|conversation| {
                let (label, is_saved) = label_for(&conversation, me_id);
                ChatEntry {
                    conversation,
                    label,
                    is_saved,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: i64) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Display label for a conversation, and whether it is Saved Messages.
pub fn label_for(conversation: &Conversation, me_id: Option<i64>) -> (String, bool) {
    let peer = &conversation.peer;
    if peer.kind.is_user() && me_id == Some(peer.id) {
        return (SAVED_MESSAGES.to_string(), true);
    }

    let name = conversation.name.trim();
    if !name.is_empty() {
        return (name.to_string(), false);
    }

    match &conversation.profile {
        Some(profile) if peer.kind.is_user() && looks_deleted(profile) => {
            (DELETED_ACCOUNT.to_string(), false)
        },
        _ => (UNKNOWN.to_string(), false),
    }
}

fn looks_deleted(profile: &UserProfile) -> bool {
    profile.deleted
        || (profile.first_name.is_none() && profile.last_name.is_none())
        || profile.first_name.as_deref() == Some("Deleted Account")
}

/// Fetch and label the dialog list.
///
/// A failure to fetch the current account is logged and only disables
/// Saved Messages detection; a failure to fetch dialogs is returned.
pub async fn load_chats<C: MessengerClient + ?Sized>(client: &C) -> Result<ChatList, ClientError> {
    let me = match client.me().await {
        Ok(me) => Some(me),
        Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
        Err(e) => {
            warn!(error = %e, "could not fetch the current account");
            None
        },
    };
    let dialogs = client.dialogs().await?;
    let list = ChatList::build(dialogs, me.as_ref());
    debug!(count = list.len(), "loaded chats");
    Ok(list)
}
