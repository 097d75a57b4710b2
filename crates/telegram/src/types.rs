use std::fmt;

/// The logged-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub display_name: String,
    pub username: Option<String>,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(username) => write!(f, "{} (@{username})", self.display_name),
            None => f.write_str(&self.display_name),
        }
    }
}

const CHANNEL_ID_BASE: i64 = -1_000_000_000_000;

/// What sort of peer a conversation is with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    User,
    Bot,
    /// Basic (legacy) group.
    Group,
    /// Megagroup or gigagroup, backed by a channel.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl PeerKind {
    pub fn is_user(self) -> bool {
        matches!(self, Self::User | Self::Bot)
    }

    /// Dialog id in the marked form: users and bots as-is, basic groups
    /// negated, channels and supergroups under `-100…`. Raw ids of different
    /// kinds overlap; marked ids do not.
    pub fn marked_id(self, raw: i64) -> i64 {
        match self {
            Self::User | Self::Bot => raw,
            Self::Group => -raw,
            Self::Supergroup | Self::Channel => CHANNEL_ID_BASE - raw,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle for addressing a conversation in later calls.
///
/// `packed` is backend-specific (for grammers, a serialized `PackedChat`)
/// and is only meaningful to the client that produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerRef {
    /// Marked id (see [`PeerKind::marked_id`]), unique across kinds.
    pub id: i64,
    pub kind: PeerKind,
    packed: Vec<u8>,
}

impl PeerRef {
    pub fn new(id: i64, kind: PeerKind, packed: Vec<u8>) -> Self {
        Self { id, kind, packed }
    }

    pub fn packed(&self) -> &[u8] {
        &self.packed
    }
}

impl fmt::Debug for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Name fields of a user peer, used to label nameless conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub deleted: bool,
}

/// One entry of the dialog list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub peer: PeerRef,
    /// Title as reported by the server; may be empty.
    pub name: String,
    /// Present for user and bot peers.
    pub profile: Option<UserProfile>,
}

/// Non-text content of a message, as far as previews care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Voice,
    File,
}

/// A message reduced to what a preview shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePreview {
    pub id: i32,
    pub text: String,
    pub media: Option<MediaKind>,
}

impl MessagePreview {
    /// Single-line rendering: a media placeholder, the text, or `[No Text]`.
    pub fn render(&self) -> &str {
        match self.media {
            Some(MediaKind::Photo) => "[Image]",
            Some(MediaKind::Voice) => "[Voice Message]",
            Some(MediaKind::File) => "[File Message]",
            None if self.text.is_empty() => "[No Text]",
            None => &self.text,
        }
    }
}
