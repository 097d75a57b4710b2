//! Telegram user-account client wrapper.
//!
//! The rest of the workspace talks to Telegram through the
//! [`MessengerClient`] trait. [`GrammersConnector`] provides the real
//! implementation on top of grammers; [`ClientWorker`] moves a client onto a
//! dedicated task and hands out cloneable [`ClientHandle`]s that serialize
//! calls, bound them with a timeout, and honour cancellation.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod grammers;
pub mod types;
pub mod worker;

pub use {
    client::{ConnectTarget, Connector, MessengerClient},
    error::ClientError,
    grammers::{GrammersClient, GrammersConnector},
    types::{Account, Conversation, MediaKind, MessagePreview, PeerKind, PeerRef, UserProfile},
    worker::{ClientHandle, ClientWorker, WorkerOptions},
};
