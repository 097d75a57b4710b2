//! Named session storage.
//!
//! Each session lives in the sessions directory as a pair of files:
//! `<name>.session` (opaque, owned by the Telegram client library) and
//! `<name>.json` (API credentials and phone number). A `<name>.session.lock`
//! sidecar serializes access to the session file across processes.

pub mod credentials;
pub mod dir;
pub mod error;
pub mod lock;
pub mod name;

pub use {
    credentials::{CredentialStore, SessionCredentials},
    dir::{DeleteOutcome, SessionDir, SessionPaths},
    error::SessionError,
    lock::{LockError, with_session_lock},
    name::SessionName,
};
