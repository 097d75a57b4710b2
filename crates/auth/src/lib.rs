//! Interactive login as an explicit state machine.
//!
//! [`LoginFlow`] drives a session from credentials entry through the login
//! code and optional two-factor password to an authorized client. Each step
//! is a method that is only valid in certain [`LoginState`]s; calling it in
//! any other state fails with [`LoginError::InvalidTransition`].

pub mod error;
pub mod flow;
pub mod retry;
pub mod state;

pub use {
    error::LoginError,
    flow::{AuthorizedSession, LoginFlow, LoginRequest},
    retry::{ConnectPolicy, connect_with_retry},
    state::{LoginState, Prefill},
};
