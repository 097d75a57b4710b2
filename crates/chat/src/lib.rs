//! Conversation listing, message previews and bulk purge.

pub mod list;
pub mod preview;
pub mod purge;

pub use {
    list::{ChatEntry, ChatList, label_for, load_chats},
    preview::preview,
    purge::{PurgePlan, PurgeReport, PurgeStep, PurgeTarget, Purger, StepOutcome, TargetReport},
};
