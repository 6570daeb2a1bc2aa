//! Document store behind the bot.
//!
//! The campaign manager only needs [`BroadcastStore`]; the Telegram shell uses
//! the wider [`BotStore`] for group tracking, access control and menus.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, UserId},
    Result,
};

pub mod document;

pub use document::{DocumentStore, StoreDocument};

/// A chat the bot has been added to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    /// Only groups where the bot is an administrator receive broadcasts.
    pub is_admin: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(default)]
    pub waiting_for_broadcast: bool,
}

/// Campaign timestamps used for the cool-down window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastState {
    /// Set once a campaign has delivered to every destination.
    #[serde(default)]
    pub last_broadcast_at: Option<DateTime<Utc>>,
    /// Set when a campaign begins dispatching.
    #[serde(default)]
    pub last_started_at: Option<DateTime<Utc>>,
}

impl BroadcastState {
    /// The most recent campaign activity, whichever marker is later.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.last_broadcast_at, self.last_started_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[async_trait]
pub trait BroadcastStore: Send + Sync {
    /// Groups where the bot holds admin rights, in stable order.
    async fn eligible_destinations(&self) -> Result<Vec<ChatId>>;

    async fn broadcast_state(&self) -> Result<BroadcastState>;

    async fn save_broadcast_state(&self, state: &BroadcastState) -> Result<()>;
}

#[async_trait]
pub trait BotStore: BroadcastStore {
    async fn upsert_group(&self, chat: ChatId, record: GroupRecord) -> Result<()>;

    /// Returns whether the group was known.
    async fn remove_group(&self, chat: ChatId) -> Result<bool>;

    async fn is_allowed_user(&self, user: UserId) -> Result<bool>;

    async fn user_state(&self, user: UserId) -> Result<UserState>;

    async fn set_waiting_for_broadcast(&self, user: UserId, waiting: bool) -> Result<()>;

    async fn categories(&self) -> Result<Vec<String>>;

    async fn category_functions(&self, category: &str) -> Result<Vec<String>>;

    async fn function_response(&self, category: &str, function: &str) -> Result<Option<String>>;
}
