use std::fmt;

use async_trait::async_trait;

use crate::domain::ChatId;

/// Error code the Bot API answers with when flood control kicks in.
pub const RATE_LIMITED_CODE: i32 = 429;

/// Failure reported by a [`DeliveryClient`] for a single send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryError {
    pub code: Option<i32>,
    pub description: String,
}

impl DeliveryError {
    pub fn new(code: Option<i32>, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn rate_limited(description: impl Into<String>) -> Self {
        Self::new(Some(RATE_LIMITED_CODE), description)
    }

    /// Only flood-control failures are worth another attempt.
    pub fn is_rate_limited(&self) -> bool {
        self.code == Some(RATE_LIMITED_CODE)
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.description),
            None => f.write_str(&self.description),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Port for delivering one text message to one destination.
///
/// The Telegram adapter implements this over the Bot API; tests use fakes.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, destination: ChatId, text: &str) -> Result<(), DeliveryError>;
}
