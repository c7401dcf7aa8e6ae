use thiserror::Error;

use crate::events::SubscriberError;
use crate::transport::TransportError;
use crate::wire::WireError;

#[derive(Debug, Error)]
pub enum DmsError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid locator `{locator}`: {reason}")]
    Locator { locator: String, reason: String },

    #[error("Subscriber failed: {0}")]
    Subscriber(#[from] SubscriberError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DmsError {
    pub fn locator(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        DmsError::Locator {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error signals a defect in an event subscriber.
    pub fn is_subscriber_failure(&self) -> bool {
        matches!(self, DmsError::Subscriber(_))
    }
}
