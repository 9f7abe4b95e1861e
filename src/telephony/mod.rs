//! Collaborators that talk to the telephony switch
//!
//! The dispatcher only knows two narrow contracts:
//!
//! - [`CallOriginator`]: place a call for a validated `(target, source, call_id)`
//! - [`CompletionSource`]: tell whether a call-id has finished, and clear
//!   leftovers of a call-id before it is reused
//!
//! [`AsteriskOriginator`] and [`MarkerDirectory`] are the production
//! implementations. Tests substitute their own.

pub mod asterisk;
pub mod markers;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::phone::PhoneNumber;

pub use asterisk::{AsteriskOriginator, AsteriskSettings};
pub use markers::{CompletionSource, MarkerDirectory};

/// A single call to place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub call_id: u64,
    pub target: PhoneNumber,
    pub source: PhoneNumber,
}

impl CallRequest {
    /// The `<source>-<target>-<call_id>` token the dialplan receives
    pub fn dial_token(&self) -> String {
        format!("{}-{}-{}", self.source, self.target, self.call_id)
    }
}

/// What the switch reported for a successful origination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginateOutcome {
    pub output: String,
}

/// Errors reported by a call originator
#[derive(Debug, Error)]
pub enum OriginateError {
    /// The switch CLI could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The switch CLI did not finish in time
    #[error("Origination timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The switch CLI ran and reported failure
    #[error("Origination failed (exit code {code:?}): {stderr}")]
    Rejected { code: Option<i32>, stderr: String },

    /// Talking to the switch CLI failed midway
    #[error("I/O error while originating: {0}")]
    Io(#[from] std::io::Error),
}

/// Places outbound calls
#[async_trait]
pub trait CallOriginator: Send + Sync {
    /// Asks the switch to originate `request`
    ///
    /// Success means the switch accepted the request, not that anyone answered.
    async fn originate(&self, request: &CallRequest) -> Result<OriginateOutcome, OriginateError>;
}
