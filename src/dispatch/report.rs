//! Outcome of one dispatch run

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phone::PhoneNumber;

/// A call handed to the originator
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedCall {
    pub call_id: u64,
    pub target: PhoneNumber,
    pub dispatched_at: DateTime<Utc>,
    /// Whether the switch accepted the origination request
    pub originated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A work-list entry skipped before any call-id was spent on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedNumber {
    pub input: String,
    pub reason: String,
}

/// Summary of a dispatch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Calls in dispatch order
    pub dispatched: Vec<DispatchedCall>,
    /// Call-ids whose completion marker was observed, in observation order
    pub completed: Vec<u64>,
    /// Call-ids dropped from tracking after the per-call deadline
    pub timed_out: Vec<u64>,
    pub rejected: Vec<RejectedNumber>,
    /// Largest active-set size, sampled each time a dispatched call joins the
    /// set (after its origination attempt, refused or not)
    pub peak_active: usize,
}

impl DispatchReport {
    /// Call-ids the switch refused to originate
    pub fn failed_originations(&self) -> Vec<u64> {
        self.dispatched
            .iter()
            .filter(|call| !call.originated)
            .map(|call| call.call_id)
            .collect()
    }

    /// True when every number was dispatched, accepted and observed complete
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
            && self.timed_out.is_empty()
            && self.dispatched.iter().all(|call| call.originated)
    }
}
