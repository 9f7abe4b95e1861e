//! Concurrency-bounded call dispatch
//!
//! The dispatcher walks a work list of target numbers in order. For each one
//! it waits until fewer than `max_concurrent` calls are in flight, allocates a
//! call-id, clears leftovers of that id, asks the originator to place the call
//! and starts tracking the id. A call stops being tracked when its completion
//! marker shows up, or when its deadline (if any) expires. Once the list is
//! exhausted the dispatcher waits for every tracked call to finish.
//!
//! Origination failures are logged and reported but the call-id stays
//! tracked: at this layer a refused call and a call nobody picked up yet look
//! the same. Without a deadline such a call keeps the final drain waiting.
//!
//! # Example
//!
//! ```no_run
//! use outdial::allocator::CallIdAllocator;
//! use outdial::dispatch::{CallDispatcher, DispatchOptions};
//! use outdial::telephony::{AsteriskOriginator, AsteriskSettings, MarkerDirectory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), outdial::dispatch::DispatchError> {
//! let dispatcher = CallDispatcher::new(
//!     CallIdAllocator::new("data/call_id_track"),
//!     Arc::new(AsteriskOriginator::new(AsteriskSettings::default())),
//!     Arc::new(MarkerDirectory::new("calls_answers")),
//! );
//!
//! let options = DispatchOptions::new("0534540615");
//! let report = dispatcher.run(["0546844668", "0542325811"], &options).await?;
//! println!("{} calls completed", report.completed.len());
//! # Ok(())
//! # }
//! ```

pub mod report;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::allocator::{AllocatorError, CallIdAllocator};
use crate::phone::{NumberError, PhoneNumber};
use crate::telephony::{CallOriginator, CallRequest, CompletionSource};

pub use report::{DispatchReport, DispatchedCall, RejectedNumber};

pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// Log the waiting state every this many polls
const WAIT_LOG_EVERY: u64 = 10;

/// Errors that abort a dispatch run
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid source number: {0}")]
    InvalidSource(#[from] NumberError),

    #[error("Call-id allocation failed: {0}")]
    Allocator(#[from] AllocatorError),

    /// Allocation failed after calls were already placed
    #[error(
        "Call-id allocation failed after {} calls were dispatched: {source}",
        .report.dispatched.len()
    )]
    Interrupted {
        source: AllocatorError,
        /// What was dispatched and observed before the failure
        report: Box<DispatchReport>,
    },

    #[error("Call-id allocation task failed: {0}")]
    AllocationTask(#[from] tokio::task::JoinError),
}

/// Parameters of a single dispatch run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Number the calls are placed from
    pub source_number: String,
    /// Concurrency ceiling, at least 1
    pub max_concurrent: usize,
    /// Delay between completion checks while waiting
    pub poll_interval: Duration,
    /// Stop tracking a call this long after dispatch; `None` waits forever
    pub call_deadline: Option<Duration>,
}

impl DispatchOptions {
    pub fn new(source_number: impl Into<String>) -> Self {
        Self {
            source_number: source_number.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            call_deadline: None,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_call_deadline(mut self, call_deadline: Option<Duration>) -> Self {
        self.call_deadline = call_deadline;
        self
    }
}

#[derive(Debug)]
struct ActiveCall {
    call_id: u64,
    started: Instant,
}

/// Drives a batch of calls through the originator
pub struct CallDispatcher {
    allocator: CallIdAllocator,
    originator: Arc<dyn CallOriginator>,
    completions: Arc<dyn CompletionSource>,
}

impl CallDispatcher {
    pub fn new(
        allocator: CallIdAllocator,
        originator: Arc<dyn CallOriginator>,
        completions: Arc<dyn CompletionSource>,
    ) -> Self {
        Self {
            allocator,
            originator,
            completions,
        }
    }

    pub fn allocator(&self) -> &CallIdAllocator {
        &self.allocator
    }

    /// Dispatches every number of `numbers` and waits for all calls to finish
    ///
    /// # Errors
    ///
    /// - `InvalidSource` / `InvalidArgument` before anything is dispatched
    /// - `Allocator` if the call-id store is corrupted or unreachable before
    ///   the first call
    /// - `Interrupted` if that happens later; it carries the partial report,
    ///   and calls already in flight are left to the switch
    pub async fn run<I, S>(
        &self,
        numbers: I,
        options: &DispatchOptions,
    ) -> Result<DispatchReport, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let source = PhoneNumber::parse_source(&options.source_number)?;
        if options.max_concurrent == 0 {
            return Err(DispatchError::InvalidArgument(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        let mut active: Vec<ActiveCall> = Vec::new();
        let mut report = DispatchReport::default();

        for input in numbers {
            let input = input.as_ref();
            let target = match PhoneNumber::parse_target(input) {
                Ok(target) => target,
                Err(e) => {
                    warn!(number = input, "Skipping number: {}", e);
                    report.rejected.push(RejectedNumber {
                        input: input.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            self.wait_until(&mut active, options.max_concurrent - 1, options, &mut report)
                .await;

            let call_id = match self.allocate().await? {
                Ok(call_id) => call_id,
                Err(e) if report.dispatched.is_empty() => return Err(e.into()),
                Err(e) => {
                    let in_flight: Vec<u64> = active.iter().map(|call| call.call_id).collect();
                    error!(
                        in_flight = ?in_flight,
                        "Stopping dispatch, call-id allocation failed: {}", e
                    );
                    return Err(DispatchError::Interrupted {
                        source: e,
                        report: Box::new(report),
                    });
                }
            };

            match self.completions.clear_stale(call_id) {
                Ok(0) => {}
                Ok(removed) => debug!(call_id, removed, "Cleared stale call artifacts"),
                Err(e) => warn!(call_id, "Failed to clear stale call artifacts: {}", e),
            }

            let request = CallRequest {
                call_id,
                target: target.clone(),
                source: source.clone(),
            };
            let dispatched_at = Utc::now();
            let error = match self.originator.originate(&request).await {
                Ok(_) => {
                    info!(call_id, target = %target, "Started call");
                    None
                }
                Err(e) => {
                    error!(call_id, target = %target, "Failed to originate call: {}", e);
                    Some(e.to_string())
                }
            };

            active.push(ActiveCall {
                call_id,
                started: Instant::now(),
            });
            report.peak_active = report.peak_active.max(active.len());
            report.dispatched.push(DispatchedCall {
                call_id,
                target,
                dispatched_at,
                originated: error.is_none(),
                error,
            });
        }

        self.wait_until(&mut active, 0, options, &mut report).await;

        info!(
            dispatched = report.dispatched.len(),
            completed = report.completed.len(),
            timed_out = report.timed_out.len(),
            rejected = report.rejected.len(),
            "All calls completed"
        );
        Ok(report)
    }

    async fn allocate(&self) -> Result<Result<u64, AllocatorError>, DispatchError> {
        let allocator = self.allocator.clone();
        Ok(tokio::task::spawn_blocking(move || allocator.allocate()).await?)
    }

    /// Polls until at most `limit` calls remain active
    async fn wait_until(
        &self,
        active: &mut Vec<ActiveCall>,
        limit: usize,
        options: &DispatchOptions,
        report: &mut DispatchReport,
    ) {
        let mut polls: u64 = 0;
        loop {
            self.refresh(active, options.call_deadline, report);
            if active.len() <= limit {
                return;
            }

            if polls % WAIT_LOG_EVERY == 0 {
                debug!(active = active.len(), limit, "Waiting for active calls");
            }
            polls += 1;
            tokio::time::sleep(options.poll_interval).await;
        }
    }

    /// Drops finished and expired calls from `active`
    fn refresh(
        &self,
        active: &mut Vec<ActiveCall>,
        deadline: Option<Duration>,
        report: &mut DispatchReport,
    ) {
        active.retain(|call| {
            match self.completions.is_complete(call.call_id) {
                Ok(true) => {
                    info!(call_id = call.call_id, "Call completed");
                    report.completed.push(call.call_id);
                    return false;
                }
                Ok(false) => {}
                Err(e) => warn!(
                    call_id = call.call_id,
                    "Failed to check completion marker: {}", e
                ),
            }

            match deadline {
                Some(deadline) if call.started.elapsed() >= deadline => {
                    warn!(
                        call_id = call.call_id,
                        "No completion after {:?}, no longer tracking call", deadline
                    );
                    report.timed_out.push(call.call_id);
                    false
                }
                _ => true,
            }
        });
    }
}
