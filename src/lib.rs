//! outdial - outbound call dispatcher for an Asterisk switch
//!
//! This library places batches of outbound calls through Asterisk while
//! keeping a bounded number of calls in flight. Every call is tagged with a
//! call-id taken from a durable counter that is safe to share between
//! independent processes.
//!
//! # Core Concepts
//!
//! - **Call-id**: a monotonically increasing integer identifying one call
//!   attempt, issued by [`CallIdAllocator`]
//! - **Active set**: call-ids dispatched but not yet seen complete
//! - **Completion marker**: a file the dialplan writes when a call ends
//! - **Concurrency ceiling**: the largest allowed active set
//!
//! # Example Usage
//!
//! ```no_run
//! use outdial::{CallDispatcher, CallIdAllocator, DispatchOptions};
//! use outdial::telephony::{AsteriskOriginator, AsteriskSettings, MarkerDirectory};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let markers = MarkerDirectory::new("calls_answers");
//! markers.ensure_exists()?;
//!
//! let dispatcher = CallDispatcher::new(
//!     CallIdAllocator::new("data/call_id_track"),
//!     Arc::new(AsteriskOriginator::new(AsteriskSettings::default())),
//!     Arc::new(markers),
//! );
//!
//! let options = DispatchOptions::new("0534540615").with_max_concurrent(1);
//! let report = dispatcher.run(["0546844668", "0542325811"], &options).await?;
//! println!("Completed: {:?}", report.completed);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`allocator`]: durable cross-process call-id counter
//! - [`dispatch`]: concurrency-bounded dispatch loop and its report
//! - [`phone`]: number validation and normalization
//! - [`telephony`]: Asterisk origination and completion markers
//! - [`config`]: environment-driven configuration

pub mod allocator;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod phone;
pub mod telephony;
pub mod util;

pub use allocator::{AllocatorError, CallIdAllocator};
pub use config::{ConfigError, OutdialConfig};
pub use dispatch::{CallDispatcher, DispatchError, DispatchOptions, DispatchReport};
pub use phone::{NumberError, PhoneNumber};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
