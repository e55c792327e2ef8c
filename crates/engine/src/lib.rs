//! Ride lifecycle mutation layer.
//!
//! [`TransitionEngine`] validates and applies status changes with
//! optimistic concurrency on top of any [`rideshare_storage::RideStorage`].
//! Driver and passenger actions are methods on the engine; admin-only
//! changes go through [`AdminFacade`], which adds capability checks and the
//! admin action record.

mod admin;
mod driver;
mod engine;
mod error;
pub mod gate;

pub use admin::{AdminCommand, AdminFacade, AdminRequest};
pub use driver::{DriverAction, DriverOutcome, DriverRequest};
pub use engine::{TransitionEngine, TransitionOutcome, TransitionRequest, MAX_REASON_LEN};
pub use error::{EngineError, ResultCode};
pub use gate::{Eligibility, NotEligibleReason};
