//! Ride lifecycle domain types.
//!
//! Everything here is plain data plus pure functions: the status adjacency
//! table, the ride record, driver eligibility data, audit records, fare
//! arithmetic, and the deterministic incentive assignor. Storage lives in
//! `rideshare-storage`; the mutation rules live in `rideshare-engine`.

pub mod actor;
pub mod audit;
pub mod clock;
pub mod driver;
pub mod incentive;
pub mod money;
pub mod ride;
pub mod status;

pub use actor::{Actor, AdminCapability, AdminRole};
pub use audit::{new_record_id, AdminAction, AdminActionKind, AdminActionQuery, StatusHistoryEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{DriverProfile, DriverStatus};
pub use incentive::{assign, bucket_of, AbGroup, BucketBy, IncentiveAssignment, IncentiveConfig};
pub use money::{round_money, AmountOverflow, FeePolicy, FinancialSplit};
pub use ride::{Ride, RideProjection};
pub use status::{ParseStatusError, RideStatus};
