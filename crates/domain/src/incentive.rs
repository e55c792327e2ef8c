//! First-accept bonus / A-B bucket assignment.
//!
//! Assignment is a pure function of the configuration and a stable
//! identifier. The bucket is the first eight bytes of
//! `SHA-256(experiment_key ":" id)` read as a big-endian `u64`, modulo 100.
//! Buckets below `split_pct` land in group `A`, which receives the bonus;
//! the rest are the control group `B`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::money::{rounded_product, AmountOverflow};

/// Which identifier a ride is bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketBy {
    #[default]
    Ride,
    Passenger,
}

/// Experiment cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbGroup {
    A,
    B,
}

impl AbGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            AbGroup::A => "A",
            AbGroup::B => "B",
        }
    }
}

/// Live configuration of the first-accept bonus experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncentiveConfig {
    pub enabled: bool,
    /// Percentage of identifiers (0..=100) placed in the bonus group.
    pub split_pct: u8,
    /// Fraction of the base fare paid as a bonus.
    pub bonus_rate: Decimal,
    /// Salt for the bucket hash; changing it reshuffles every identifier.
    pub experiment_key: String,
    pub bucket_by: BucketBy,
}

impl Default for IncentiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            split_pct: 50,
            bonus_rate: Decimal::new(20, 2),
            experiment_key: "first-accept".to_string(),
            bucket_by: BucketBy::Ride,
        }
    }
}

/// Result of an assignment, persisted with the accept transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncentiveAssignment {
    pub has_bonus: bool,
    pub group: Option<AbGroup>,
    pub bonus_amount: Decimal,
}

impl IncentiveAssignment {
    pub fn none() -> Self {
        Self {
            has_bonus: false,
            group: None,
            bonus_amount: Decimal::ZERO,
        }
    }
}

/// Deterministic bucket in `0..100` for `id` under `experiment_key`.
pub fn bucket_of(experiment_key: &str, id: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(experiment_key.as_bytes());
    hasher.update(b":");
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

/// Assign `id` to a cohort and compute its bonus on `base_fare`.
///
/// Fails only when `base_fare * bonus_rate` does not fit in a `Decimal`.
pub fn assign(
    id: &str,
    base_fare: Decimal,
    config: &IncentiveConfig,
) -> Result<IncentiveAssignment, AmountOverflow> {
    if !config.enabled {
        return Ok(IncentiveAssignment::none());
    }
    let assignment = if bucket_of(&config.experiment_key, id) < config.split_pct {
        IncentiveAssignment {
            has_bonus: true,
            group: Some(AbGroup::A),
            bonus_amount: rounded_product(base_fare, config.bonus_rate, "bonus amount")?,
        }
    } else {
        IncentiveAssignment {
            has_bonus: false,
            group: Some(AbGroup::B),
            bonus_amount: Decimal::ZERO,
        }
    };
    Ok(assignment)
}
