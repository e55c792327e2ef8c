use rideshare_domain::{assign, bucket_of, IncentiveConfig};
use rust_decimal::Decimal;

use super::{print_json, CommandError};

/// What the assignor would hand `id` under the configured experiment.
pub(super) fn run(id: &str, fare: Decimal, config: &IncentiveConfig) -> Result<(), CommandError> {
    let assignment = assign(id, fare, config)?;
    print_json(&serde_json::json!({
        "id": id,
        "experiment_key": config.experiment_key,
        "enabled": config.enabled,
        "bucket": bucket_of(&config.experiment_key, id),
        "split_pct": config.split_pct,
        "assignment": assignment,
    }))
}
