use rideshare_domain::{AdminActionQuery, RideStatus};
use rideshare_storage::RideStorage;

use super::{print_json, CommandError};

pub(super) async fn show<S: RideStorage>(storage: &S, ride_id: &str) -> Result<(), CommandError> {
    let ride = storage.get_ride(ride_id).await?;
    print_json(&ride)
}

pub(super) async fn list<S: RideStorage>(
    storage: &S,
    status: Option<RideStatus>,
) -> Result<(), CommandError> {
    let rides = storage.list_rides(status).await?;
    let projections: Vec<_> = rides.iter().map(|r| r.projection()).collect();
    print_json(&projections)
}

/// History of an existing ride; an unknown id is an error, not an empty list.
pub(super) async fn history<S: RideStorage>(
    storage: &S,
    ride_id: &str,
) -> Result<(), CommandError> {
    storage.get_ride(ride_id).await?;
    let entries = storage.list_status_history(ride_id).await?;
    print_json(&entries)
}

pub(super) async fn audit<S: RideStorage>(
    storage: &S,
    query: &AdminActionQuery,
) -> Result<(), CommandError> {
    let actions = storage.list_admin_actions(query).await?;
    print_json(&actions)
}
