//! Fixture loading, standing in for the booking flow that creates rides.

use std::path::Path;

use rideshare_domain::{DriverProfile, Ride};
use rideshare_storage::RideStorage;
use rust_decimal::Decimal;
use serde::Deserialize;
use time::OffsetDateTime;

use super::{print_json, CommandError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Fixture {
    #[serde(default)]
    rides: Vec<RideFixture>,
    #[serde(default)]
    drivers: Vec<DriverProfile>,
}

/// A freshly booked ride. Everything the lifecycle fills in later is absent.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RideFixture {
    id: String,
    passenger_id: String,
    price: Decimal,
    #[serde(default)]
    community_id: Option<String>,
    #[serde(default)]
    allow_external_drivers: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    offer_sent_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
}

impl RideFixture {
    fn into_ride(self, now: OffsetDateTime) -> Result<Ride, String> {
        if self.id.trim().is_empty() {
            return Err("ride id must not be empty".to_string());
        }
        if self.price.is_sign_negative() {
            return Err(format!("ride {} has a negative price", self.id));
        }
        let mut ride = Ride::requested(
            self.id,
            self.passenger_id,
            self.price,
            self.created_at.unwrap_or(now),
        );
        ride.community_id = self.community_id;
        ride.allow_external_drivers = self.allow_external_drivers;
        ride.offer_sent_at = self.offer_sent_at;
        Ok(ride)
    }
}

fn load(path: &Path) -> Result<Fixture, CommandError> {
    let text = std::fs::read_to_string(path).map_err(|source| CommandError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| CommandError::Fixture {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub(super) async fn run<S: RideStorage>(storage: &S, path: &Path) -> Result<(), CommandError> {
    let fixture = load(path)?;
    let now = OffsetDateTime::now_utc();
    let rides = fixture
        .rides
        .into_iter()
        .map(|r| r.into_ride(now))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| CommandError::Fixture {
            path: path.to_path_buf(),
            message,
        })?;
    let (ride_count, driver_count) = (rides.len(), fixture.drivers.len());

    let mut snapshot = storage.begin_snapshot().await?;
    if let Err(e) = stage(storage, &mut snapshot, rides, fixture.drivers).await {
        storage.abort_snapshot(snapshot).await?;
        return Err(e.into());
    }
    storage.commit_snapshot(snapshot).await?;

    tracing::info!(rides = ride_count, drivers = driver_count, "fixture loaded");
    print_json(&serde_json::json!({
        "rides": ride_count,
        "drivers": driver_count,
    }))
}

async fn stage<S: RideStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    rides: Vec<Ride>,
    drivers: Vec<DriverProfile>,
) -> Result<(), rideshare_storage::StorageError> {
    for driver in drivers {
        storage.upsert_driver(snapshot, driver).await?;
    }
    for ride in rides {
        storage.insert_ride(snapshot, ride).await?;
    }
    Ok(())
}
