#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use rideshare_domain::{DriverProfile, ManualClock, Ride};
use rideshare_engine::{AdminFacade, TransitionEngine};
use rideshare_storage::{InMemoryStorage, RideStorage};
use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

pub const T0: OffsetDateTime = datetime!(2025-03-01 9:00 UTC);

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn ride(id: &str, price: &str) -> Ride {
    Ride::requested(id, "P1", dec(price), T0)
}

pub async fn seed<S: RideStorage>(storage: &S, rides: Vec<Ride>, drivers: Vec<DriverProfile>) {
    let mut snap = storage.begin_snapshot().await.unwrap();
    for ride in rides {
        storage.insert_ride(&mut snap, ride).await.unwrap();
    }
    for driver in drivers {
        storage.upsert_driver(&mut snap, driver).await.unwrap();
    }
    storage.commit_snapshot(snap).await.unwrap();
}

pub struct Harness<S> {
    pub engine: Arc<TransitionEngine<S>>,
    pub admin: AdminFacade<S>,
    pub clock: Arc<ManualClock>,
}

pub fn harness<S: RideStorage>(storage: Arc<S>) -> Harness<S> {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = Arc::new(TransitionEngine::new(storage).with_clock(clock.clone()));
    Harness {
        admin: AdminFacade::new(engine.clone()),
        engine,
        clock,
    }
}

/// In-memory engine with rides and drivers already committed.
pub async fn memory_harness(
    rides: Vec<Ride>,
    drivers: Vec<DriverProfile>,
) -> Harness<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    seed(storage.as_ref(), rides, drivers).await;
    harness(storage)
}
