//! Column encodings and row parsers.
//!
//! Money is stored as decimal TEXT and timestamps as RFC 3339 TEXT so that
//! nothing passes through a float.

use std::str::FromStr;

use rideshare_domain::{
    AbGroup, Actor, AdminAction, AdminActionKind, DriverProfile, DriverStatus, Ride, RideStatus,
    StatusHistoryEntry,
};
use rideshare_storage::StorageError;
use rusqlite::types::Type;
use rusqlite::Row;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub(crate) const RIDE_COLUMNS: &str = "id, status, passenger_id, driver_id, community_id,
    allow_external_drivers, price, platform_fee, driver_amount, offer_sent_at, accepted_at,
    accept_time_seconds, has_bonus, ab_group, bonus_amount, cancel_reason, cancelled_by,
    cancelled_at, forced_completed_by, forced_completed_at, version, updated_at";

pub(crate) const DRIVER_COLUMNS: &str =
    "id, status, banned, deleted_at, suspended_until, community_id";

pub(crate) const HISTORY_COLUMNS: &str =
    "id, ride_id, from_status, status, version, actor_json, recorded_at";

pub(crate) const ADMIN_ACTION_COLUMNS: &str =
    "id, ride_id, admin_id, kind, reason, old_value, new_value, recorded_at";

pub(crate) fn backend(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

pub(crate) fn format_time(at: OffsetDateTime) -> Result<String, StorageError> {
    at.format(&Rfc3339).map_err(backend)
}

pub(crate) fn format_opt_time(at: Option<OffsetDateTime>) -> Result<Option<String>, StorageError> {
    at.map(format_time).transpose()
}

pub(crate) fn driver_status_str(status: DriverStatus) -> &'static str {
    match status {
        DriverStatus::Pending => "pending",
        DriverStatus::Approved => "approved",
        DriverStatus::Rejected => "rejected",
    }
}

fn invalid(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        ty,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

fn parse_decimal(idx: usize, raw: &str) -> rusqlite::Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| invalid(idx, Type::Text, format!("invalid decimal '{raw}': {e}")))
}

fn get_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    parse_decimal(idx, &raw)
}

fn get_opt_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_decimal(idx, &r)).transpose()
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| invalid(idx, Type::Text, format!("invalid timestamp '{raw}': {e}")))
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let raw: String = row.get(idx)?;
    parse_time(idx, &raw)
}

fn get_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_time(idx, &r)).transpose()
}

fn get_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<RideStatus> {
    let raw: String = row.get(idx)?;
    RideStatus::from_str(&raw).map_err(|e| invalid(idx, Type::Text, e.to_string()))
}

fn get_ab_group(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<AbGroup>> {
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref() {
        None => Ok(None),
        Some("A") => Ok(Some(AbGroup::A)),
        Some("B") => Ok(Some(AbGroup::B)),
        Some(other) => Err(invalid(idx, Type::Text, format!("invalid ab_group '{other}'"))),
    }
}

/// Parse a row selected with [`RIDE_COLUMNS`].
pub(crate) fn parse_ride_row(row: &Row<'_>) -> rusqlite::Result<Ride> {
    Ok(Ride {
        id: row.get(0)?,
        status: get_status(row, 1)?,
        passenger_id: row.get(2)?,
        driver_id: row.get(3)?,
        community_id: row.get(4)?,
        allow_external_drivers: row.get(5)?,
        price: get_decimal(row, 6)?,
        platform_fee: get_opt_decimal(row, 7)?,
        driver_amount: get_opt_decimal(row, 8)?,
        offer_sent_at: get_opt_time(row, 9)?,
        accepted_at: get_opt_time(row, 10)?,
        accept_time_seconds: row.get(11)?,
        has_bonus: row.get(12)?,
        ab_group: get_ab_group(row, 13)?,
        bonus_amount: get_opt_decimal(row, 14)?,
        cancel_reason: row.get(15)?,
        cancelled_by: row.get(16)?,
        cancelled_at: get_opt_time(row, 17)?,
        forced_completed_by: row.get(18)?,
        forced_completed_at: get_opt_time(row, 19)?,
        version: row.get(20)?,
        updated_at: get_time(row, 21)?,
    })
}

pub(crate) fn parse_driver_row(row: &Row<'_>) -> rusqlite::Result<DriverProfile> {
    let status_raw: String = row.get(1)?;
    let status = match status_raw.as_str() {
        "pending" => DriverStatus::Pending,
        "approved" => DriverStatus::Approved,
        "rejected" => DriverStatus::Rejected,
        other => {
            return Err(invalid(1, Type::Text, format!("invalid driver status '{other}'")));
        }
    };
    Ok(DriverProfile {
        id: row.get(0)?,
        status,
        banned: row.get(2)?,
        deleted_at: get_opt_time(row, 3)?,
        suspended_until: get_opt_time(row, 4)?,
        community_id: row.get(5)?,
    })
}

pub(crate) fn parse_history_row(row: &Row<'_>) -> rusqlite::Result<StatusHistoryEntry> {
    let actor_json: String = row.get(5)?;
    let actor: Actor = serde_json::from_str(&actor_json)
        .map_err(|e| invalid(5, Type::Text, format!("invalid actor_json: {e}")))?;
    Ok(StatusHistoryEntry {
        id: row.get(0)?,
        ride_id: row.get(1)?,
        from_status: get_status(row, 2)?,
        status: get_status(row, 3)?,
        version: row.get(4)?,
        actor,
        recorded_at: get_time(row, 6)?,
    })
}

pub(crate) fn parse_admin_action_row(row: &Row<'_>) -> rusqlite::Result<AdminAction> {
    let kind_raw: String = row.get(3)?;
    let kind = AdminActionKind::parse(&kind_raw)
        .ok_or_else(|| invalid(3, Type::Text, format!("invalid admin action kind '{kind_raw}'")))?;
    Ok(AdminAction {
        id: row.get(0)?,
        ride_id: row.get(1)?,
        admin_id: row.get(2)?,
        kind,
        reason: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        recorded_at: get_time(row, 7)?,
    })
}

pub(crate) fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>, StorageError> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(backend)?);
    }
    Ok(values)
}
