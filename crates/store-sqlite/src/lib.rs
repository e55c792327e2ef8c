//! SQLite backend for [`RideStorage`].
//!
//! A snapshot is a buffer of pending operations. `update_ride` checks the
//! expected version eagerly so callers fail fast, but the real arbiter is the
//! commit: every buffered update runs as
//! `UPDATE rides ... WHERE id = ? AND version = ?` inside one transaction,
//! and a zero row count rolls the whole transaction back.

mod rows;
mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rideshare_domain::{
    AdminAction, AdminActionQuery, DriverProfile, Ride, RideStatus, StatusHistoryEntry,
};
use rideshare_storage::{RideStorage, StorageError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use time::OffsetDateTime;

use rows::{
    backend, collect_rows, driver_status_str, format_opt_time, format_time, parse_admin_action_row,
    parse_driver_row, parse_history_row, parse_ride_row, ADMIN_ACTION_COLUMNS, DRIVER_COLUMNS,
    HISTORY_COLUMNS, RIDE_COLUMNS,
};

pub struct SqliteRideStorage {
    conn: Mutex<Connection>,
}

enum PendingOp {
    InsertRide(Ride),
    UpsertDriver(DriverProfile),
    UpdateRide { expected_version: i64, ride: Ride },
    AppendHistory(StatusHistoryEntry),
    AppendAdminAction(AdminAction),
}

/// Buffered writes of one unit of work, applied in order at commit.
#[derive(Default)]
pub struct SqliteSnapshot {
    ops: Vec<PendingOp>,
    /// Version each touched ride will have once this snapshot commits.
    ride_versions: HashMap<String, i64>,
}

impl SqliteRideStorage {
    /// Open (creating if needed) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Backend(format!(
                "failed to open sqlite database at {}: {e}",
                path.display()
            ))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(backend)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// A private in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )
        .map_err(backend)?;
        conn.execute_batch(schema::SCHEMA_V1).map_err(backend)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![schema::SCHEMA_VERSION, format_time(OffsetDateTime::now_utc())?],
        )
        .map_err(backend)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection mutex poisoned".to_string()))
    }

    fn committed_version(&self, ride_id: &str) -> Result<Option<i64>, StorageError> {
        self.conn()?
            .query_row(
                "SELECT version FROM rides WHERE id = ?1",
                params![ride_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
    }

    #[cfg(test)]
    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

fn opt_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

/// Encode `ride` in [`RIDE_COLUMNS`] order, with `version` in place of the
/// ride's own.
fn ride_values(ride: &Ride, version: i64) -> Result<Vec<Value>, StorageError> {
    Ok(vec![
        text(ride.id.as_str()),
        text(ride.status.as_str()),
        text(ride.passenger_id.as_str()),
        opt_text(ride.driver_id.clone()),
        opt_text(ride.community_id.clone()),
        Value::Integer(i64::from(ride.allow_external_drivers)),
        text(ride.price.to_string()),
        opt_text(ride.platform_fee.map(|d| d.to_string())),
        opt_text(ride.driver_amount.map(|d| d.to_string())),
        opt_text(format_opt_time(ride.offer_sent_at)?),
        opt_text(format_opt_time(ride.accepted_at)?),
        ride.accept_time_seconds.map_or(Value::Null, Value::Integer),
        ride.has_bonus.map_or(Value::Null, |b| Value::Integer(i64::from(b))),
        opt_text(ride.ab_group.map(|g| g.as_str().to_string())),
        opt_text(ride.bonus_amount.map(|d| d.to_string())),
        opt_text(ride.cancel_reason.clone()),
        opt_text(ride.cancelled_by.clone()),
        opt_text(format_opt_time(ride.cancelled_at)?),
        opt_text(ride.forced_completed_by.clone()),
        opt_text(format_opt_time(ride.forced_completed_at)?),
        Value::Integer(version),
        text(format_time(ride.updated_at)?),
    ])
}

const UPDATE_RIDE_SQL: &str = "UPDATE rides SET
    status = ?2, passenger_id = ?3, driver_id = ?4, community_id = ?5,
    allow_external_drivers = ?6, price = ?7, platform_fee = ?8, driver_amount = ?9,
    offer_sent_at = ?10, accepted_at = ?11, accept_time_seconds = ?12, has_bonus = ?13,
    ab_group = ?14, bonus_amount = ?15, cancel_reason = ?16, cancelled_by = ?17,
    cancelled_at = ?18, forced_completed_by = ?19, forced_completed_at = ?20,
    version = ?21, updated_at = ?22
  WHERE id = ?1 AND version = ?23";

fn apply(conn: &Connection, op: &PendingOp) -> Result<(), StorageError> {
    match op {
        PendingOp::InsertRide(ride) => {
            let placeholders = (1..=22).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            let sql = format!("INSERT INTO rides ({RIDE_COLUMNS}) VALUES ({placeholders})");
            conn.execute(&sql, params_from_iter(ride_values(ride, ride.version)?))
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        StorageError::RideAlreadyExists {
                            ride_id: ride.id.clone(),
                        }
                    } else {
                        backend(e)
                    }
                })?;
        }
        PendingOp::UpsertDriver(driver) => {
            conn.execute(
                "INSERT INTO drivers(id, status, banned, deleted_at, suspended_until, community_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   banned = excluded.banned,
                   deleted_at = excluded.deleted_at,
                   suspended_until = excluded.suspended_until,
                   community_id = excluded.community_id",
                params![
                    driver.id,
                    driver_status_str(driver.status),
                    driver.banned,
                    format_opt_time(driver.deleted_at)?,
                    format_opt_time(driver.suspended_until)?,
                    driver.community_id,
                ],
            )
            .map_err(backend)?;
        }
        PendingOp::UpdateRide {
            expected_version,
            ride,
        } => {
            let mut values = ride_values(ride, expected_version + 1)?;
            values.push(Value::Integer(*expected_version));
            let changed = conn
                .execute(UPDATE_RIDE_SQL, params_from_iter(values))
                .map_err(backend)?;
            if changed == 0 {
                let exists: Option<i64> = conn
                    .query_row(
                        "SELECT version FROM rides WHERE id = ?1",
                        params![ride.id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(backend)?;
                return Err(match exists {
                    Some(current) => {
                        tracing::debug!(
                            ride_id = %ride.id,
                            expected_version,
                            current_version = current,
                            "conditional ride write matched no row"
                        );
                        StorageError::ConcurrentConflict {
                            ride_id: ride.id.clone(),
                            expected_version: *expected_version,
                        }
                    }
                    None => StorageError::RideNotFound {
                        ride_id: ride.id.clone(),
                    },
                });
            }
        }
        PendingOp::AppendHistory(entry) => {
            let actor_json = serde_json::to_string(&entry.actor).map_err(backend)?;
            conn.execute(
                "INSERT INTO ride_status_history(
                    id, ride_id, from_status, status, version, actor_json, recorded_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id,
                    entry.ride_id,
                    entry.from_status.as_str(),
                    entry.status.as_str(),
                    entry.version,
                    actor_json,
                    format_time(entry.recorded_at)?,
                ],
            )
            .map_err(|e| duplicate_or_backend(e, &entry.id))?;
        }
        PendingOp::AppendAdminAction(action) => {
            conn.execute(
                "INSERT INTO admin_actions(
                    id, ride_id, admin_id, kind, reason, old_value, new_value, recorded_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    action.id,
                    action.ride_id,
                    action.admin_id,
                    action.kind.as_str(),
                    action.reason,
                    action.old_value,
                    action.new_value,
                    format_time(action.recorded_at)?,
                ],
            )
            .map_err(|e| duplicate_or_backend(e, &action.id))?;
        }
    }
    Ok(())
}

fn duplicate_or_backend(err: rusqlite::Error, id: &str) -> StorageError {
    if is_constraint_violation(&err) {
        StorageError::DuplicateRecord { id: id.to_string() }
    } else {
        backend(err)
    }
}

#[async_trait]
impl RideStorage for SqliteRideStorage {
    type Snapshot = SqliteSnapshot;

    async fn begin_snapshot(&self) -> Result<SqliteSnapshot, StorageError> {
        Ok(SqliteSnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(backend)?;
        for op in &snapshot.ops {
            apply(&tx, op)?;
        }
        tx.commit().map_err(backend)
    }

    async fn abort_snapshot(&self, _snapshot: SqliteSnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_ride(
        &self,
        snapshot: &mut SqliteSnapshot,
        ride: Ride,
    ) -> Result<(), StorageError> {
        if snapshot.ride_versions.contains_key(&ride.id)
            || self.committed_version(&ride.id)?.is_some()
        {
            return Err(StorageError::RideAlreadyExists { ride_id: ride.id });
        }
        snapshot.ride_versions.insert(ride.id.clone(), ride.version);
        snapshot.ops.push(PendingOp::InsertRide(ride));
        Ok(())
    }

    async fn upsert_driver(
        &self,
        snapshot: &mut SqliteSnapshot,
        driver: DriverProfile,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::UpsertDriver(driver));
        Ok(())
    }

    async fn update_ride(
        &self,
        snapshot: &mut SqliteSnapshot,
        expected_version: i64,
        ride: &Ride,
    ) -> Result<i64, StorageError> {
        let current = match snapshot.ride_versions.get(&ride.id) {
            Some(v) => *v,
            None => self
                .committed_version(&ride.id)?
                .ok_or_else(|| StorageError::RideNotFound {
                    ride_id: ride.id.clone(),
                })?,
        };
        if current != expected_version {
            return Err(StorageError::ConcurrentConflict {
                ride_id: ride.id.clone(),
                expected_version,
            });
        }
        let next = expected_version + 1;
        snapshot.ride_versions.insert(ride.id.clone(), next);
        snapshot.ops.push(PendingOp::UpdateRide {
            expected_version,
            ride: ride.clone(),
        });
        Ok(next)
    }

    async fn append_status_history(
        &self,
        snapshot: &mut SqliteSnapshot,
        entry: StatusHistoryEntry,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::AppendHistory(entry));
        Ok(())
    }

    async fn append_admin_action(
        &self,
        snapshot: &mut SqliteSnapshot,
        action: AdminAction,
    ) -> Result<(), StorageError> {
        snapshot.ops.push(PendingOp::AppendAdminAction(action));
        Ok(())
    }

    async fn get_ride(&self, ride_id: &str) -> Result<Ride, StorageError> {
        self.conn()?
            .query_row(
                &format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = ?1"),
                params![ride_id],
                parse_ride_row,
            )
            .optional()
            .map_err(backend)?
            .ok_or_else(|| StorageError::RideNotFound {
                ride_id: ride_id.to_string(),
            })
    }

    async fn get_driver(&self, driver_id: &str) -> Result<DriverProfile, StorageError> {
        self.conn()?
            .query_row(
                &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?1"),
                params![driver_id],
                parse_driver_row,
            )
            .optional()
            .map_err(backend)?
            .ok_or_else(|| StorageError::DriverNotFound {
                driver_id: driver_id.to_string(),
            })
    }

    async fn list_rides(
        &self,
        status_filter: Option<RideStatus>,
    ) -> Result<Vec<Ride>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RIDE_COLUMNS} FROM rides
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY id ASC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![status_filter.map(RideStatus::as_str)], parse_ride_row)
            .map_err(backend)?;
        collect_rows(rows)
    }

    async fn list_status_history(
        &self,
        ride_id: &str,
    ) -> Result<Vec<StatusHistoryEntry>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {HISTORY_COLUMNS} FROM ride_status_history
                 WHERE ride_id = ?1
                 ORDER BY seq ASC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![ride_id], parse_history_row)
            .map_err(backend)?;
        collect_rows(rows)
    }

    async fn list_admin_actions(
        &self,
        query: &AdminActionQuery,
    ) -> Result<Vec<AdminAction>, StorageError> {
        // Identity filters run in SQL; the time window is applied on parsed
        // timestamps, since RFC 3339 text does not sort by instant.
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ADMIN_ACTION_COLUMNS} FROM admin_actions
                 WHERE (?1 IS NULL OR ride_id = ?1)
                   AND (?2 IS NULL OR admin_id = ?2)
                 ORDER BY seq ASC"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(
                params![query.ride_id, query.admin_id],
                parse_admin_action_row,
            )
            .map_err(backend)?;
        let matching = collect_rows(rows)?
            .into_iter()
            .filter(|a| query.matches(a));
        Ok(if query.limit > 0 {
            matching.take(query.limit).collect()
        } else {
            matching.collect()
        })
    }
}
