pub(crate) const SCHEMA_VERSION: i64 = 1;

pub(crate) const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS rides (
  id TEXT PRIMARY KEY,
  status TEXT NOT NULL CHECK (
    status IN (
      'requested',
      'accepted',
      'arrived',
      'started',
      'completed',
      'paid',
      'cancelled_by_user',
      'cancelled_by_driver',
      'cancelled_by_admin'
    )
  ),
  passenger_id TEXT NOT NULL,
  driver_id TEXT,
  community_id TEXT,
  allow_external_drivers INTEGER NOT NULL DEFAULT 0 CHECK (allow_external_drivers IN (0, 1)),
  price TEXT NOT NULL,
  platform_fee TEXT,
  driver_amount TEXT,
  offer_sent_at TEXT,
  accepted_at TEXT,
  accept_time_seconds INTEGER,
  has_bonus INTEGER CHECK (has_bonus IN (0, 1) OR has_bonus IS NULL),
  ab_group TEXT CHECK (ab_group IN ('A', 'B') OR ab_group IS NULL),
  bonus_amount TEXT,
  cancel_reason TEXT,
  cancelled_by TEXT,
  cancelled_at TEXT,
  forced_completed_by TEXT,
  forced_completed_at TEXT,
  version INTEGER NOT NULL CHECK (version >= 0),
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rides_status ON rides(status, id);

CREATE TABLE IF NOT EXISTS drivers (
  id TEXT PRIMARY KEY,
  status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
  banned INTEGER NOT NULL DEFAULT 0 CHECK (banned IN (0, 1)),
  deleted_at TEXT,
  suspended_until TEXT,
  community_id TEXT
);

CREATE TABLE IF NOT EXISTS ride_status_history (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  ride_id TEXT NOT NULL,
  from_status TEXT NOT NULL,
  status TEXT NOT NULL,
  version INTEGER NOT NULL,
  actor_json TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_status_history_ride_seq
  ON ride_status_history(ride_id, seq);

CREATE TRIGGER IF NOT EXISTS trg_status_history_no_update
BEFORE UPDATE ON ride_status_history
BEGIN
  SELECT RAISE(FAIL, 'ride_status_history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_status_history_no_delete
BEFORE DELETE ON ride_status_history
BEGIN
  SELECT RAISE(FAIL, 'ride_status_history is append-only');
END;

CREATE TABLE IF NOT EXISTS admin_actions (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  ride_id TEXT NOT NULL,
  admin_id TEXT NOT NULL,
  kind TEXT NOT NULL CHECK (
    kind IN ('cancel', 'reassign_driver', 'force_complete', 'status_update')
  ),
  reason TEXT NOT NULL,
  old_value TEXT,
  new_value TEXT,
  recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_admin_actions_ride_seq ON admin_actions(ride_id, seq);
CREATE INDEX IF NOT EXISTS idx_admin_actions_admin_seq ON admin_actions(admin_id, seq);

CREATE TRIGGER IF NOT EXISTS trg_admin_actions_no_update
BEFORE UPDATE ON admin_actions
BEGIN
  SELECT RAISE(FAIL, 'admin_actions is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_admin_actions_no_delete
BEFORE DELETE ON admin_actions
BEGIN
  SELECT RAISE(FAIL, 'admin_actions is append-only');
END;
";
