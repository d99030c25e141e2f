//! SQL schema for the RFP SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Opportunities are insert-only; a re-run of an evaluation adds a new row.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS opportunities (
    opportunity_id   TEXT PRIMARY KEY,
    entity_id        TEXT NOT NULL,
    entity_name      TEXT,
    category         TEXT NOT NULL,
    final_confidence REAL NOT NULL,
    decision         TEXT NOT NULL,   -- 'ACCEPT' | 'WEAK_ACCEPT'
    actionable       INTEGER NOT NULL,
    priority_tier    TEXT NOT NULL,   -- 'TIER_1' .. 'TIER_4'
    fit_score        INTEGER NOT NULL CHECK (fit_score BETWEEN 0 AND 100),
    primary_reason   TEXT NOT NULL,
    urgency          TEXT NOT NULL,
    created_at       TEXT NOT NULL    -- RFC 3339 UTC, nanosecond precision
);

-- Rebuilt wholesale by the nightly prior job. Cluster rows leave entity_id
-- empty; the global row leaves both key columns empty.
CREATE TABLE IF NOT EXISTS temporal_priors (
    level        TEXT NOT NULL,       -- 'exact' | 'cluster' | 'global'
    entity_id    TEXT NOT NULL DEFAULT '',
    category     TEXT NOT NULL DEFAULT '',
    multiplier   REAL NOT NULL,
    seasonality  REAL NOT NULL,
    recurrence   REAL NOT NULL,
    momentum     REAL NOT NULL,
    sample_count INTEGER NOT NULL,
    computed_at  TEXT NOT NULL,
    PRIMARY KEY (level, entity_id, category)
);

CREATE TABLE IF NOT EXISTS episodes (
    entity_id   TEXT NOT NULL,
    category    TEXT NOT NULL,
    observed_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, category, observed_at)
);

CREATE TABLE IF NOT EXISTS alerts (
    alert_id       TEXT PRIMARY KEY,
    opportunity_id TEXT NOT NULL REFERENCES opportunities(opportunity_id),
    entity_id      TEXT NOT NULL,
    tier           TEXT NOT NULL,
    channel        TEXT NOT NULL,     -- 'email' | 'webhook' | 'slack' | 'dashboard'
    sla            TEXT NOT NULL,
    due_at         TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    delivered_at   TEXT
);

CREATE INDEX IF NOT EXISTS opportunities_entity_idx  ON opportunities(entity_id);
CREATE INDEX IF NOT EXISTS opportunities_created_idx ON opportunities(created_at);
CREATE INDEX IF NOT EXISTS alerts_pending_idx        ON alerts(delivered_at, due_at);

PRAGMA user_version = 1;
";
