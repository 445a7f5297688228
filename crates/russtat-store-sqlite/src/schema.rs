//! SQL schema for the Russtat SQLite store.
//!
//! Executed once at connection startup. The version is recorded in
//! `PRAGMA user_version`; future migrations will be gated on that number and
//! must keep every natural-key uniqueness constraint below intact, since the
//! upserts target them.

use russtat_core::key::Dimension;

/// Full schema DDL; idempotent thanks to `CREATE … IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Dimension tables. `name_key` is the trimmed, lowercased natural key and
-- the conflict target of every upsert; `name` keeps the latest display text.

CREATE TABLE IF NOT EXISTS agencies (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS departments (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    agency_id INTEGER REFERENCES agencies(id) ON DELETE SET NULL,
    name      TEXT NOT NULL,
    name_key  TEXT NOT NULL,
    UNIQUE (agency_id, name_key)
);

CREATE TABLE IF NOT EXISTS classifiers (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id  TEXT,
    name         TEXT NOT NULL,   -- full path, levels separated by '/'
    name_key     TEXT NOT NULL UNIQUE,
    parent_state TEXT NOT NULL DEFAULT 'unresolved',
    parent_id    INTEGER REFERENCES classifiers(id) ON DELETE SET NULL,
    CHECK (parent_state IN ('unresolved', 'root', 'child'))
);

CREATE TABLE IF NOT EXISTS units (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS periods (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS codes (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    name     TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS code_values (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    code_id     INTEGER NOT NULL REFERENCES codes(id) ON DELETE CASCADE,
    external_id TEXT,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL,
    UNIQUE (code_id, external_id)
);

-- Values published without an external id are keyed by display name.
CREATE UNIQUE INDEX IF NOT EXISTS code_values_unkeyed_idx
    ON code_values(code_id, name_key) WHERE external_id IS NULL;
CREATE INDEX IF NOT EXISTS code_values_name_idx ON code_values(code_id, name_key);

-- Datasets, keyed by the external id shared by all releases of a dataset.
CREATE TABLE IF NOT EXISTS datasets (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id      TEXT NOT NULL UNIQUE,
    full_name        TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    agency_id        INTEGER REFERENCES agencies(id)    ON DELETE SET NULL,
    department_id    INTEGER REFERENCES departments(id) ON DELETE SET NULL,
    classifier_id    INTEGER REFERENCES classifiers(id) ON DELETE SET NULL,
    unit_id          INTEGER REFERENCES units(id)       ON DELETE SET NULL,
    period_id        INTEGER REFERENCES periods(id)     ON DELETE SET NULL,
    code_id          INTEGER REFERENCES codes(id)       ON DELETE SET NULL,
    preparer_name    TEXT NOT NULL DEFAULT '',
    preparer_contact TEXT NOT NULL DEFAULT '',
    range_start      INTEGER,
    range_end        INTEGER,
    release_schedule TEXT NOT NULL DEFAULT '',
    prepared_at      TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    next_update_at   TEXT
);

-- Facts die with their dataset; other references degrade to NULL.
CREATE TABLE IF NOT EXISTS observations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_id    INTEGER NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    code_value_id INTEGER REFERENCES code_values(id) ON DELETE SET NULL,
    unit_id       INTEGER REFERENCES units(id)       ON DELETE SET NULL,
    period_id     INTEGER REFERENCES periods(id)     ON DELETE SET NULL,
    year          INTEGER NOT NULL,
    value         REAL NOT NULL
);

-- Absent references compare equal, so a row without a unit is still unique.
CREATE UNIQUE INDEX IF NOT EXISTS observations_key_idx ON observations(
    dataset_id,
    IFNULL(code_value_id, 0),
    IFNULL(unit_id, 0),
    IFNULL(period_id, 0),
    year,
    value
);

CREATE INDEX IF NOT EXISTS classifiers_state_idx ON classifiers(parent_state);
CREATE INDEX IF NOT EXISTS datasets_classifier_idx ON datasets(classifier_id);

PRAGMA user_version = 1;
";

/// Table holding rows of `dimension`.
pub const fn table(dimension: Dimension) -> &'static str {
  match dimension {
    Dimension::Agency => "agencies",
    Dimension::Department => "departments",
    Dimension::Classifier => "classifiers",
    Dimension::Unit => "units",
    Dimension::Period => "periods",
    Dimension::Code => "codes",
    Dimension::CodeValue => "code_values",
  }
}

/// Tables cleared by every reset, children before parents.
pub const FACT_TABLES: [&str; 4] = ["observations", "datasets", "code_values", "codes"];

/// Additional tables cleared by a full reset, children before parents.
pub const REFERENCE_TABLES: [&str; 5] =
  ["classifiers", "departments", "agencies", "units", "periods"];
