//! Observation loading.
//!
//! An observation is identified by all of its attributes: re-ingesting a
//! release is a no-op, and a corrected value becomes a new row next to the
//! old one rather than replacing it.

use rusqlite::{Connection, OptionalExtension as _, params};
use russtat_core::{
  key::DimensionId,
  store::{DatasetId, ObservationId},
};

/// An observation with its dimensions already resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRow {
  pub code_value: Option<DimensionId>,
  pub unit:       Option<DimensionId>,
  pub period:     Option<DimensionId>,
  pub year:       i32,
  pub value:      f64,
}

/// Insert every row not yet stored.
///
/// Returns how many rows are new and the id of the last row, whether it was
/// inserted or already present.
pub fn load(
  conn: &Connection,
  dataset: DatasetId,
  rows: &[ResolvedRow],
) -> rusqlite::Result<(u64, Option<ObservationId>)> {
  let before = count(conn, dataset)?;

  let mut insert = conn.prepare_cached(
    "INSERT INTO observations (dataset_id, code_value_id, unit_id, period_id, year, value)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT DO NOTHING
     RETURNING id",
  )?;
  let mut existing = conn.prepare_cached(
    "SELECT id FROM observations
     WHERE dataset_id = ?1 AND code_value_id IS ?2 AND unit_id IS ?3 AND period_id IS ?4
       AND year = ?5 AND value = ?6",
  )?;

  let mut last = None;
  for row in rows {
    let (code_value, unit, period) =
      (row.code_value.map(|d| d.0), row.unit.map(|d| d.0), row.period.map(|d| d.0));
    let values = params![dataset.0, code_value, unit, period, row.year, row.value];
    let id = match insert.query_row(values, |r| r.get(0)).optional()? {
      Some(id) => id,
      None => existing.query_row(values, |r| r.get(0))?,
    };
    last = Some(ObservationId(id));
  }

  let added = count(conn, dataset)? - before;
  Ok((added, last))
}

fn count(conn: &Connection, dataset: DatasetId) -> rusqlite::Result<u64> {
  conn
    .prepare_cached("SELECT COUNT(*) FROM observations WHERE dataset_id = ?1")?
    .query_row(params![dataset.0], |r| r.get::<_, i64>(0))
    .map(|n| n as u64)
}
