//! Dataset upsert and lookup.

use rusqlite::{Connection, OptionalExtension as _, params};
use russtat_core::{
  key::DimensionId,
  release::DatasetFields,
  store::DatasetId,
};

use crate::encode::{RawDataset, encode_dt};

/// Dimension ids a dataset row points at.
#[derive(Debug, Clone, Copy)]
pub struct DatasetRefs {
  pub agency:     DimensionId,
  pub department: Option<DimensionId>,
  pub classifier: Option<DimensionId>,
  pub unit:       Option<DimensionId>,
  pub period:     Option<DimensionId>,
  pub code:       Option<DimensionId>,
}

/// Insert the dataset, or replace every attribute of the existing row with
/// the same external id. The id is kept, so existing observations stay
/// attached.
pub fn upsert(
  conn: &Connection,
  external_id: &str,
  fields: &DatasetFields,
  refs: &DatasetRefs,
) -> rusqlite::Result<DatasetId> {
  let id = |v: Option<DimensionId>| v.map(|d| d.0);
  conn
    .prepare_cached(
      "INSERT INTO datasets (
         external_id, full_name, description,
         agency_id, department_id, classifier_id, unit_id, period_id, code_id,
         preparer_name, preparer_contact, range_start, range_end, release_schedule,
         prepared_at, updated_at, next_update_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
       ON CONFLICT (external_id) DO UPDATE SET
         full_name        = excluded.full_name,
         description      = excluded.description,
         agency_id        = excluded.agency_id,
         department_id    = excluded.department_id,
         classifier_id    = excluded.classifier_id,
         unit_id          = excluded.unit_id,
         period_id        = excluded.period_id,
         code_id          = excluded.code_id,
         preparer_name    = excluded.preparer_name,
         preparer_contact = excluded.preparer_contact,
         range_start      = excluded.range_start,
         range_end        = excluded.range_end,
         release_schedule = excluded.release_schedule,
         prepared_at      = excluded.prepared_at,
         updated_at       = excluded.updated_at,
         next_update_at   = excluded.next_update_at
       RETURNING id",
    )?
    .query_row(
      params![
        external_id,
        fields.full_name,
        fields.description,
        refs.agency.0,
        id(refs.department),
        id(refs.classifier),
        id(refs.unit),
        id(refs.period),
        id(refs.code),
        fields.preparer_name,
        fields.preparer_contact,
        fields.range_start,
        fields.range_end,
        fields.release_schedule,
        encode_dt(fields.prepared_at),
        encode_dt(fields.updated_at),
        fields.next_update_at.map(encode_dt),
      ],
      |r| r.get(0).map(DatasetId),
    )
}

pub fn fetch(conn: &Connection, external_id: &str) -> rusqlite::Result<Option<RawDataset>> {
  conn
    .prepare_cached(&format!(
      "SELECT {} FROM datasets WHERE external_id = ?1",
      RawDataset::COLUMNS
    ))?
    .query_row(params![external_id.trim()], RawDataset::from_row)
    .optional()
}

pub fn exists(conn: &Connection, external_id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .prepare_cached("SELECT 1 FROM datasets WHERE external_id = ?1")?
      .query_row(params![external_id.trim()], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}
