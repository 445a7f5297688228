//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS[.fff]` text, which sorts
//! chronologically and is understood by SQLite's date functions. The
//! classifier parent state is split across a `parent_state` tag column and a
//! nullable `parent_id`.

use chrono::NaiveDateTime;
use russtat_core::{
  classifier::{Classifier, ParentState},
  key::DimensionId,
  store::{Dataset, DatasetId},
};

use crate::{Error, Result};

// ─── NaiveDateTime ───────────────────────────────────────────────────────────

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn encode_dt(dt: NaiveDateTime) -> String { dt.format(DT_FORMAT).to_string() }

pub fn decode_dt(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DT_FORMAT).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── ParentState ─────────────────────────────────────────────────────────────

pub const STATE_UNRESOLVED: &str = "unresolved";
pub const STATE_ROOT: &str = "root";
pub const STATE_CHILD: &str = "child";

pub fn encode_parent_state(state: ParentState) -> (&'static str, Option<i64>) {
  match state {
    ParentState::Unresolved => (STATE_UNRESOLVED, None),
    ParentState::Root => (STATE_ROOT, None),
    ParentState::Child(id) => (STATE_CHILD, Some(id.0)),
  }
}

/// A `child` row whose parent was deleted reads back as unresolved, so the
/// next rebuild can relink it.
pub fn decode_parent_state(state: &str, parent_id: Option<i64>) -> Result<ParentState> {
  match (state, parent_id) {
    (STATE_UNRESOLVED, _) => Ok(ParentState::Unresolved),
    (STATE_ROOT, _) => Ok(ParentState::Root),
    (STATE_CHILD, Some(id)) => Ok(ParentState::Child(DimensionId(id))),
    (STATE_CHILD, None) => Ok(ParentState::Unresolved),
    (other, _) => Err(Error::UnknownParentState(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `classifiers` row.
pub struct RawClassifier {
  pub id:           i64,
  pub external_id:  Option<String>,
  pub name:         String,
  pub parent_state: String,
  pub parent_id:    Option<i64>,
}

impl RawClassifier {
  pub const COLUMNS: &'static str = "id, external_id, name, parent_state, parent_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      external_id:  row.get(1)?,
      name:         row.get(2)?,
      parent_state: row.get(3)?,
      parent_id:    row.get(4)?,
    })
  }

  pub fn into_classifier(self) -> Result<Classifier> {
    Ok(Classifier {
      id:          DimensionId(self.id),
      external_id: self.external_id,
      path:        self.name,
      parent:      decode_parent_state(&self.parent_state, self.parent_id)?,
    })
  }
}

/// Raw values read directly from a `datasets` row.
pub struct RawDataset {
  pub id:               i64,
  pub external_id:      String,
  pub full_name:        String,
  pub description:      String,
  pub agency_id:        Option<i64>,
  pub department_id:    Option<i64>,
  pub classifier_id:    Option<i64>,
  pub unit_id:          Option<i64>,
  pub period_id:        Option<i64>,
  pub code_id:          Option<i64>,
  pub preparer_name:    String,
  pub preparer_contact: String,
  pub range_start:      Option<i32>,
  pub range_end:        Option<i32>,
  pub release_schedule: String,
  pub prepared_at:      String,
  pub updated_at:       String,
  pub next_update_at:   Option<String>,
}

impl RawDataset {
  pub const COLUMNS: &'static str = "id, external_id, full_name, description,
    agency_id, department_id, classifier_id, unit_id, period_id, code_id,
    preparer_name, preparer_contact, range_start, range_end, release_schedule,
    prepared_at, updated_at, next_update_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      external_id:      row.get(1)?,
      full_name:        row.get(2)?,
      description:      row.get(3)?,
      agency_id:        row.get(4)?,
      department_id:    row.get(5)?,
      classifier_id:    row.get(6)?,
      unit_id:          row.get(7)?,
      period_id:        row.get(8)?,
      code_id:          row.get(9)?,
      preparer_name:    row.get(10)?,
      preparer_contact: row.get(11)?,
      range_start:      row.get(12)?,
      range_end:        row.get(13)?,
      release_schedule: row.get(14)?,
      prepared_at:      row.get(15)?,
      updated_at:       row.get(16)?,
      next_update_at:   row.get(17)?,
    })
  }

  pub fn into_dataset(self) -> Result<Dataset> {
    let id = |v: Option<i64>| v.map(DimensionId);
    Ok(Dataset {
      id:               DatasetId(self.id),
      external_id:      self.external_id,
      full_name:        self.full_name,
      description:      self.description,
      agency_id:        id(self.agency_id),
      department_id:    id(self.department_id),
      classifier_id:    id(self.classifier_id),
      unit_id:          id(self.unit_id),
      period_id:        id(self.period_id),
      code_id:          id(self.code_id),
      preparer_name:    self.preparer_name,
      preparer_contact: self.preparer_contact,
      range_start:      self.range_start,
      range_end:        self.range_end,
      release_schedule: self.release_schedule,
      prepared_at:      decode_dt(&self.prepared_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
      next_update_at:   self.next_update_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
