//! Natural key → surrogate id resolution.
//!
//! Every dimension is created on first sighting and updated in place after
//! that: each insert is an `ON CONFLICT … DO UPDATE` against the table's
//! natural-key constraint, so two writers racing on the same new key end up
//! with one row and both read back its id.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension as _, params};
use russtat_core::{
  classifier::{ParentState, parent_path},
  key::{DimensionId, DimensionKey, NaturalKey},
};

use crate::{encode::encode_parent_state, schema::table};

/// Resolves dimension keys inside one transaction, remembering what it has
/// already seen so a release touching the same unit a thousand times costs
/// one upsert.
pub struct Resolver<'c> {
  conn:  &'c Connection,
  cache: HashMap<DimensionKey, DimensionId>,
}

impl<'c> Resolver<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn, cache: HashMap::new() } }

  pub fn resolve(&mut self, key: &DimensionKey) -> rusqlite::Result<DimensionId> {
    if let Some(id) = self.cache.get(key) {
      return Ok(*id);
    }
    let id = match key {
      DimensionKey::Agency { name, external_id } => self.agency(name, external_id.as_deref())?,
      DimensionKey::Department { agency, name } => {
        let agency_id = self.resolve(&DimensionKey::Agency {
          name:        agency.clone(),
          external_id: None,
        })?;
        self.department(agency_id, name)?
      }
      DimensionKey::Classifier { path, external_id } => {
        self.classifier(path, external_id.as_deref())?
      }
      DimensionKey::Unit(name) | DimensionKey::Period(name) | DimensionKey::Code(name) => {
        self.named(table(key.dimension()), name)?
      }
      DimensionKey::CodeValue { code, external_id, name } => {
        let code_id = self.resolve(&DimensionKey::Code(code.clone()))?;
        match external_id {
          Some(ext) => self.keyed_code_value(code_id, ext, name)?,
          None => self.unkeyed_code_value(code_id, name)?,
        }
      }
    };
    self.cache.insert(key.clone(), id);
    Ok(id)
  }

  fn agency(&self, name: &NaturalKey, external_id: Option<&str>) -> rusqlite::Result<DimensionId> {
    self
      .conn
      .prepare_cached(
        "INSERT INTO agencies (external_id, name, name_key) VALUES (?1, ?2, ?3)
         ON CONFLICT (name_key) DO UPDATE SET
           name        = excluded.name,
           external_id = COALESCE(excluded.external_id, agencies.external_id)
         RETURNING id",
      )?
      .query_row(params![external_id, name.display(), name.normalized()], |r| {
        r.get(0).map(DimensionId)
      })
  }

  fn department(&self, agency_id: DimensionId, name: &NaturalKey) -> rusqlite::Result<DimensionId> {
    self
      .conn
      .prepare_cached(
        "INSERT INTO departments (agency_id, name, name_key) VALUES (?1, ?2, ?3)
         ON CONFLICT (agency_id, name_key) DO UPDATE SET name = excluded.name
         RETURNING id",
      )?
      .query_row(params![agency_id.0, name.display(), name.normalized()], |r| {
        r.get(0).map(DimensionId)
      })
  }

  /// New classifiers start as roots when their path has no parent segment
  /// and as unresolved otherwise; an existing row keeps its link.
  fn classifier(&self, path: &NaturalKey, external_id: Option<&str>) -> rusqlite::Result<DimensionId> {
    let initial = match parent_path(path.display()) {
      Some(_) => ParentState::Unresolved,
      None => ParentState::Root,
    };
    let (state, _) = encode_parent_state(initial);
    self
      .conn
      .prepare_cached(
        "INSERT INTO classifiers (external_id, name, name_key, parent_state)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (name_key) DO UPDATE SET
           name        = excluded.name,
           external_id = COALESCE(excluded.external_id, classifiers.external_id)
         RETURNING id",
      )?
      .query_row(params![external_id, path.display(), path.normalized(), state], |r| {
        r.get(0).map(DimensionId)
      })
  }

  /// Units, periods and codes: a bare name.
  fn named(&self, table: &str, name: &NaturalKey) -> rusqlite::Result<DimensionId> {
    self
      .conn
      .prepare_cached(&format!(
        "INSERT INTO {table} (name, name_key) VALUES (?1, ?2)
         ON CONFLICT (name_key) DO UPDATE SET name = excluded.name
         RETURNING id"
      ))?
      .query_row(params![name.display(), name.normalized()], |r| r.get(0).map(DimensionId))
  }

  fn keyed_code_value(
    &self,
    code_id: DimensionId,
    external_id: &str,
    name: &NaturalKey,
  ) -> rusqlite::Result<DimensionId> {
    self
      .conn
      .prepare_cached(
        "INSERT INTO code_values (code_id, external_id, name, name_key) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (code_id, external_id) DO UPDATE SET
           name     = excluded.name,
           name_key = excluded.name_key
         RETURNING id",
      )?
      .query_row(params![code_id.0, external_id, name.display(), name.normalized()], |r| {
        r.get(0).map(DimensionId)
      })
  }

  /// A value without an external id matches any value of the code with the
  /// same name, keyed or not; only if none exists is an unkeyed row created.
  fn unkeyed_code_value(&self, code_id: DimensionId, name: &NaturalKey) -> rusqlite::Result<DimensionId> {
    let existing = self
      .conn
      .prepare_cached(
        "SELECT id FROM code_values WHERE code_id = ?1 AND name_key = ?2
         ORDER BY external_id IS NULL, id LIMIT 1",
      )?
      .query_row(params![code_id.0, name.normalized()], |r| r.get(0).map(DimensionId))
      .optional()?;
    if let Some(id) = existing {
      return Ok(id);
    }

    self
      .conn
      .prepare_cached(
        "INSERT INTO code_values (code_id, external_id, name, name_key) VALUES (?1, NULL, ?2, ?3)
         ON CONFLICT (code_id, name_key) WHERE external_id IS NULL DO UPDATE SET
           name = excluded.name
         RETURNING id",
      )?
      .query_row(params![code_id.0, name.display(), name.normalized()], |r| {
        r.get(0).map(DimensionId)
      })
  }
}
