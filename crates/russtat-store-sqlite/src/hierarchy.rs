//! Classifier hierarchy rebuild.
//!
//! Links every pending classifier to the classifier whose path is its own
//! minus the last segment. Runs to a fix point, bounded by the deepest
//! pending path, so the result does not depend on the order in which paths
//! were first seen. Rows that are already linked or confirmed roots are never
//! touched again.

use rusqlite::{Connection, OptionalExtension as _, params};
use russtat_core::{
  classifier::{depth, parent_path},
  key::normalize,
  store::HierarchyReport,
};
use tracing::debug;

use crate::encode::{STATE_CHILD, STATE_ROOT};

const PENDING: &str = "(parent_state = 'unresolved' OR (parent_state = 'child' AND parent_id IS NULL))";

pub fn rebuild(conn: &Connection) -> rusqlite::Result<HierarchyReport> {
  let mut report = HierarchyReport::default();

  let mut pending = pending_rows(conn)?;
  let limit = pending.iter().map(|(_, path)| depth(path)).max().unwrap_or(0) + 1;

  while !pending.is_empty() && report.passes < limit {
    report.passes += 1;
    let mut changed = 0;

    for (id, path) in &pending {
      match parent_path(path) {
        None => {
          let n = mark_root(conn, *id)?;
          changed += n;
          report.roots += n;
        }
        Some(parent) => {
          let Some(parent_id) = find(conn, &normalize(parent))? else { continue };
          let n = link(conn, *id, parent_id)?;
          changed += n;
          report.resolved += n;
        }
      }
    }

    debug!(pass = report.passes, changed, "classifier hierarchy pass");
    if changed == 0 {
      break;
    }
    pending = pending_rows(conn)?;
  }

  report.pending = pending_rows(conn)?.len();
  Ok(report)
}

fn pending_rows(conn: &Connection) -> rusqlite::Result<Vec<(i64, String)>> {
  let mut stmt =
    conn.prepare_cached(&format!("SELECT id, name FROM classifiers WHERE {PENDING} ORDER BY id"))?;
  let rows = stmt
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect();
  rows
}

fn find(conn: &Connection, name_key: &str) -> rusqlite::Result<Option<i64>> {
  conn
    .prepare_cached("SELECT id FROM classifiers WHERE name_key = ?1")?
    .query_row(params![name_key], |r| r.get(0))
    .optional()
}

fn mark_root(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
  conn
    .prepare_cached(&format!(
      "UPDATE classifiers SET parent_state = ?2, parent_id = NULL WHERE id = ?1 AND {PENDING}"
    ))?
    .execute(params![id, STATE_ROOT])
}

fn link(conn: &Connection, id: i64, parent_id: i64) -> rusqlite::Result<usize> {
  conn
    .prepare_cached(&format!(
      "UPDATE classifiers SET parent_state = ?2, parent_id = ?3 WHERE id = ?1 AND {PENDING}"
    ))?
    .execute(params![id, STATE_CHILD, parent_id])
}
