//! The `Warehouse` trait and supporting result types.
//!
//! The trait is implemented by storage backends (e.g. `russtat-store-sqlite`).
//! Callers such as a parallel release fetcher depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
  classifier::Classifier,
  key::{DimensionId, DimensionKey},
  release::Release,
  timestamp::TimestampFormat,
};

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Internal surrogate id of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub i64);

/// Internal surrogate id of an observation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(pub i64);

// ─── Results ─────────────────────────────────────────────────────────────────

/// What one successful ingestion did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
  /// Observation rows that did not exist before this batch.
  pub added:               u64,
  /// The last observation row inserted or matched; `None` for a release
  /// without data rows.
  pub last_observation_id: Option<ObservationId>,
  pub dataset_id:          DatasetId,
}

/// What one hierarchy rebuild did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyReport {
  /// Passes run until nothing changed.
  pub passes:   usize,
  /// Rows linked to a parent.
  pub resolved: usize,
  /// Rows confirmed as roots.
  pub roots:    usize,
  /// Rows still waiting for their parent path to appear.
  pub pending:  usize,
}

/// Which tables [`Warehouse::reset`] clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetScope {
  /// Also clear agencies, departments, classifiers, units and periods.
  /// Observations, datasets, codes and code values are always cleared.
  pub full:        bool,
  /// Restart the surrogate id counters of the cleared tables.
  pub restart_ids: bool,
}

/// Rows removed per table by a reset, in deletion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
  pub removed: Vec<(String, u64)>,
}

impl ResetReport {
  pub fn removed_from(&self, table: &str) -> u64 {
    self
      .removed
      .iter()
      .find(|(t, _)| t == table)
      .map_or(0, |(_, n)| *n)
  }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
  pub agencies:     u64,
  pub departments:  u64,
  pub classifiers:  u64,
  pub units:        u64,
  pub periods:      u64,
  pub codes:        u64,
  pub code_values:  u64,
  pub datasets:     u64,
  pub observations: u64,
}

/// A stored dataset row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
  pub id:               DatasetId,
  pub external_id:      String,
  pub full_name:        String,
  pub description:      String,
  pub agency_id:        Option<DimensionId>,
  pub department_id:    Option<DimensionId>,
  pub classifier_id:    Option<DimensionId>,
  pub unit_id:          Option<DimensionId>,
  pub period_id:        Option<DimensionId>,
  pub code_id:          Option<DimensionId>,
  pub preparer_name:    String,
  pub preparer_contact: String,
  pub range_start:      Option<i32>,
  pub range_end:        Option<i32>,
  pub release_schedule: String,
  pub prepared_at:      NaiveDateTime,
  pub updated_at:       NaiveDateTime,
  pub next_update_at:   Option<NaiveDateTime>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a warehouse backend.
///
/// Every write operation is atomic: it either commits completely or leaves
/// the warehouse untouched. Dimension rows are only ever created or updated
/// in place by ingestion; [`Warehouse::reset`] is the only way to delete
/// them.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Merge one release: resolve its dimensions, rebuild the classifier
  /// hierarchy, upsert the dataset and load its observations, all in one
  /// atomic batch.
  fn ingest<'a>(
    &'a self,
    release: &'a Release,
    format: &'a TimestampFormat,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + 'a;

  /// Resolve (creating on first sighting) one dimension row by natural key.
  fn resolve(
    &self,
    key: DimensionKey,
  ) -> impl Future<Output = Result<DimensionId, Self::Error>> + Send + '_;

  /// Link unresolved classifiers to their parents. Idempotent.
  fn rebuild_hierarchy(
    &self,
  ) -> impl Future<Output = Result<HierarchyReport, Self::Error>> + Send + '_;

  /// Administrative reset; never part of normal ingestion.
  fn reset(
    &self,
    scope: ResetScope,
  ) -> impl Future<Output = Result<ResetReport, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The stored dataset with this external id, if any.
  fn dataset<'a>(
    &'a self,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Dataset>, Self::Error>> + Send + 'a;

  /// The subset of `external_ids` not stored yet, in input order.
  fn filter_new(
    &self,
    external_ids: Vec<String>,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Case-insensitive lookup of a classifier by its full path.
  fn classifier<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<Classifier>, Self::Error>> + Send + 'a;

  /// Row counts per table.
  fn counts(&self) -> impl Future<Output = Result<TableCounts, Self::Error>> + Send + '_;
}
