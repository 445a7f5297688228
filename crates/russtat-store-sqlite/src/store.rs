//! [`SqliteStore`] — the SQLite implementation of [`Warehouse`].

use std::{path::Path, time::Duration};

use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use tracing::{debug, info, warn};

use russtat_core::{
  classifier::Classifier,
  key::{DimensionId, DimensionKey, normalize},
  release::Release,
  store::{
    Dataset, HierarchyReport, IngestOutcome, ResetReport, ResetScope, TableCounts, Warehouse,
  },
  timestamp::TimestampFormat,
};

use crate::{
  Result, WarehouseConfig,
  dataset,
  encode::{RawClassifier, RawDataset},
  hierarchy,
  ingest::merge_release,
  resolve::Resolver,
  schema::{FACT_TABLES, REFERENCE_TABLES, SCHEMA},
};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Russtat warehouse backed by a single SQLite file.
///
/// Cloning is cheap and clones share one connection, so their writes are
/// serialized. Stores opened separately on the same file coordinate through
/// SQLite's write lock: every write takes it up front (`BEGIN IMMEDIATE`) and
/// waits up to the busy timeout for it.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, DEFAULT_BUSY_TIMEOUT).await
  }

  /// Open the store described by `config`.
  pub async fn open_with(config: &WarehouseConfig) -> Result<Self> {
    let path = config.store_path();
    info!(path = %path.display(), "opening warehouse");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, config.busy_timeout()).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, DEFAULT_BUSY_TIMEOUT).await
  }

  async fn init(conn: tokio_rusqlite::Connection, busy_timeout: Duration) -> Result<Self> {
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn })
  }

  /// Run `f` inside one `BEGIN IMMEDIATE` transaction. An error from `f`
  /// drops the transaction, which rolls it back.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let out = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
      })
      .await?;
    Ok(out)
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    Ok(self.conn.call(move |conn| Ok(f(conn)?)).await?)
  }

  /// Run raw SQL against the store, bypassing the warehouse API.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self.read(move |conn| conn.execute_batch(sql)).await
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn ingest(&self, release: &Release, format: &TimestampFormat) -> Result<IngestOutcome> {
    let prepared = match release.prepare(format) {
      Ok(prepared) => prepared,
      Err(err) => {
        warn!(dataset = %release.id.trim(), error = %err, "release rejected");
        return Err(err.into());
      }
    };
    let dataset = prepared.external_id.clone();
    let rows = prepared.rows.len();

    match self.write(move |tx| merge_release(tx, &prepared)).await {
      Ok(outcome) => {
        info!(
          %dataset,
          dataset_id = outcome.dataset_id.0,
          rows,
          added = outcome.added,
          "release merged"
        );
        Ok(outcome)
      }
      Err(err) => {
        warn!(%dataset, error = %err, "release rolled back");
        Err(err)
      }
    }
  }

  async fn resolve(&self, key: DimensionKey) -> Result<DimensionId> {
    self
      .write(move |tx| {
        let id = Resolver::new(tx).resolve(&key)?;
        if matches!(key, DimensionKey::Classifier { .. }) {
          hierarchy::rebuild(tx)?;
        }
        Ok(id)
      })
      .await
  }

  async fn rebuild_hierarchy(&self) -> Result<HierarchyReport> {
    let report = self.write(hierarchy::rebuild).await?;
    debug!(?report, "classifier hierarchy rebuilt");
    Ok(report)
  }

  async fn reset(&self, scope: ResetScope) -> Result<ResetReport> {
    let report = self
      .write(move |tx| {
        let extra: &[&str] = if scope.full { &REFERENCE_TABLES } else { &[] };

        let mut report = ResetReport::default();
        for &table in FACT_TABLES.iter().chain(extra) {
          let removed = tx.execute(&format!("DELETE FROM {table}"), [])?;
          if scope.restart_ids {
            tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1", params![table])?;
          }
          report.removed.push((table.to_owned(), removed as u64));
        }
        Ok(report)
      })
      .await?;

    info!(full = scope.full, restart_ids = scope.restart_ids, removed = ?report.removed, "warehouse reset");
    Ok(report)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn dataset(&self, external_id: &str) -> Result<Option<Dataset>> {
    let external_id = external_id.to_owned();
    let raw = self.read(move |conn| dataset::fetch(conn, &external_id)).await?;
    raw.map(RawDataset::into_dataset).transpose()
  }

  async fn filter_new(&self, external_ids: Vec<String>) -> Result<Vec<String>> {
    self
      .read(move |conn| {
        let mut fresh = Vec::with_capacity(external_ids.len());
        for id in external_ids {
          if !dataset::exists(conn, &id)? {
            fresh.push(id);
          }
        }
        Ok(fresh)
      })
      .await
  }

  async fn classifier(&self, path: &str) -> Result<Option<Classifier>> {
    let name_key = normalize(path);
    let raw = self
      .read(move |conn| {
        conn
          .query_row(
            &format!("SELECT {} FROM classifiers WHERE name_key = ?1", RawClassifier::COLUMNS),
            params![name_key],
            RawClassifier::from_row,
          )
          .optional()
      })
      .await?;
    raw.map(RawClassifier::into_classifier).transpose()
  }

  async fn counts(&self) -> Result<TableCounts> {
    self
      .read(|conn| {
        conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM agencies),
             (SELECT COUNT(*) FROM departments),
             (SELECT COUNT(*) FROM classifiers),
             (SELECT COUNT(*) FROM units),
             (SELECT COUNT(*) FROM periods),
             (SELECT COUNT(*) FROM codes),
             (SELECT COUNT(*) FROM code_values),
             (SELECT COUNT(*) FROM datasets),
             (SELECT COUNT(*) FROM observations)",
          [],
          |r| {
            let n = |i: usize| r.get::<_, i64>(i).map(|n| n as u64);
            Ok(TableCounts {
              agencies:     n(0)?,
              departments:  n(1)?,
              classifiers:  n(2)?,
              units:        n(3)?,
              periods:      n(4)?,
              codes:        n(5)?,
              code_values:  n(6)?,
              datasets:     n(7)?,
              observations: n(8)?,
            })
          },
        )
      })
      .await
  }
}
