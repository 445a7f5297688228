//! Merging one prepared release inside a single transaction.

use rusqlite::Connection;
use russtat_core::{
  key::{DimensionId, DimensionKey},
  release::PreparedRelease,
  store::IngestOutcome,
};
use tracing::debug;

use crate::{
  dataset::{self, DatasetRefs},
  hierarchy,
  observation::{self, ResolvedRow},
  resolve::Resolver,
};

/// Resolve every dimension the release mentions, relink the classifier
/// tree, upsert the dataset and load the observations. The caller owns the
/// transaction; any error leaves it to be rolled back.
pub fn merge_release(conn: &Connection, release: &PreparedRelease) -> rusqlite::Result<IngestOutcome> {
  let mut resolver = Resolver::new(conn);

  let agency = resolver.resolve(&release.agency)?;
  let department = optional(&mut resolver, release.department.as_ref())?;
  let classifier = optional(&mut resolver, release.classifier.as_ref())?;
  let unit = optional(&mut resolver, release.unit.as_ref())?;
  let period = optional(&mut resolver, release.period.as_ref())?;
  let code = optional(&mut resolver, release.code.as_ref())?;
  for value in &release.code_values {
    resolver.resolve(value)?;
  }

  let rows = release
    .rows
    .iter()
    .map(|row| {
      Ok(ResolvedRow {
        code_value: optional(&mut resolver, row.code_value.as_ref())?,
        unit:       optional(&mut resolver, row.unit.as_ref())?,
        period:     optional(&mut resolver, row.period.as_ref())?,
        year:       row.year,
        value:      row.value,
      })
    })
    .collect::<rusqlite::Result<Vec<_>>>()?;
  debug!(dataset = %release.external_id, rows = rows.len(), "dimensions resolved");

  let report = hierarchy::rebuild(conn)?;
  debug!(dataset = %release.external_id, pending = report.pending, "classifier hierarchy checked");

  let refs = DatasetRefs {
    agency,
    department,
    classifier,
    unit,
    period,
    code,
  };
  let dataset_id = dataset::upsert(conn, &release.external_id, &release.fields, &refs)?;
  let (added, last_observation_id) = observation::load(conn, dataset_id, &rows)?;

  Ok(IngestOutcome { added, last_observation_id, dataset_id })
}

fn optional(
  resolver: &mut Resolver<'_>,
  key: Option<&DimensionKey>,
) -> rusqlite::Result<Option<DimensionId>> {
  key.map(|k| resolver.resolve(k)).transpose()
}
