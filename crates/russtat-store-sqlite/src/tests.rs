//! Integration tests for `SqliteStore` against in-memory and file-backed
//! databases.

use russtat_core::{
  classifier::ParentState,
  key::{Dimension, DimensionId, DimensionKey, NaturalKey},
  release::Release,
  store::{DatasetId, HierarchyReport, ObservationId, ResetScope, TableCounts, Warehouse},
  timestamp::TimestampFormat,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use crate::{Error, SqliteStore, WarehouseConfig};

async fn store() -> SqliteStore {
  let _ = tracing_subscriber::fmt()
    .with_test_writer()
    .with_env_filter(EnvFilter::from_default_env())
    .try_init();
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn doc(id: &str) -> Value {
  json!({
    "prepared": "2020-06-05 12:00:00",
    "updated": "2020-06-01 09:30:00",
    "periodicity": { "value": "год", "releases": "ежегодно", "next": "28.12.2020" },
    "id": id,
    "agency_id": 58,
    "agency_name": "Росстат",
    "agency_dept": "Управление статистики населения",
    "codes": {
      "s_OKATO": { "name": "ОКАТО", "values": [["643", "Российская Федерация"]] }
    },
    "unit": "единица",
    "data_range": [2015, 2019],
    "full_name": "Число организаций",
    "description": "Методика",
    "classifier": { "id": "1.2", "path": "Население / Демография" },
    "prepared_by": { "name": "Иванов", "contacts": "+7 495 000-00-00" },
    "data": [["ОКАТО", "Российская Федерация", "единица", "год", 2019, 24234.0]]
  })
}

fn release(value: Value) -> Release { serde_json::from_value(value).unwrap() }

fn key(dimension: Dimension, text: &str) -> NaturalKey { NaturalKey::new(dimension, text).unwrap() }

fn classifier(path: &str) -> DimensionKey {
  DimensionKey::Classifier { path: key(Dimension::Classifier, path), external_id: None }
}

fn code_value(code: &str, external_id: Option<&str>, name: &str) -> DimensionKey {
  DimensionKey::CodeValue {
    code:        key(Dimension::Code, code),
    external_id: external_id.map(str::to_owned),
    name:        key(Dimension::CodeValue, name),
  }
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingesting_a_release_twice_is_idempotent() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  let x1 = release(doc("X1"));

  let first = s.ingest(&x1, &fmt).await.unwrap();
  assert_eq!(first.added, 1);
  assert!(first.last_observation_id.is_some());

  let second = s.ingest(&x1, &fmt).await.unwrap();
  assert_eq!(second.added, 0);
  assert_eq!(second.dataset_id, first.dataset_id);
  assert_eq!(second.last_observation_id, first.last_observation_id);

  assert_eq!(
    s.counts().await.unwrap(),
    TableCounts {
      agencies:     1,
      departments:  1,
      classifiers:  1,
      units:        1,
      periods:      1,
      codes:        1,
      code_values:  1,
      datasets:     1,
      observations: 1,
    }
  );
}

#[tokio::test]
async fn stored_dataset_carries_release_metadata() {
  let s = store().await;
  let outcome = s.ingest(&release(doc("X1")), &TimestampFormat::default()).await.unwrap();

  let ds = s.dataset("X1").await.unwrap().expect("dataset stored");
  assert_eq!(ds.id, outcome.dataset_id);
  assert_eq!(ds.full_name, "Число организаций");
  assert_eq!(ds.description, "Методика");
  assert_eq!(ds.preparer_name, "Иванов");
  assert_eq!(ds.release_schedule, "ежегодно");
  assert_eq!((ds.range_start, ds.range_end), (Some(2015), Some(2019)));
  assert_eq!(ds.prepared_at.to_string(), "2020-06-05 12:00:00");
  assert_eq!(ds.updated_at.to_string(), "2020-06-01 09:30:00");
  assert_eq!(ds.next_update_at.map(|t| t.to_string()).as_deref(), Some("2020-12-28 00:00:00"));
  assert!(ds.department_id.is_some());
  assert!(ds.classifier_id.is_some());
  assert!(ds.unit_id.is_some());
  assert!(ds.period_id.is_some());
  assert!(ds.code_id.is_some());

  assert!(s.dataset("X2").await.unwrap().is_none());
}

#[tokio::test]
async fn custom_timestamp_format_is_honoured() {
  let s = store().await;
  let mut d = doc("X1");
  d["prepared"] = json!("05.06.2020 12:00");
  d["updated"] = json!("01.06.2020 09:30");
  let fmt = TimestampFormat::new("%d.%m.%Y %H:%M");

  s.ingest(&release(d.clone()), &fmt).await.unwrap();
  let ds = s.dataset("X1").await.unwrap().unwrap();
  assert_eq!(ds.prepared_at.to_string(), "2020-06-05 12:00:00");

  let err = s.ingest(&release(d), &TimestampFormat::default()).await.unwrap_err();
  assert!(matches!(err, Error::Core(russtat_core::Error::Validation { .. })));
}

// ─── Dimension resolution ────────────────────────────────────────────────────

#[tokio::test]
async fn resolution_is_case_insensitive() {
  let s = store().await;
  let a = s.resolve(DimensionKey::Unit(key(Dimension::Unit, "Единица"))).await.unwrap();
  let b = s.resolve(DimensionKey::Unit(key(Dimension::Unit, " ЕДИНИЦА "))).await.unwrap();
  let c = s.resolve(DimensionKey::Period(key(Dimension::Period, "единица"))).await.unwrap();
  assert_eq!(a, b);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.units, 1);
  assert_eq!(counts.periods, 1);
  assert_eq!(c, DimensionId(1));
}

#[tokio::test]
async fn concurrent_resolution_converges_on_one_row() {
  let s = store().await;

  let tasks: Vec<_> = (0..8)
    .map(|i| {
      let s = s.clone();
      let name = if i % 2 == 0 { "ОКАТО" } else { "окато" };
      tokio::spawn(async move { s.resolve(DimensionKey::Code(key(Dimension::Code, name))).await })
    })
    .collect();

  let mut ids = Vec::new();
  for task in tasks {
    ids.push(task.await.unwrap().unwrap());
  }
  assert!(ids.windows(2).all(|w| w[0] == w[1]));
  assert_eq!(s.counts().await.unwrap().codes, 1);
}

#[tokio::test]
async fn department_resolves_within_its_agency() {
  let s = store().await;
  let dept = |agency: &str, name: &str| DimensionKey::Department {
    agency: key(Dimension::Agency, agency),
    name:   key(Dimension::Department, name),
  };

  let a = s.resolve(dept("Росстат", "Отдел цен")).await.unwrap();
  let b = s.resolve(dept("росстат", "отдел цен")).await.unwrap();
  let c = s.resolve(dept("Минфин", "Отдел цен")).await.unwrap();
  assert_eq!(a, b);
  assert_ne!(a, c);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.agencies, 2);
  assert_eq!(counts.departments, 2);
}

#[tokio::test]
async fn code_value_without_external_id_falls_back_to_name() {
  let s = store().await;

  let keyed = s.resolve(code_value("ОКАТО", Some("643"), "Российская Федерация")).await.unwrap();
  let by_name = s.resolve(code_value("окато", None, "российская федерация")).await.unwrap();
  assert_eq!(keyed, by_name);

  let renamed = s.resolve(code_value("ОКАТО", Some("643"), "Россия")).await.unwrap();
  assert_eq!(renamed, keyed);

  let unkeyed = s.resolve(code_value("ОКАТО", None, "Москва")).await.unwrap();
  let again = s.resolve(code_value("ОКАТО", None, "МОСКВА")).await.unwrap();
  assert_eq!(unkeyed, again);
  assert_ne!(unkeyed, keyed);

  let other = s.resolve(code_value("ОКАТО", Some("45"), "Москва")).await.unwrap();
  assert_ne!(other, unkeyed);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.codes, 1);
  assert_eq!(counts.code_values, 3);
}

#[tokio::test]
async fn empty_required_key_writes_nothing() {
  let s = store().await;
  let mut d = doc("X1");
  d["agency_name"] = json!("   ");

  let err = s.ingest(&release(d), &TimestampFormat::default()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(russtat_core::Error::Validation { ref dataset, .. }) if dataset == "X1"
  ));
  assert_eq!(s.counts().await.unwrap(), TableCounts::default());
}

// ─── Classifier hierarchy ────────────────────────────────────────────────────

async fn parent_of(s: &SqliteStore, path: &str) -> ParentState {
  s.classifier(path).await.unwrap().expect("classifier stored").parent
}

#[tokio::test]
async fn child_inserted_before_parent_is_linked() {
  let s = store().await;
  s.resolve(classifier("A / B / C")).await.unwrap();
  assert_eq!(parent_of(&s, "A / B / C").await, ParentState::Unresolved);

  let ab = s.resolve(classifier("A / B")).await.unwrap();
  assert_eq!(parent_of(&s, "A / B / C").await, ParentState::Child(ab));
  assert_eq!(parent_of(&s, "A / B").await, ParentState::Unresolved);
  assert_eq!(parent_of(&s, "A / B").await.parent(), None);
}

#[tokio::test]
async fn parent_inserted_before_child_is_linked() {
  let s = store().await;
  let ab = s.resolve(classifier("A / B")).await.unwrap();
  s.resolve(classifier("A / B / C")).await.unwrap();

  assert_eq!(parent_of(&s, "a / b / c").await, ParentState::Child(ab));
  assert_eq!(parent_of(&s, "A / B").await, ParentState::Unresolved);
}

#[tokio::test]
async fn path_without_separator_is_a_root() {
  let s = store().await;
  s.resolve(classifier("A / B")).await.unwrap();
  let a = s.resolve(classifier("A")).await.unwrap();

  assert_eq!(parent_of(&s, "A").await, ParentState::Root);
  assert_eq!(parent_of(&s, "A / B").await, ParentState::Child(a));
}

#[tokio::test]
async fn rebuild_is_idempotent() {
  let s = store().await;
  for path in ["A / B / C", "A", "A / B", "D / E"] {
    s.resolve(classifier(path)).await.unwrap();
  }

  let report = s.rebuild_hierarchy().await.unwrap();
  assert_eq!(report.resolved, 0);
  assert_eq!(report.roots, 0);
  assert_eq!(report.pending, 1);

  let again = s.rebuild_hierarchy().await.unwrap();
  assert_eq!(again, report);

  s.resolve(classifier("D")).await.unwrap();
  assert_eq!(s.rebuild_hierarchy().await.unwrap(), HierarchyReport::default());
  assert_eq!(s.counts().await.unwrap().classifiers, 5);
}

#[tokio::test]
async fn ingest_links_release_classifiers() {
  let s = store().await;
  let fmt = TimestampFormat::default();

  let mut parent = doc("X0");
  parent["classifier"] = json!({ "id": "1", "path": "Население" });
  s.ingest(&release(doc("X1")), &fmt).await.unwrap();
  s.ingest(&release(parent), &fmt).await.unwrap();

  let root = s.classifier("население").await.unwrap().unwrap();
  assert_eq!(root.parent, ParentState::Root);
  assert_eq!(root.external_id.as_deref(), Some("1"));
  assert_eq!(parent_of(&s, "Население / Демография").await, ParentState::Child(root.id));
}

#[tokio::test]
async fn ingest_without_classifier_still_relinks_pending_rows() {
  let s = store().await;
  s.execute_batch(
    "INSERT INTO classifiers (name, name_key, parent_state) VALUES
       ('A', 'a', 'root'),
       ('A / B', 'a / b', 'unresolved');",
  )
  .await
  .unwrap();

  let mut d = doc("X1");
  d["classifier"] = json!(null);
  s.ingest(&release(d), &TimestampFormat::default()).await.unwrap();

  let a = s.classifier("A").await.unwrap().unwrap();
  assert_eq!(parent_of(&s, "A / B").await, ParentState::Child(a.id));
  assert_eq!(s.dataset("X1").await.unwrap().unwrap().classifier_id, None);
}

// ─── Datasets ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reingest_replaces_every_dataset_field() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  let first = s.ingest(&release(doc("X1")), &fmt).await.unwrap();

  let mut d = doc("X1");
  d["full_name"] = json!("Число организаций (уточнено)");
  d["unit"] = json!(null);
  d["agency_dept"] = json!("");
  d["data_range"] = json!(null);
  d["periodicity"]["next"] = json!(null);
  let second = s.ingest(&release(d), &fmt).await.unwrap();
  assert_eq!(second.dataset_id, first.dataset_id);

  let ds = s.dataset("X1").await.unwrap().unwrap();
  assert_eq!(ds.full_name, "Число организаций (уточнено)");
  assert_eq!(ds.unit_id, None);
  assert_eq!(ds.department_id, None);
  assert_eq!(ds.range_start, None);
  assert_eq!(ds.next_update_at, None);
  assert_eq!(s.counts().await.unwrap().datasets, 1);
}

#[tokio::test]
async fn filter_new_skips_stored_datasets() {
  let s = store().await;
  s.ingest(&release(doc("X1")), &TimestampFormat::default()).await.unwrap();

  let fresh = s
    .filter_new(vec!["X2".into(), "X1".into(), "X3".into()])
    .await
    .unwrap();
  assert_eq!(fresh, ["X2", "X3"]);
}

// ─── Observations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_new_rows_are_counted() {
  let s = store().await;
  let fmt = TimestampFormat::default();

  let mut d = doc("X1");
  d["data"] = json!([
    ["ОКАТО", "Российская Федерация", "единица", "год", 2017, 1.0],
    ["ОКАТО", "Российская Федерация", "единица", "год", 2018, 2.0]
  ]);
  let first = s.ingest(&release(d.clone()), &fmt).await.unwrap();
  assert_eq!(first.added, 2);

  d["data"] = json!([
    ["ОКАТО", "Российская Федерация", "единица", "год", 2017, 1.0],
    ["ОКАТО", "Российская Федерация", "единица", "год", 2018, 2.0],
    ["окато", "российская федерация", "Единица", "Год", 2019, 3.0]
  ]);
  let outcome = s.ingest(&release(d), &fmt).await.unwrap();
  assert_eq!(outcome.added, 1);
  assert!(outcome.last_observation_id > first.last_observation_id);
  assert_eq!(s.counts().await.unwrap().observations, 3);
}

#[tokio::test]
async fn changed_value_is_a_new_observation() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  s.ingest(&release(doc("X1")), &fmt).await.unwrap();

  let mut d = doc("X1");
  d["data"][0][5] = json!(25000.0);
  assert_eq!(s.ingest(&release(d), &fmt).await.unwrap().added, 1);
  assert_eq!(s.counts().await.unwrap().observations, 2);
}

#[tokio::test]
async fn rows_without_dimensions_are_still_unique() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  let mut d = doc("X1");
  d["data"] = json!([[null, null, null, null, 2020, 1.5], ["", "", "", "", "2020", "1,5"]]);

  let first = s.ingest(&release(d.clone()), &fmt).await.unwrap();
  assert_eq!(first.added, 1);
  assert_eq!(s.ingest(&release(d), &fmt).await.unwrap().added, 0);
}

#[tokio::test]
async fn release_without_rows_has_no_last_observation() {
  let s = store().await;
  let mut d = doc("X1");
  d["data"] = json!([]);

  let outcome = s.ingest(&release(d), &TimestampFormat::default()).await.unwrap();
  assert_eq!(outcome.added, 0);
  assert_eq!(outcome.last_observation_id, None);
  assert_eq!(s.counts().await.unwrap().datasets, 1);
}

#[tokio::test]
async fn invalid_row_rolls_back_the_whole_release() {
  let s = store().await;
  let mut d = doc("X1");
  d["data"] = json!([
    ["ОКАТО", "Российская Федерация", "единица", "год", 2017, 1.0],
    ["ОКАТО", "Российская Федерация", "единица", "год", 2018, 2.0],
    ["ОКАТО", "Российская Федерация", "единица", "год", "двадцать", 3.0]
  ]);

  let err = s.ingest(&release(d), &TimestampFormat::default()).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(russtat_core::Error::Validation { ref reason, .. }) if reason.starts_with("row 2")
  ));
  assert_eq!(s.counts().await.unwrap(), TableCounts::default());
}

#[tokio::test]
async fn storage_failure_mid_batch_rolls_back_every_write() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  s.execute_batch(
    "CREATE TRIGGER reject_observation BEFORE INSERT ON observations
     WHEN NEW.value = 666
     BEGIN SELECT RAISE(ABORT, 'rejected observation'); END;",
  )
  .await
  .unwrap();

  let mut d = doc("X2");
  d["data"] = json!([
    ["ОКАТО", "Российская Федерация", "единица", "год", 2018, 1.0],
    ["ОКАТО", "Российская Федерация", "единица", "год", 2019, 666]
  ]);

  let err = s.ingest(&release(d.clone()), &fmt).await.unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation(ref msg) if msg.contains("rejected observation")));
  assert_eq!(s.counts().await.unwrap(), TableCounts::default());

  s.ingest(&release(doc("X1")), &fmt).await.unwrap();
  let committed = s.counts().await.unwrap();

  assert!(matches!(
    s.ingest(&release(d), &fmt).await,
    Err(Error::ConstraintViolation(_))
  ));
  assert_eq!(s.counts().await.unwrap(), committed);
  assert!(s.dataset("X2").await.unwrap().is_none());
}

// ─── Reset ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn partial_reset_keeps_reference_tables() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  let first = s.ingest(&release(doc("X1")), &fmt).await.unwrap();

  let report = s.reset(ResetScope::default()).await.unwrap();
  assert_eq!(report.removed_from("observations"), 1);
  assert_eq!(report.removed_from("datasets"), 1);
  assert_eq!(report.removed_from("code_values"), 1);
  assert_eq!(report.removed_from("codes"), 1);
  assert_eq!(report.removed_from("agencies"), 0);

  let counts = s.counts().await.unwrap();
  assert_eq!(counts.datasets, 0);
  assert_eq!(counts.observations, 0);
  assert_eq!(counts.agencies, 1);
  assert_eq!(counts.classifiers, 1);
  assert_eq!(counts.units, 1);

  let second = s.ingest(&release(doc("X1")), &fmt).await.unwrap();
  assert_eq!(second.added, 1);
  assert!(second.dataset_id > first.dataset_id);
}

#[tokio::test]
async fn full_reset_with_restart_reuses_ids() {
  let s = store().await;
  let fmt = TimestampFormat::default();
  s.ingest(&release(doc("X1")), &fmt).await.unwrap();
  s.ingest(&release(doc("X2")), &fmt).await.unwrap();

  let report = s
    .reset(ResetScope { full: true, restart_ids: true })
    .await
    .unwrap();
  assert_eq!(report.removed_from("datasets"), 2);
  assert_eq!(report.removed_from("agencies"), 1);
  assert_eq!(report.removed.len(), 9);
  assert_eq!(s.counts().await.unwrap(), TableCounts::default());

  let outcome = s.ingest(&release(doc("X2")), &fmt).await.unwrap();
  assert_eq!(outcome.dataset_id, DatasetId(1));
  assert_eq!(outcome.last_observation_id, Some(ObservationId(1)));
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_connections_share_dimensions() {
  let dir = tempfile::tempdir().unwrap();
  let config = WarehouseConfig {
    store_path: dir.path().join("warehouse.db"),
    ..WarehouseConfig::default()
  };
  let a = SqliteStore::open_with(&config).await.unwrap();
  let b = SqliteStore::open_with(&config).await.unwrap();
  let fmt = config.timestamp_format();

  let releases: Vec<_> = (0..6).map(|i| release(doc(&format!("X{i}")))).collect();
  let tasks: Vec<_> = releases
    .into_iter()
    .enumerate()
    .map(|(i, r)| {
      let store = if i % 2 == 0 { a.clone() } else { b.clone() };
      let fmt = fmt.clone();
      tokio::spawn(async move { store.ingest(&r, &fmt).await })
    })
    .collect();
  for task in tasks {
    assert_eq!(task.await.unwrap().unwrap().added, 1);
  }

  let counts = b.counts().await.unwrap();
  assert_eq!(counts.datasets, 6);
  assert_eq!(counts.observations, 6);
  assert_eq!(counts.agencies, 1);
  assert_eq!(counts.units, 1);
  assert_eq!(counts.code_values, 1);
  assert_eq!(counts.classifiers, 1);
}
