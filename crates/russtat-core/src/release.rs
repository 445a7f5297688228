//! Release documents — the unit of ingestion.
//!
//! A [`Release`] is the structured form of one published dataset as produced
//! by the upstream fetch/parse step: metadata, code tables and observation
//! rows. It is deserialized leniently (missing or `null` fields default) and
//! then validated into a [`PreparedRelease`] before any storage work starts,
//! so the write path only ever sees well-formed input.

use std::{
  collections::{BTreeMap, HashMap},
  io::Read,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
  Error, Result,
  key::{Dimension, DimensionKey, NaturalKey, external_id, normalize},
  timestamp::TimestampFormat,
};

// ─── Wire types ──────────────────────────────────────────────────────────────

/// A JSON scalar as found in release documents: ids, years and values are
/// numbers in some publications and strings in others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
  Integer(i64),
  Number(f64),
  Text(String),
}

impl Scalar {
  pub fn to_text(&self) -> String {
    match self {
      Self::Integer(i) => i.to_string(),
      Self::Number(n) => n.to_string(),
      Self::Text(s) => s.trim().to_owned(),
    }
  }

  /// Interpret as a calendar year.
  pub fn as_year(&self) -> Option<i32> {
    match self {
      Self::Integer(i) => i32::try_from(*i).ok(),
      Self::Number(n) if n.fract() == 0.0 => i32::try_from(*n as i64).ok(),
      Self::Number(_) => None,
      Self::Text(s) => s.trim().parse().ok(),
    }
  }

  /// Interpret as a finite measured value. Text may use a decimal comma and
  /// space digit grouping.
  pub fn as_value(&self) -> Option<f64> {
    let value = match self {
      Self::Integer(i) => *i as f64,
      Self::Number(n) => *n,
      Self::Text(s) => {
        let cleaned: String = s
          .chars()
          .filter(|c| !c.is_whitespace())
          .map(|c| if c == ',' { '.' } else { c })
          .collect();
        cleaned.parse().ok()?
      }
    };
    value.is_finite().then_some(value)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Periodicity {
  /// Observation period label, e.g. "год" or "квартал".
  #[serde(deserialize_with = "null_as_default")]
  pub value:    String,
  /// Publication schedule text.
  #[serde(deserialize_with = "null_as_default")]
  pub releases: String,
  /// Next expected update.
  pub next:     Option<String>,
}

/// One code table: a display name and its `(external value id, name)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeList {
  #[serde(deserialize_with = "null_as_default")]
  pub name:   String,
  #[serde(deserialize_with = "null_as_default")]
  pub values: Vec<(Option<Scalar>, Option<String>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRef {
  pub id:   Option<Scalar>,
  #[serde(deserialize_with = "null_as_default")]
  pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preparer {
  #[serde(deserialize_with = "null_as_default")]
  pub name:     String,
  #[serde(deserialize_with = "null_as_default")]
  pub contacts: String,
}

/// One observation row: `[code, value name, unit, period, year, value]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRow", into = "RawRow")]
pub struct DataRow {
  pub code:       String,
  pub value_name: String,
  pub unit:       String,
  pub period:     String,
  pub year:       Scalar,
  pub value:      Scalar,
}

#[derive(Serialize, Deserialize)]
struct RawRow(
  Option<String>,
  Option<String>,
  Option<String>,
  Option<String>,
  Scalar,
  Scalar,
);

impl From<RawRow> for DataRow {
  fn from(RawRow(code, value_name, unit, period, year, value): RawRow) -> Self {
    Self {
      code: code.unwrap_or_default(),
      value_name: value_name.unwrap_or_default(),
      unit: unit.unwrap_or_default(),
      period: period.unwrap_or_default(),
      year,
      value,
    }
  }
}

impl From<DataRow> for RawRow {
  fn from(r: DataRow) -> Self {
    RawRow(Some(r.code), Some(r.value_name), Some(r.unit), Some(r.period), r.year, r.value)
  }
}

/// A release document as delivered by the upstream parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
  pub prepared:    Option<String>,
  pub updated:     Option<String>,
  #[serde(deserialize_with = "null_as_default")]
  pub periodicity: Periodicity,
  /// External dataset id; correlates the same dataset across releases.
  #[serde(deserialize_with = "null_as_default")]
  pub id:          String,
  pub agency_id:   Option<Scalar>,
  #[serde(deserialize_with = "null_as_default")]
  pub agency_name: String,
  #[serde(deserialize_with = "null_as_default")]
  pub agency_dept: String,
  #[serde(deserialize_with = "null_as_default")]
  pub codes:       BTreeMap<String, CodeList>,
  #[serde(deserialize_with = "null_as_default")]
  pub unit:        String,
  pub data_range:  Option<(i32, i32)>,
  #[serde(deserialize_with = "null_as_default")]
  pub full_name:   String,
  #[serde(alias = "methodology", deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(deserialize_with = "null_as_default")]
  pub classifier:  ClassifierRef,
  #[serde(deserialize_with = "null_as_default")]
  pub prepared_by: Preparer,
  #[serde(deserialize_with = "null_as_default")]
  pub data:        Vec<DataRow>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Validated batch input ───────────────────────────────────────────────────

/// Dataset metadata, fully replaced on every ingestion of the same dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFields {
  pub full_name:        String,
  pub description:      String,
  pub preparer_name:    String,
  pub preparer_contact: String,
  pub range_start:      Option<i32>,
  pub range_end:        Option<i32>,
  pub release_schedule: String,
  pub prepared_at:      NaiveDateTime,
  pub updated_at:       NaiveDateTime,
  pub next_update_at:   Option<NaiveDateTime>,
}

/// A validated observation row.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
  pub code_value: Option<DimensionKey>,
  pub unit:       Option<DimensionKey>,
  pub period:     Option<DimensionKey>,
  pub year:       i32,
  pub value:      f64,
}

/// A release that passed validation: every natural key is non-empty, every
/// timestamp parsed, every row typed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRelease {
  pub external_id:  String,
  pub agency:       DimensionKey,
  pub department:   Option<DimensionKey>,
  pub classifier:   Option<DimensionKey>,
  pub unit:         Option<DimensionKey>,
  pub period:       Option<DimensionKey>,
  /// The code the dataset as a whole refers to.
  pub code:         Option<DimensionKey>,
  /// Every code value declared in the release's code tables.
  pub code_values:  Vec<DimensionKey>,
  pub fields:       DatasetFields,
  pub rows:         Vec<PreparedRow>,
}

impl Release {
  pub fn from_json(input: &str) -> Result<Self> { Ok(serde_json::from_str(input)?) }

  pub fn from_reader(reader: impl Read) -> Result<Self> { Ok(serde_json::from_reader(reader)?) }

  /// Validate the release and convert it into batch input.
  pub fn prepare(&self, format: &TimestampFormat) -> Result<PreparedRelease> {
    let dataset = self.id.trim();
    if dataset.is_empty() {
      return Err(Error::validation("", "missing external dataset id"));
    }
    let invalid = |reason: String| Error::validation(dataset, reason);

    let agency_name = NaturalKey::new(Dimension::Agency, &self.agency_name)
      .map_err(|_| invalid("missing agency_name".into()))?;
    if self.full_name.trim().is_empty() {
      return Err(invalid("missing full_name".into()));
    }

    let timestamp = |field: &str, text: Option<&str>| -> Result<NaiveDateTime> {
      let text = text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid(format!("missing {field} timestamp")))?;
      format.parse(text).ok_or_else(|| {
        invalid(format!("malformed {field} timestamp {text:?} (expected {:?})", format.as_str()))
      })
    };
    let prepared_at = timestamp("prepared", self.prepared.as_deref())?;
    let updated_at = timestamp("updated", self.updated.as_deref())?;
    let next_update_at = match self.periodicity.next.as_deref().map(str::trim) {
      None | Some("") => None,
      Some(text) => Some(
        format
          .parse_lenient(text)
          .ok_or_else(|| invalid(format!("malformed next release date {text:?}")))?,
      ),
    };

    let (range_start, range_end) = match self.data_range {
      Some((start, end)) if start > end => {
        return Err(invalid(format!("data range {start}..{end} is inverted")));
      }
      Some((start, end)) => (Some(start), Some(end)),
      None => (None, None),
    };

    let codes = CodeIndex::build(&self.codes).map_err(invalid)?;

    let rows = self
      .data
      .iter()
      .enumerate()
      .map(|(i, row)| prepare_row(row, &codes).map_err(|reason| invalid(format!("row {i}: {reason}"))))
      .collect::<Result<Vec<_>>>()?;

    let code = rows
      .iter()
      .find_map(|r| match &r.code_value {
        Some(DimensionKey::CodeValue { code, .. }) => Some(code.clone()),
        _ => None,
      })
      .or_else(|| codes.first.clone())
      .map(DimensionKey::Code);

    Ok(PreparedRelease {
      external_id: dataset.to_owned(),
      agency: DimensionKey::Agency {
        name:        agency_name.clone(),
        external_id: external_id(self.agency_id.as_ref().map(Scalar::to_text).as_deref()),
      },
      department: NaturalKey::optional(Dimension::Department, &self.agency_dept)
        .map(|name| DimensionKey::Department { agency: agency_name, name }),
      classifier: NaturalKey::optional(Dimension::Classifier, &self.classifier.path).map(|path| {
        DimensionKey::Classifier {
          path,
          external_id: external_id(self.classifier.id.as_ref().map(Scalar::to_text).as_deref()),
        }
      }),
      unit: NaturalKey::optional(Dimension::Unit, &self.unit).map(DimensionKey::Unit),
      period: NaturalKey::optional(Dimension::Period, &self.periodicity.value)
        .map(DimensionKey::Period),
      code,
      code_values: codes.values,
      fields: DatasetFields {
        full_name: self.full_name.trim().to_owned(),
        description: self.description.trim().to_owned(),
        preparer_name: self.prepared_by.name.trim().to_owned(),
        preparer_contact: self.prepared_by.contacts.trim().to_owned(),
        range_start,
        range_end,
        release_schedule: self.periodicity.releases.trim().to_owned(),
        prepared_at,
        updated_at,
        next_update_at,
      },
      rows,
    })
  }
}

// ─── Code tables ─────────────────────────────────────────────────────────────

/// Lookup from the code and value names used by data rows to the declared
/// code values (and their external ids).
struct CodeIndex {
  /// Normalized code table key or display name → canonical code key.
  codes:  HashMap<String, NaturalKey>,
  /// (normalized code name, normalized value name) → external value id.
  lookup: HashMap<(String, String), Option<String>>,
  values: Vec<DimensionKey>,
  first:  Option<NaturalKey>,
}

impl CodeIndex {
  fn build(tables: &BTreeMap<String, CodeList>) -> std::result::Result<Self, String> {
    let mut index = CodeIndex {
      codes:  HashMap::new(),
      lookup: HashMap::new(),
      values: Vec::new(),
      first:  None,
    };

    for (table_key, list) in tables {
      let label = if list.name.trim().is_empty() { table_key } else { &list.name };
      let code = NaturalKey::new(Dimension::Code, label)
        .map_err(|_| format!("code table {table_key:?} has no name"))?;
      index.first.get_or_insert_with(|| code.clone());
      index.codes.insert(normalize(table_key), code.clone());
      index.codes.insert(code.normalized().to_owned(), code.clone());

      for (ext, name) in &list.values {
        let ext = external_id(ext.as_ref().map(Scalar::to_text).as_deref());
        let name = NaturalKey::new(Dimension::CodeValue, name.as_deref().unwrap_or_default())
          .map_err(|_| format!("code {label:?} has a value {ext:?} without a name"))?;
        index
          .lookup
          .entry((code.normalized().to_owned(), name.normalized().to_owned()))
          .or_insert_with(|| ext.clone());
        index.values.push(DimensionKey::CodeValue {
          code: code.clone(),
          external_id: ext,
          name,
        });
      }
    }
    Ok(index)
  }

  fn code_value(&self, code: &str, value: &str) -> std::result::Result<Option<DimensionKey>, String> {
    match (code.trim().is_empty(), value.trim().is_empty()) {
      (true, true) => return Ok(None),
      (false, true) => return Err(format!("code {code:?} without a value")),
      (true, false) => return Err(format!("value {value:?} without a code")),
      (false, false) => {}
    }
    let code = match self.codes.get(&normalize(code)) {
      Some(known) => known.clone(),
      None => NaturalKey::new(Dimension::Code, code).map_err(|e| e.to_string())?,
    };
    let name = NaturalKey::new(Dimension::CodeValue, value).map_err(|e| e.to_string())?;
    let external_id = self
      .lookup
      .get(&(code.normalized().to_owned(), name.normalized().to_owned()))
      .cloned()
      .flatten();
    Ok(Some(DimensionKey::CodeValue { code, external_id, name }))
  }
}

fn prepare_row(row: &DataRow, codes: &CodeIndex) -> std::result::Result<PreparedRow, String> {
  let year = row
    .year
    .as_year()
    .ok_or_else(|| format!("year {:?} is not an integer", row.year.to_text()))?;
  let value = row
    .value
    .as_value()
    .ok_or_else(|| format!("value {:?} is not a finite number", row.value.to_text()))?;

  Ok(PreparedRow {
    code_value: codes.code_value(&row.code, &row.value_name)?,
    unit: NaturalKey::optional(Dimension::Unit, &row.unit).map(DimensionKey::Unit),
    period: NaturalKey::optional(Dimension::Period, &row.period).map(DimensionKey::Period),
    year,
    value,
  })
}
