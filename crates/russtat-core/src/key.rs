//! Natural keys and the dimension keys built from them.
//!
//! A dimension row is identified externally by its natural key (a name, a
//! unit label, a classifier path) and internally by a surrogate
//! [`DimensionId`]. Lookups are case-insensitive: the key is stored next to
//! the display text in normalized form and that normalized column is the
//! uniqueness constraint the storage layer upserts against.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{Error, Result};

// ─── Dimension kinds ─────────────────────────────────────────────────────────

/// The reference tables an observation or dataset can point at.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dimension {
  Agency,
  Department,
  Classifier,
  Unit,
  Period,
  Code,
  CodeValue,
}

// ─── Surrogate id ────────────────────────────────────────────────────────────

/// Surrogate id of a dimension row. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionId(pub i64);

impl fmt::Display for DimensionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Natural key ─────────────────────────────────────────────────────────────

/// A validated, non-empty natural key.
///
/// Keeps the display text as given (trimmed) and a normalized form used for
/// matching: lowercased with full Unicode case mapping, so `"ОКАТО"` and
/// `"окато"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
  display:    String,
  normalized: String,
}

impl NaturalKey {
  /// Build a key for `dimension`. Empty or whitespace-only text is rejected.
  pub fn new(dimension: Dimension, text: &str) -> Result<Self> {
    let display = text.trim();
    if display.is_empty() {
      return Err(Error::EmptyKey(dimension));
    }
    Ok(Self {
      display:    display.to_owned(),
      normalized: normalize(display),
    })
  }

  /// Like [`NaturalKey::new`], but empty text yields `None` instead of an
  /// error. Used for optional references.
  pub fn optional(dimension: Dimension, text: &str) -> Option<Self> {
    Self::new(dimension, text).ok()
  }

  pub fn display(&self) -> &str { &self.display }

  pub fn normalized(&self) -> &str { &self.normalized }
}

impl fmt::Display for NaturalKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.display) }
}

/// Normalize free text for natural-key comparison.
pub fn normalize(text: &str) -> String { text.trim().to_lowercase() }

/// Trim an optional external identifier; empty means absent.
pub fn external_id(text: Option<&str>) -> Option<String> {
  text.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

// ─── Dimension key ───────────────────────────────────────────────────────────

/// Everything needed to resolve one dimension row by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionKey {
  Agency {
    name:        NaturalKey,
    external_id: Option<String>,
  },
  /// Resolves the agency first, then the department within it.
  Department {
    agency: NaturalKey,
    name:   NaturalKey,
  },
  Classifier {
    path:        NaturalKey,
    external_id: Option<String>,
  },
  Unit(NaturalKey),
  Period(NaturalKey),
  Code(NaturalKey),
  /// Resolves the code by name first, then the value within it: by external
  /// value id when present, otherwise by display name.
  CodeValue {
    code:        NaturalKey,
    external_id: Option<String>,
    name:        NaturalKey,
  },
}

impl DimensionKey {
  pub fn dimension(&self) -> Dimension {
    match self {
      Self::Agency { .. } => Dimension::Agency,
      Self::Department { .. } => Dimension::Department,
      Self::Classifier { .. } => Dimension::Classifier,
      Self::Unit(_) => Dimension::Unit,
      Self::Period(_) => Dimension::Period,
      Self::Code(_) => Dimension::Code,
      Self::CodeValue { .. } => Dimension::CodeValue,
    }
  }
}
