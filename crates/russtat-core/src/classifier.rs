//! Classifier nodes — the self-referential classification tree.
//!
//! A classifier is identified by its full hierarchical path, e.g.
//! `"Population / Demography / Births"`. The parent of a node is the node
//! whose path is everything before the last separator. Parents are linked
//! after the fact by the hierarchy rebuild, since a child may be published
//! before its parent.

use serde::{Deserialize, Serialize};

use crate::key::DimensionId;

/// Separator between levels of a classifier path.
pub const PATH_SEPARATOR: char = '/';

/// Where a classifier sits in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "parent", rename_all = "snake_case")]
pub enum ParentState {
  /// The parent path has not been found yet; a later rebuild may link it.
  Unresolved,
  /// The path has no separator. Terminal.
  Root,
  /// Linked to the classifier with this id.
  Child(DimensionId),
}

impl ParentState {
  pub fn parent(&self) -> Option<DimensionId> {
    match self {
      Self::Child(id) => Some(*id),
      Self::Unresolved | Self::Root => None,
    }
  }

  pub fn is_resolved(&self) -> bool { !matches!(self, Self::Unresolved) }
}

/// A stored classifier row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
  pub id:          DimensionId,
  pub external_id: Option<String>,
  pub path:        String,
  pub parent:      ParentState,
}

/// The path of the would-be parent of `path`, or `None` for a root.
///
/// Splits on the last separator; the result is trimmed, so
/// `"A / B / C"` yields `"A / B"`. A path whose prefix is blank (`"/ A"`)
/// is treated as a root.
pub fn parent_path(path: &str) -> Option<&str> {
  let (head, _) = path.rsplit_once(PATH_SEPARATOR)?;
  let head = head.trim();
  (!head.is_empty()).then_some(head)
}

/// Number of levels in `path`.
pub fn depth(path: &str) -> usize { path.matches(PATH_SEPARATOR).count() + 1 }
