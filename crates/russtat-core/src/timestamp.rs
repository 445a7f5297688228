//! Configurable parsing of release timestamps.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Day-first date form used by source publications for the next release date.
pub const SOURCE_DATE_FORMAT: &str = "%d.%m.%Y";

/// A chrono format string used to parse the timestamps of a release.
///
/// A format describing a bare date is also accepted; such values parse to
/// midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampFormat(String);

impl Default for TimestampFormat {
  fn default() -> Self { Self("%Y-%m-%d %H:%M:%S".to_owned()) }
}

impl TimestampFormat {
  pub fn new(format: impl Into<String>) -> Self { Self(format.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// Parse `text` with this format. Surrounding whitespace is ignored.
  pub fn parse(&self, text: &str) -> Option<NaiveDateTime> {
    parse_with(text, &self.0)
  }

  /// Parse an optional date: this format first, then [`SOURCE_DATE_FORMAT`].
  pub fn parse_lenient(&self, text: &str) -> Option<NaiveDateTime> {
    self.parse(text).or_else(|| parse_with(text, SOURCE_DATE_FORMAT))
  }
}

fn parse_with(text: &str, format: &str) -> Option<NaiveDateTime> {
  let text = text.trim();
  NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
    NaiveDate::parse_from_str(text, format)
      .ok()
      .map(|d| d.and_time(NaiveTime::MIN))
  })
}
