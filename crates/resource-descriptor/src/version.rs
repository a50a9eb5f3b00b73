//! Version stamps
//!
//! A version stamp is the rendering of an artifact's update time that names
//! its cache directory. The default format (`%Y%m%d%H%M%S`) is fixed-width
//! and most-significant-first, so lexicographic order of stamps is
//! chronological order. Eviction relies on that when it picks the "oldest"
//! expired versions.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default version stamp format.
pub const DEFAULT_VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors from version format validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionFormatError {
    #[error("invalid strftime pattern: {0}")]
    InvalidPattern(String),

    #[error("version format {0:?} does not round-trip a rendered stamp")]
    NotReversible(String),
}

/// Format used to render and recognise version stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionFormat {
    pattern: String,
}

impl VersionFormat {
    /// Create a version format from a strftime pattern.
    ///
    /// The pattern must be valid and must parse its own output back to the
    /// same string; otherwise the cache could never recognise the directories
    /// it created.
    pub fn new(pattern: impl Into<String>) -> Result<Self, VersionFormatError> {
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(VersionFormatError::InvalidPattern(pattern));
        }

        let format = Self { pattern };
        let reference = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let stamp = format.render(&reference);
        if stamp.is_empty() || !format.is_version_stamp(&stamp) {
            return Err(VersionFormatError::NotReversible(format.pattern));
        }
        Ok(format)
    }

    /// The strftime pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render an update time as a version stamp (always in UTC).
    pub fn render(&self, update_time: &DateTime<Utc>) -> String {
        let mut out = String::new();
        // Patterns are validated on construction, so writing cannot fail.
        let _ = write!(
            out,
            "{}",
            update_time.format_with_items(StrftimeItems::new(&self.pattern))
        );
        out
    }

    /// Parse a directory name as a version stamp.
    pub fn parse(&self, name: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(name, &self.pattern)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(name, &self.pattern)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }

    /// Whether `name` is a stamp this format could have produced.
    ///
    /// Requires an exact round trip, which rejects names chrono would
    /// accept leniently (extra padding, signs, trailing text).
    pub fn is_version_stamp(&self, name: &str) -> bool {
        match self.parse(name) {
            Some(parsed) => self.render(&parsed.and_utc()) == name,
            None => false,
        }
    }
}

impl Default for VersionFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_VERSION_FORMAT.to_string(),
        }
    }
}

impl TryFrom<String> for VersionFormat {
    type Error = VersionFormatError;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(pattern)
    }
}

impl From<VersionFormat> for String {
    fn from(format: VersionFormat) -> Self {
        format.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_default_render() {
        let format = VersionFormat::default();
        assert_eq!(format.render(&at(2024, 3, 7, 9, 5, 1)), "20240307090501");
    }

    #[test]
    fn test_stamps_sort_chronologically() {
        let format = VersionFormat::default();
        let mut stamps = vec![
            format.render(&at(2024, 12, 1, 0, 0, 0)),
            format.render(&at(2023, 1, 31, 23, 59, 59)),
            format.render(&at(2024, 2, 1, 0, 0, 0)),
        ];
        stamps.sort();
        assert_eq!(
            stamps,
            vec!["20230131235959", "20240201000000", "20241201000000"]
        );
    }

    #[test]
    fn test_is_version_stamp() {
        let format = VersionFormat::default();
        assert!(format.is_version_stamp("20240307090501"));
        assert!(!format.is_version_stamp("download"));
        assert!(!format.is_version_stamp("unpack"));
        assert!(!format.is_version_stamp("2024030709050"));
        assert!(!format.is_version_stamp("20241307090501"));
        assert!(!format.is_version_stamp("20240307090501.tmp"));
    }

    #[test]
    fn test_date_only_format() {
        let format = VersionFormat::new("%Y-%m-%d").unwrap();
        assert_eq!(format.render(&at(2024, 3, 7, 9, 5, 1)), "2024-03-07");
        assert!(format.is_version_stamp("2024-03-07"));
        assert!(!format.is_version_stamp("20240307"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            VersionFormat::new("%Y%Q"),
            Err(VersionFormatError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_irreversible_pattern_rejected() {
        assert!(matches!(
            VersionFormat::new("cache"),
            Err(VersionFormatError::NotReversible(_))
        ));
    }

    #[test]
    fn test_serde_validates() {
        let format: VersionFormat = serde_json::from_str("\"%Y%m%d\"").unwrap();
        assert_eq!(format.pattern(), "%Y%m%d");
        assert!(serde_json::from_str::<VersionFormat>("\"%Q\"").is_err());
        assert_eq!(
            serde_json::to_string(&VersionFormat::default()).unwrap(),
            "\"%Y%m%d%H%M%S\""
        );
    }
}
