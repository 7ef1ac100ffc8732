//! Source acquisition records.
//!
//! The scans table needs the acquisition date of each subject's session. That date lives in
//! the source (DICOM) headers, not in the converted dataset. Reading headers is delegated to a
//! [`HeaderReader`] so the core stays free of any DICOM dependency; `bids_dicom` provides the
//! production implementation.

use crate::constants::SUBJECT_PREFIX;
use crate::{BidsError, BidsResult};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reads the acquisition date from a source record.
pub trait HeaderReader {
    /// Returns the raw 8-digit acquisition date (`YYYYMMDD`) of the record at `record`.
    fn acquisition_date(
        &self,
        record: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// A validated acquisition date.
///
/// Parsed from the DICOM `DA` form (`YYYYMMDD`) and displayed in ISO-8601 (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AcquisitionDate(NaiveDate);

impl AcquisitionDate {
    /// Parses an 8-digit date. Surrounding whitespace (DICOM padding) is ignored.
    ///
    /// # Errors
    ///
    /// Returns `BidsError::InvalidAcquisitionDate` if the input is not exactly eight digits or
    /// is not a calendar date.
    pub fn parse(raw: &str) -> BidsResult<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BidsError::InvalidAcquisitionDate(raw.to_string()));
        }

        NaiveDate::parse_from_str(trimmed, "%Y%m%d")
            .map(Self)
            .map_err(|_| BidsError::InvalidAcquisitionDate(raw.to_string()))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl std::fmt::Display for AcquisitionDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Outcome of [`locate_source_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLookup {
    /// The record to read.
    Found(PathBuf),
    /// No directory matches the label, or the matching directory holds no file.
    NotFound,
    /// More than one directory ends with the label; none is chosen.
    Ambiguous(Vec<PathBuf>),
}

/// Finds the source record to read for a subject.
///
/// Candidate directories are the direct children of `source_dir` named exactly `<label>` or
/// `sub-<label>`. Failing that, those whose name ends with `<label>` preceded by a
/// non-alphanumeric character (scanner exports often carry a study prefix, e.g. `STUDY_01`;
/// `STUDY_101` is not a candidate for `01`). Several such directories make the lookup
/// ambiguous. The last file in sorted order below the chosen directory is the record.
///
/// # Errors
///
/// Returns `BidsError` if `source_dir` or the chosen directory cannot be read.
pub fn locate_source_record(source_dir: &Path, label: &str) -> BidsResult<SourceLookup> {
    let mut exact = None;
    let mut suffixed = Vec::new();

    let entries = fs::read_dir(source_dir).map_err(|source| BidsError::DirectoryRead {
        path: source_dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| BidsError::DirectoryRead {
            path: source_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if name == label || name == format!("{SUBJECT_PREFIX}{label}") {
            exact = Some(path);
        } else if ends_with_label(&name, label) {
            suffixed.push(path);
        }
    }

    let record_dir = match exact {
        Some(dir) => dir,
        None => match suffixed.len() {
            0 => return Ok(SourceLookup::NotFound),
            1 => suffixed.remove(0),
            _ => {
                suffixed.sort();
                return Ok(SourceLookup::Ambiguous(suffixed));
            }
        },
    };

    let mut last = None;
    for entry in WalkDir::new(&record_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && !entry.file_name().to_string_lossy().starts_with('.') {
            last = Some(entry.into_path());
        }
    }

    Ok(last.map_or(SourceLookup::NotFound, SourceLookup::Found))
}

/// `name` ends with `label` and the label starts at the beginning of `name` or right after a
/// non-alphanumeric character.
fn ends_with_label(name: &str, label: &str) -> bool {
    name.strip_suffix(label).is_some_and(|head| {
        head.is_empty() || !head.ends_with(|c: char| c.is_ascii_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_acquisition_date_formats_iso() {
        let date = AcquisitionDate::parse("20170315").unwrap();
        assert_eq!(date.to_string(), "2017-03-15");
    }

    #[test]
    fn test_acquisition_date_ignores_padding() {
        let date = AcquisitionDate::parse("20170315 ").unwrap();
        assert_eq!(date.to_string(), "2017-03-15");
    }

    #[test]
    fn test_acquisition_date_rejects_bad_input() {
        for raw in ["2017031", "2017-03-15", "20171315", "abcdefgh", ""] {
            assert!(
                matches!(
                    AcquisitionDate::parse(raw),
                    Err(BidsError::InvalidAcquisitionDate(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_locate_prefers_exact_directory() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "STUDY_01/series1/IM0001");
        touch(temp.path(), "01/series1/IM0001");
        touch(temp.path(), "01/series2/IM0002");

        assert_eq!(
            locate_source_record(temp.path(), "01").unwrap(),
            SourceLookup::Found(temp.path().join("01/series2/IM0002"))
        );
    }

    #[test]
    fn test_locate_falls_back_to_suffix_match() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "STUDY_01/series1/IM0001");
        touch(temp.path(), "STUDY_02/series1/IM0001");

        assert_eq!(
            locate_source_record(temp.path(), "01").unwrap(),
            SourceLookup::Found(temp.path().join("STUDY_01/series1/IM0001"))
        );
    }

    #[test]
    fn test_locate_returns_none_without_candidates() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "STUDY_02/series1/IM0001");
        assert_eq!(
            locate_source_record(temp.path(), "01").unwrap(),
            SourceLookup::NotFound
        );
    }

    #[test]
    fn test_locate_ignores_longer_label_with_same_ending() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "STUDY_01/series1/IM0001");
        touch(temp.path(), "STUDY_101/series1/IM0001");

        assert_eq!(
            locate_source_record(temp.path(), "01").unwrap(),
            SourceLookup::Found(temp.path().join("STUDY_01/series1/IM0001"))
        );
        assert_eq!(
            locate_source_record(temp.path(), "101").unwrap(),
            SourceLookup::Found(temp.path().join("STUDY_101/series1/IM0001"))
        );
    }

    #[test]
    fn test_locate_reports_ambiguous_suffix_matches() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "PILOT_01/series1/IM0001");
        touch(temp.path(), "STUDY_01/series1/IM0001");

        assert_eq!(
            locate_source_record(temp.path(), "01").unwrap(),
            SourceLookup::Ambiguous(vec![
                temp.path().join("PILOT_01"),
                temp.path().join("STUDY_01"),
            ])
        );
    }

    #[test]
    fn test_label_boundary() {
        assert!(ends_with_label("STUDY_01", "01"));
        assert!(ends_with_label("STUDY-01", "01"));
        assert!(!ends_with_label("STUDY_101", "01"));
        assert!(!ends_with_label("STUDYA01", "01"));
        assert!(!ends_with_label("STUDY_02", "01"));
    }
}
