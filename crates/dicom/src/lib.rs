//! # BIDS DICOM
//!
//! Reads acquisition dates from DICOM headers for the scans tables.
//!
//! The date is taken from the first of `AcquisitionDate`, `SeriesDate` and `StudyDate` that is
//! present and non-empty. The raw `DA` value (`YYYYMMDD`) is returned untouched; validation and
//! ISO formatting happen in `bids_core::AcquisitionDate`.

use bids_core::HeaderReader;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::open_file;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DicomError {
    #[error("failed to open DICOM file {path}: {message}", path = path.display())]
    Open { path: PathBuf, message: String },
    #[error("no acquisition, series or study date in {}", .0.display())]
    MissingDate(PathBuf),
}

pub type DicomResult<T> = std::result::Result<T, DicomError>;

/// Date attributes tried in order.
const DATE_TAGS: [Tag; 3] = [tags::ACQUISITION_DATE, tags::SERIES_DATE, tags::STUDY_DATE];

/// Reads the raw acquisition date of the DICOM file at `path`.
///
/// # Errors
///
/// - `DicomError::Open` if the file is not a readable DICOM file
/// - `DicomError::MissingDate` if none of the date attributes holds a value
pub fn read_acquisition_date(path: &Path) -> DicomResult<String> {
    let obj = open_file(path).map_err(|e| DicomError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    for tag in DATE_TAGS {
        let Ok(element) = obj.element(tag) else {
            continue;
        };
        let Ok(value) = element.to_str() else {
            continue;
        };
        let value = value.trim();
        if !value.is_empty() {
            tracing::debug!("{}: {tag} = {value}", path.display());
            return Ok(value.to_string());
        }
    }

    Err(DicomError::MissingDate(path.to_path_buf()))
}

/// [`HeaderReader`] backed by the `dicom` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomHeaderReader;

impl DicomHeaderReader {
    pub fn new() -> Self {
        Self
    }
}

impl HeaderReader for DicomHeaderReader {
    fn acquisition_date(
        &self,
        record: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(read_acquisition_date(record)?)
    }
}
