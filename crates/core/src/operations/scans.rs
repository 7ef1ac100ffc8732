use super::Operation;
use crate::constants::{SCANS_TABLE_HEADER, SCANS_TABLE_SUFFIX, SUBJECT_PREFIX};
use crate::layout::BidsLayout;
use crate::plan::{Plan, PlannedChange, Skipped};
use crate::source::{locate_source_record, AcquisitionDate, HeaderReader, SourceLookup};
use crate::{BidsError, BidsResult};
use std::path::Path;

/// One row of a scans table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScanRow {
    /// Image path relative to the subject directory, `/` separated.
    pub filename: String,
    /// ISO-8601 acquisition date.
    pub acq_time: String,
}

/// A subject's `sub-<label>_scans.tsv`, rows sorted by filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScansTable {
    rows: Vec<ScanRow>,
}

impl ScansTable {
    pub fn new(mut rows: Vec<ScanRow>) -> Self {
        rows.sort();
        Self { rows }
    }

    pub fn rows(&self) -> &[ScanRow] {
        &self.rows
    }

    /// Tab-separated text, header first, newline terminated.
    pub fn render(&self) -> String {
        let mut out = SCANS_TABLE_HEADER.join("\t");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.filename);
            out.push('\t');
            out.push_str(&row.acq_time);
            out.push('\n');
        }
        out
    }
}

/// Plans one scans table per subject, dated from the subject's source record.
///
/// Without a usable `source_dir` the whole operation is skipped with a warning. Subjects
/// without a source record, with an unreadable or invalid date, or without any image are
/// skipped individually. Existing tables are overwritten.
///
/// # Errors
///
/// Returns `BidsError` if `source_dir` cannot be listed.
pub fn scan_tables(
    layout: &BidsLayout,
    source_dir: Option<&Path>,
    reader: &dyn HeaderReader,
) -> BidsResult<Plan> {
    let mut plan = Plan::new(Operation::ScanTables);

    let source_dir = match source_dir {
        Some(dir) if dir.is_dir() => dir,
        Some(dir) => {
            tracing::warn!(
                "dicom directory {} does not exist, skipping scans tables",
                dir.display()
            );
            plan.skip(Skipped::new(
                Operation::ScanTables.name(),
                format!("dicom directory {} does not exist", dir.display()),
            ));
            return Ok(plan);
        }
        None => {
            tracing::warn!("no dicom directory given, skipping scans tables");
            plan.skip(Skipped::new(
                Operation::ScanTables.name(),
                "no dicom directory given",
            ));
            return Ok(plan);
        }
    };

    for label in layout.subjects() {
        let subject_dir_name = format!("{SUBJECT_PREFIX}{label}");

        let record = match locate_source_record(source_dir, label)? {
            SourceLookup::Found(record) => record,
            SourceLookup::NotFound => {
                plan.skip(Skipped::new(
                    subject_dir_name,
                    format!("no source record under {}", source_dir.display()),
                ));
                continue;
            }
            SourceLookup::Ambiguous(candidates) => {
                let names: Vec<String> = candidates
                    .iter()
                    .map(|dir| dir.display().to_string())
                    .collect();
                tracing::warn!("{subject_dir_name}: several source directories match");
                plan.skip(Skipped::new(
                    subject_dir_name,
                    format!("ambiguous source directories: {}", names.join(", ")),
                ));
                continue;
            }
        };

        let raw_date = match reader.acquisition_date(&record) {
            Ok(raw) => raw,
            Err(e) => {
                let err = BidsError::HeaderRead {
                    path: record,
                    source: e,
                };
                plan.skip(Skipped::new(subject_dir_name, err.to_string()));
                continue;
            }
        };

        let date = match AcquisitionDate::parse(&raw_date) {
            Ok(date) => date,
            Err(e) => {
                plan.skip(Skipped::new(subject_dir_name, e.to_string()));
                continue;
            }
        };
        tracing::debug!("{subject_dir_name}: acquired {date} ({})", record.display());

        let rows: Vec<ScanRow> = layout
            .files()
            .iter()
            .filter(|f| {
                !f.is_derivative() && f.subject() == Some(label.as_str()) && f.entities().is_image()
            })
            .filter_map(|f| f.subject_relative_path())
            .map(|filename| ScanRow {
                filename,
                acq_time: date.to_string(),
            })
            .collect();

        if rows.is_empty() {
            plan.skip(Skipped::new(subject_dir_name, "no converted images"));
            continue;
        }

        let path = layout
            .subject_dir(label)
            .join(format!("{subject_dir_name}{SCANS_TABLE_SUFFIX}"));
        plan.push(PlannedChange::WriteTable {
            path,
            table: ScansTable::new(rows),
        });
        plan.affect(label.as_str());
    }

    Ok(plan)
}
