//! Planned changes.
//!
//! Operations never touch the filesystem themselves. Each returns a [`Plan`]: the ordered list
//! of changes it would make plus the items it had to skip. The orchestrator prints a plan in
//! dry-run mode and calls [`Plan::apply`] in live mode.

use crate::operations::{Operation, ScansTable};
use crate::{BidsError, BidsResult};
use bids_sidecar::{MergeOutcome, Metadata, Sidecar};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// A single filesystem or metadata mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedChange {
    /// Rename a file or directory. Never overwrites an existing destination.
    Rename {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Write (or overwrite) a scans table.
    WriteTable { path: PathBuf, table: ScansTable },
    /// Shallow-merge `fields` into a JSON sidecar.
    MergeMetadata { file: PathBuf, fields: Metadata },
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedChange::Rename {
                source,
                destination,
            } => write!(
                f,
                "{} will become {}",
                source.display(),
                destination.display()
            ),
            PlannedChange::WriteTable { path, table } => write!(
                f,
                "{} will be written ({} rows)",
                path.display(),
                table.rows().len()
            ),
            PlannedChange::MergeMetadata { file, fields } => {
                let rendered = serde_json::Value::Object(fields.clone());
                write!(f, "{} will gain {}", file.display(), rendered)
            }
        }
    }
}

/// An item an operation could not handle, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub item: String,
    pub reason: String,
}

impl Skipped {
    pub fn new(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.item, self.reason)
    }
}

/// Counts of what [`Plan::apply`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub renamed: usize,
    pub tables_written: usize,
    pub sidecars_updated: usize,
    pub sidecars_unchanged: usize,
}

/// The output of one operation.
#[derive(Debug, Clone)]
pub struct Plan {
    operation: Operation,
    changes: Vec<PlannedChange>,
    skipped: Vec<Skipped>,
    affected: Vec<String>,
}

impl Plan {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            changes: Vec::new(),
            skipped: Vec::new(),
            affected: Vec::new(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn changes(&self) -> &[PlannedChange] {
        &self.changes
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    /// Identifiers (subject or task labels) the plan touches, sorted.
    pub fn affected(&self) -> &[String] {
        &self.affected
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn push(&mut self, change: PlannedChange) {
        self.changes.push(change);
    }

    pub(crate) fn skip(&mut self, skipped: Skipped) {
        self.skipped.push(skipped);
    }

    pub(crate) fn affect(&mut self, identifier: impl Into<String>) {
        let identifier = identifier.into();
        if let Err(pos) = self.affected.binary_search(&identifier) {
            self.affected.insert(pos, identifier);
        }
    }

    /// Executes every change in order.
    ///
    /// Execution stops at the first failure. Changes already applied are not rolled back.
    ///
    /// # Errors
    ///
    /// Returns `BidsError` if a rename destination already exists, or any rename, table write
    /// or sidecar merge fails.
    pub fn apply(&self) -> BidsResult<ApplyReport> {
        let mut report = ApplyReport::default();

        for change in &self.changes {
            match change {
                PlannedChange::Rename {
                    source,
                    destination,
                } => {
                    if destination.exists() {
                        return Err(BidsError::DestinationExists {
                            from: source.clone(),
                            to: destination.clone(),
                        });
                    }
                    fs::rename(source, destination).map_err(|e| BidsError::Rename {
                        from: source.clone(),
                        to: destination.clone(),
                        source: e,
                    })?;
                    tracing::info!(
                        "renamed {} to {}",
                        source.display(),
                        destination.display()
                    );
                    report.renamed += 1;
                }
                PlannedChange::WriteTable { path, table } => {
                    fs::write(path, table.render()).map_err(|source| BidsError::FileWrite {
                        path: path.clone(),
                        source,
                    })?;
                    tracing::info!("wrote {}", path.display());
                    report.tables_written += 1;
                }
                PlannedChange::MergeMetadata { file, fields } => {
                    match Sidecar::open(file)?.merge(fields)? {
                        MergeOutcome::Updated => {
                            tracing::info!("updated {}", file.display());
                            report.sidecars_updated += 1;
                        }
                        MergeOutcome::Unchanged => report.sidecars_unchanged += 1,
                    }
                }
            }
        }

        Ok(report)
    }
}
