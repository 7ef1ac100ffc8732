//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into [`crate::BidsFixer`].
//! Operations never read environment variables or command-line state themselves.

use crate::validation::validate_subject_filter;
use crate::{BidsError, BidsResult};
use bids_types::Label;
use std::path::{Path, PathBuf};

/// Whether planned changes are applied or only reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Report every planned change, touch nothing.
    #[default]
    DryRun,
    /// Apply every planned change.
    Live,
}

impl RunMode {
    pub fn is_live(self) -> bool {
        matches!(self, RunMode::Live)
    }
}

/// How many images a fieldmap's `IntendedFor` lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntendedForPolicy {
    /// Every image of the subject sharing the fieldmap's tag.
    #[default]
    All,
    /// Only the tagged image whose file name is closest to the fieldmap's. Fieldmaps tagged
    /// `func` still list every functional image.
    BestMatch,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    dataset_root: PathBuf,
    subject_filter: String,
    dicom_dir: Option<PathBuf>,
    task_filter: Option<Label>,
    run_mode: RunMode,
    intended_for: IntendedForPolicy,
}

impl CoreConfig {
    /// Create a new `CoreConfig` for the dataset at `dataset_root`.
    ///
    /// The root is canonicalised. Every other setting starts at its default: empty subject
    /// filter, no DICOM directory, no task filter, dry run, [`IntendedForPolicy::All`].
    ///
    /// # Errors
    ///
    /// - `BidsError::DatasetNotFound` if `dataset_root` does not exist
    /// - `BidsError::NotADirectory` if it exists but is not a directory
    pub fn new(dataset_root: impl AsRef<Path>) -> BidsResult<Self> {
        let dataset_root = dataset_root.as_ref();
        if !dataset_root.exists() {
            return Err(BidsError::DatasetNotFound(dataset_root.to_path_buf()));
        }
        if !dataset_root.is_dir() {
            return Err(BidsError::NotADirectory(dataset_root.to_path_buf()));
        }

        let dataset_root = dataset_root
            .canonicalize()
            .map_err(|source| BidsError::DirectoryRead {
                path: dataset_root.to_path_buf(),
                source,
            })?;

        Ok(Self {
            dataset_root,
            subject_filter: String::new(),
            dicom_dir: None,
            task_filter: None,
            run_mode: RunMode::default(),
            intended_for: IntendedForPolicy::default(),
        })
    }

    /// Sets the substring a bare directory name must contain to be prefixed.
    ///
    /// # Errors
    ///
    /// Returns `BidsError::InvalidInput` if the filter is not a plain name fragment.
    pub fn with_subject_filter(mut self, filter: impl Into<String>) -> BidsResult<Self> {
        let filter = filter.into();
        validate_subject_filter(&filter)?;
        self.subject_filter = filter;
        Ok(self)
    }

    pub fn with_dicom_dir(mut self, dicom_dir: Option<PathBuf>) -> Self {
        self.dicom_dir = dicom_dir;
        self
    }

    pub fn with_task_filter(mut self, task: Option<Label>) -> Self {
        self.task_filter = task;
        self
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn with_intended_for(mut self, policy: IntendedForPolicy) -> Self {
        self.intended_for = policy;
        self
    }

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    pub fn subject_filter(&self) -> &str {
        &self.subject_filter
    }

    pub fn dicom_dir(&self) -> Option<&Path> {
        self.dicom_dir.as_deref()
    }

    pub fn task_filter(&self) -> Option<&Label> {
        self.task_filter.as_ref()
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn intended_for(&self) -> IntendedForPolicy {
        self.intended_for
    }
}
