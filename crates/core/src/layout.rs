//! Dataset directory index.
//!
//! [`BidsLayout`] is an immutable snapshot of the dataset tree taken at construction. It does
//! not observe later changes: after any rename the orchestrator must build a new snapshot
//! (see [`crate::BidsFixer::reindex`]) before querying again.
//!
//! Indexed tree:
//!
//! ```text
//! <root>/
//! ├── dataset_description.json
//! ├── sub-01/
//! │   ├── sub-01_scans.tsv
//! │   ├── [ses-1/]
//! │   ├── anat/
//! │   ├── fmap/
//! │   └── func/
//! ├── derivatives/          # indexed, flagged as derivative
//! ├── sourcedata/           # not indexed
//! └── code/                 # not indexed
//! ```

use crate::constants::{
    DERIVATIVES_DIR_NAME, SESSION_PREFIX, SUBJECT_PREFIX, UNINDEXED_TOP_LEVEL_DIRS,
};
use crate::entities::Entities;
use crate::{BidsError, BidsResult};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// One indexed file.
#[derive(Debug, Clone)]
pub struct BidsFile {
    path: PathBuf,
    relative_path: PathBuf,
    entities: Entities,
    subject: Option<String>,
    datatype: Option<String>,
    is_derivative: bool,
}

impl BidsFile {
    /// Absolute path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path relative to the dataset root.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Subject label taken from the enclosing `sub-<label>` directory.
    ///
    /// The directory is authoritative over the filename so that files are attributed to the
    /// subject directory they live in, even before underscore normalisation.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Name of the directory holding the file (`anat`, `func`, `fmap`, ...), if the file is
    /// not directly inside a subject or session directory.
    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    pub fn is_derivative(&self) -> bool {
        self.is_derivative
    }

    /// Path relative to the subject directory, with `/` separators.
    ///
    /// This is the form BIDS uses for `IntendedFor` entries and scans tables, e.g.
    /// `func/sub-01_task-rest_bold.nii.gz`.
    pub fn subject_relative_path(&self) -> Option<String> {
        let subject = self.subject.as_deref()?;
        let subject_dir = format!("{SUBJECT_PREFIX}{subject}");

        let components: Vec<&str> = self
            .relative_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();

        let start = components.iter().position(|c| *c == subject_dir)?;
        let rest = &components[start + 1..];
        if rest.is_empty() {
            return None;
        }
        Some(rest.join("/"))
    }
}

/// Attribute filter for [`BidsLayout::get`].
///
/// Unset fields match everything. Derivatives are excluded unless explicitly included.
#[derive(Debug, Clone, Default)]
pub struct BidsQuery {
    subject: Option<String>,
    session: Option<String>,
    task: Option<String>,
    datatype: Option<String>,
    suffix: Option<String>,
    extension: Option<String>,
    include_derivatives: bool,
}

impl BidsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Extension with or without the leading dot.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.extension = Some(if extension.starts_with('.') {
            extension
        } else {
            format!(".{extension}")
        });
        self
    }

    pub fn include_derivatives(mut self, include: bool) -> Self {
        self.include_derivatives = include;
        self
    }

    fn matches(&self, file: &BidsFile) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            wanted.as_deref().map_or(true, |w| actual == Some(w))
        }

        (self.include_derivatives || !file.is_derivative)
            && field_matches(&self.subject, file.subject())
            && field_matches(&self.session, file.entities.session())
            && field_matches(&self.task, file.entities.task())
            && field_matches(&self.datatype, file.datatype())
            && field_matches(&self.suffix, file.entities.suffix())
            && field_matches(&self.extension, file.entities.extension())
    }
}

/// Immutable index of a dataset tree.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
    subjects: Vec<String>,
    files: Vec<BidsFile>,
}

impl BidsLayout {
    /// Walks `root` and indexes every file.
    ///
    /// Hidden entries and the `sourcedata/` and `code/` top-level directories are skipped.
    /// Files are held in path order.
    ///
    /// # Errors
    ///
    /// Returns `BidsError` if `root` is not a directory or the walk fails.
    pub fn index(root: &Path) -> BidsResult<Self> {
        if !root.is_dir() {
            return Err(BidsError::NotADirectory(root.to_path_buf()));
        }

        let mut subjects = Vec::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry));

        for entry in walker {
            let entry = entry?;
            let name = match entry.file_name().to_str() {
                Some(name) => name.to_string(),
                None => {
                    tracing::debug!("skipping non UTF-8 path: {}", entry.path().display());
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if entry.depth() == 1 {
                    if let Some(label) = name.strip_prefix(SUBJECT_PREFIX) {
                        subjects.push(label.to_string());
                    }
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let relative_path = entry
                .path()
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(&name));

            files.push(describe_file(entry.path(), relative_path, &name));
        }

        tracing::debug!(
            "indexed {} files across {} subjects under {}",
            files.len(),
            subjects.len(),
            root.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            subjects,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Labels of the top-level `sub-<label>` directories, sorted.
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    /// Absolute path of a subject's directory.
    pub fn subject_dir(&self, label: &str) -> PathBuf {
        self.root.join(format!("{SUBJECT_PREFIX}{label}"))
    }

    /// Distinct task labels across raw (non-derivative) files, sorted.
    pub fn tasks(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| !f.is_derivative)
            .filter_map(|f| f.entities.task())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn files(&self) -> &[BidsFile] {
        &self.files
    }

    /// Files matching every set attribute of `query`, in path order.
    pub fn get(&self, query: &BidsQuery) -> Vec<&BidsFile> {
        self.files.iter().filter(|f| query.matches(f)).collect()
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.depth() == 1 && entry.file_type().is_dir() && UNINDEXED_TOP_LEVEL_DIRS.contains(&&*name)
}

fn describe_file(path: &Path, relative_path: PathBuf, name: &str) -> BidsFile {
    let dirs: Vec<&str> = relative_path
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => part.to_str(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let is_derivative = dirs.first() == Some(&DERIVATIVES_DIR_NAME);

    let subject = dirs
        .iter()
        .find_map(|d| d.strip_prefix(SUBJECT_PREFIX))
        .map(str::to_string);

    let datatype = dirs
        .last()
        .filter(|d| {
            subject.is_some()
                && !d.starts_with(SUBJECT_PREFIX)
                && !d.starts_with(SESSION_PREFIX)
        })
        .map(|d| d.to_string());

    BidsFile {
        path: path.to_path_buf(),
        relative_path,
        entities: Entities::parse(name),
        subject,
        datatype,
        is_derivative,
    }
}
