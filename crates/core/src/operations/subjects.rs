use super::Operation;
use crate::constants::{RESERVED_TOP_LEVEL_DIRS, SUBJECT_PREFIX};
use crate::plan::{Plan, PlannedChange};
use crate::{BidsError, BidsResult};
use std::fs;
use std::path::Path;

/// Plans `<root>/<name>` -> `<root>/sub-<name>` for every bare subject directory.
///
/// A top-level directory is a bare subject when its name contains `filter` and does not
/// already contain the `sub-` marker. Hidden entries and BIDS reserved directories
/// (`sourcedata`, `derivatives`, `code`, ...) are never candidates. An empty filter matches
/// every candidate. The plan's affected identifiers are the matched names, sorted.
///
/// # Errors
///
/// Returns `BidsError::DirectoryRead` if `root` cannot be listed.
pub fn prefix_subjects(root: &Path, filter: &str) -> BidsResult<Plan> {
    let mut names = Vec::new();

    let entries = fs::read_dir(root).map_err(|source| BidsError::DirectoryRead {
        path: root.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| BidsError::DirectoryRead {
            path: root.to_path_buf(),
            source,
        })?;

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if name.starts_with('.') || RESERVED_TOP_LEVEL_DIRS.contains(&name.as_str()) {
            continue;
        }
        if !entry.path().is_dir() {
            continue;
        }
        if name.contains(SUBJECT_PREFIX) || !name.contains(filter) {
            continue;
        }

        names.push(name);
    }

    names.sort();

    let mut plan = Plan::new(Operation::PrefixSubjects);
    for name in names {
        plan.push(PlannedChange::Rename {
            source: root.join(&name),
            destination: root.join(format!("{SUBJECT_PREFIX}{name}")),
        });
        plan.affect(name);
    }

    Ok(plan)
}
