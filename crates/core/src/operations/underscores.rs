use super::Operation;
use crate::constants::{ENTITY_SEPARATOR, SOURCEDATA_DIR_NAME, SUBJECT_PREFIX};
use crate::plan::{Plan, PlannedChange, Skipped};
use crate::{BidsError, BidsResult};
use bids_types::Label;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Plans the removal of `_` from subject directory names, cascading into the files they hold.
///
/// For every top-level `sub-*` directory whose name contains `_`, the plan holds:
///
/// 1. the directory rename (`sub-01_A` -> `sub-01A`)
/// 2. a rename for every file below it whose name contains the old token, addressed at its
///    post-rename location (`sub-01A/func/sub-01_A_bold.nii.gz` ->
///    `sub-01A/func/sub-01A_bold.nii.gz`)
/// 3. a rename for every top-level `sourcedata/` entry whose name carries the old token as a
///    whole label (`sourcedata/sub-01_AB` does not carry `sub-01_A`)
///
/// All candidates are planned, in dry-run as in live mode. A subject whose corrected label is
/// still not alphanumeric is skipped.
///
/// # Errors
///
/// - `BidsError::DestinationExists` if a corrected name is already taken, on disk or by another
///   subject in the same plan
/// - `BidsError::UnsupportedLayout` if a directory below the subject also carries the old token
/// - `BidsError::DirectoryRead` / `BidsError::Walk` if the tree cannot be read
pub fn normalise_underscores(root: &Path) -> BidsResult<Plan> {
    let mut plan = Plan::new(Operation::NormaliseUnderscores);
    let mut claimed = BTreeSet::new();
    let mut planned_sources = BTreeSet::new();
    let mut planned_destinations = BTreeSet::new();

    for old_name in underscored_subject_dirs(root)? {
        let new_name: String = old_name
            .chars()
            .filter(|c| *c != ENTITY_SEPARATOR)
            .collect();

        let new_label = &new_name[SUBJECT_PREFIX.len()..];
        if !Label::is_valid(new_label) {
            tracing::warn!("{old_name}: corrected label '{new_label}' is not alphanumeric");
            plan.skip(Skipped::new(
                old_name.clone(),
                format!("corrected label '{new_label}' is not alphanumeric"),
            ));
            continue;
        }

        let old_dir = root.join(&old_name);
        let new_dir = root.join(&new_name);
        if new_dir.exists() || !claimed.insert(new_name.clone()) {
            return Err(BidsError::DestinationExists {
                from: old_dir,
                to: new_dir,
            });
        }

        plan.push(PlannedChange::Rename {
            source: old_dir.clone(),
            destination: new_dir.clone(),
        });

        for (relative_parent, file_name) in files_carrying_token(&old_dir, &old_name)? {
            let renamed = replace_token(&file_name, &old_name, &new_name);
            if old_dir.join(&relative_parent).join(&renamed).exists() {
                return Err(BidsError::DestinationExists {
                    from: old_dir.join(&relative_parent).join(&file_name),
                    to: old_dir.join(&relative_parent).join(&renamed),
                });
            }
            plan.push(PlannedChange::Rename {
                source: new_dir.join(&relative_parent).join(&file_name),
                destination: new_dir.join(&relative_parent).join(renamed),
            });
        }

        let sourcedata = root.join(SOURCEDATA_DIR_NAME);
        if sourcedata.is_dir() {
            let entries = entries_carrying_token(&sourcedata, &old_name)?
                .into_iter()
                .filter(|name| carries_token(name, &old_name));
            for entry_name in entries {
                let source = sourcedata.join(&entry_name);
                let destination = sourcedata.join(replace_token(&entry_name, &old_name, &new_name));
                if !planned_sources.insert(source.clone()) {
                    return Err(BidsError::UnsupportedLayout(format!(
                        "{} carries more than one subject token",
                        source.display()
                    )));
                }
                if destination.exists() || !planned_destinations.insert(destination.clone()) {
                    return Err(BidsError::DestinationExists {
                        from: source,
                        to: destination,
                    });
                }
                plan.push(PlannedChange::Rename {
                    source,
                    destination,
                });
            }
        }

        plan.affect(&old_name[SUBJECT_PREFIX.len()..]);
    }

    Ok(plan)
}

fn underscored_subject_dirs(root: &Path) -> BidsResult<Vec<String>> {
    let mut names = entries_carrying_token(root, SUBJECT_PREFIX)?
        .into_iter()
        .filter(|name| {
            name.starts_with(SUBJECT_PREFIX)
                && name.contains(ENTITY_SEPARATOR)
                && root.join(name).is_dir()
        })
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Names of the direct children of `dir` containing `token`, sorted.
fn entries_carrying_token(dir: &Path, token: &str) -> BidsResult<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|source| BidsError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BidsError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        })?;
        if let Some(name) = entry.file_name().to_str() {
            if name.contains(token) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Byte offsets of the occurrences of `token` in `name` that are not part of a longer
/// alphanumeric run (`sub-01_A` occurs in `sub-01_A_T1w` but not in `sub-01_AB`).
fn token_offsets(name: &str, token: &str) -> Vec<usize> {
    name.match_indices(token)
        .map(|(idx, _)| idx)
        .filter(|&idx| {
            let before = name[..idx].chars().next_back();
            let after = name[idx + token.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphanumeric())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
        .collect()
}

fn carries_token(name: &str, token: &str) -> bool {
    !token_offsets(name, token).is_empty()
}

/// Replaces every bounded occurrence of `token` in `name`.
fn replace_token(name: &str, token: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = 0;
    for idx in token_offsets(name, token) {
        out.push_str(&name[rest..idx]);
        out.push_str(replacement);
        rest = idx + token.len();
    }
    out.push_str(&name[rest..]);
    out
}

/// Files below `subject_dir` whose name carries `token`, as (parent relative to
/// `subject_dir`, file name), in path order.
fn files_carrying_token(subject_dir: &Path, token: &str) -> BidsResult<Vec<(PathBuf, String)>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(subject_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !carries_token(name, token) {
            continue;
        }

        if entry.file_type().is_dir() {
            return Err(BidsError::UnsupportedLayout(format!(
                "directory {} inside {} carries the subject token '{}'; nested subject-named \
                 directories are not supported",
                entry.path().display(),
                subject_dir.display(),
                token
            )));
        }

        let relative_parent = entry
            .path()
            .parent()
            .and_then(|parent| parent.strip_prefix(subject_dir).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        found.push((relative_parent, name.to_string()));
    }

    Ok(found)
}
