use super::Operation;
use crate::constants::TASK_NAME_KEY;
use crate::layout::{BidsLayout, BidsQuery};
use crate::plan::{Plan, PlannedChange, Skipped};
use crate::BidsResult;
use bids_sidecar::{Metadata, Sidecar, SIDECAR_EXTENSION};
use bids_types::Label;

/// Plans a `TaskName` merge into every sidecar tagged with a task.
///
/// Tasks are the distinct `task-<label>` values of the raw dataset; `only` restricts the run
/// to a single task. Sidecars that already carry the right `TaskName` are left out of the
/// plan, so a second run plans nothing. Unreadable sidecars are skipped.
pub fn task_names(layout: &BidsLayout, only: Option<&Label>) -> BidsResult<Plan> {
    let mut plan = Plan::new(Operation::TaskNames);
    let tasks = layout.tasks();

    if let Some(task) = only {
        if !tasks.iter().any(|t| t == task.as_str()) {
            tracing::warn!("task '{task}' not found in dataset");
            plan.skip(Skipped::new(
                format!("task-{task}"),
                "no files carry this task",
            ));
            return Ok(plan);
        }
    }

    let selected = tasks
        .iter()
        .filter(|t| only.map_or(true, |task| task.as_str() == t.as_str()));

    for task in selected {
        let query = BidsQuery::new().task(task.as_str()).extension(SIDECAR_EXTENSION);
        for file in layout.get(&query) {
            let current = match Sidecar::open(file.path()).and_then(|s| s.metadata()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    plan.skip(Skipped::new(
                        file.relative_path().display().to_string(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            if current.get(TASK_NAME_KEY).and_then(|v| v.as_str()) == Some(task.as_str()) {
                continue;
            }

            let mut fields = Metadata::new();
            fields.insert(TASK_NAME_KEY.to_string(), task.clone().into());
            plan.push(PlannedChange::MergeMetadata {
                file: file.path().to_path_buf(),
                fields,
            });
        }
        plan.affect(task.as_str());
    }

    Ok(plan)
}
