//! Fieldmap `IntendedFor` / `TotalReadoutTime` patching.
//!
//! A fieldmap names the images it corrects through a tag in its filename. The tag is read with
//! two patterns, tried in order:
//!
//! 1. the acquisition entity, `acq-<label>` (`sub-01_acq-func_dir-AP_epi.json` -> `func`)
//! 2. the phase-encoding direction entity, `dir-<label>` (`sub-01_dir-AP_epi.json` -> `AP`)
//!
//! An image shares the tag when its datatype directory, acquisition, direction or task equals
//! the tag label. `acq-func` therefore selects every functional run of the subject.

use super::Operation;
use crate::config::IntendedForPolicy;
use crate::constants::{
    EFFECTIVE_ECHO_SPACING_KEY, FMAP_DATATYPE, FUNC_DATATYPE, INTENDED_FOR_KEY,
    MATRIX_DIMENSION_KEYS, READOUT_TIME_DECIMALS, TOTAL_READOUT_TIME_KEY,
};
use crate::layout::{BidsFile, BidsLayout, BidsQuery};
use crate::plan::{Plan, PlannedChange, Skipped};
use crate::{BidsError, BidsResult};
use bids_sidecar::{Metadata, Sidecar, SIDECAR_EXTENSION};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Which filename pattern produced a [`FieldmapTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Acquisition,
    Direction,
}

/// The tag linking a fieldmap to the images it corrects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldmapTag {
    pub kind: TagKind,
    pub label: String,
}

impl FieldmapTag {
    fn selects(&self, image: &BidsFile) -> bool {
        let entities = image.entities();
        [
            image.datatype(),
            entities.acquisition(),
            entities.direction(),
            entities.task(),
        ]
        .into_iter()
        .flatten()
        .any(|value| value == self.label)
    }
}

const ACQ_TAG_PATTERN: &str = r"(?:^|_)acq-([A-Za-z0-9]+)(?:[_.]|$)";
const DIR_TAG_PATTERN: &str = r"(?:^|_)dir-([A-Za-z0-9]+)(?:[_.]|$)";

fn tag_patterns() -> BidsResult<&'static [(TagKind, Regex); 2]> {
    static PATTERNS: OnceLock<Result<[(TagKind, Regex); 2], regex::Error>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Ok([
                (TagKind::Acquisition, Regex::new(ACQ_TAG_PATTERN)?),
                (TagKind::Direction, Regex::new(DIR_TAG_PATTERN)?),
            ])
        })
        .as_ref()
        .map_err(|e| BidsError::Pattern(e.clone()))
}

/// Parses the fieldmap tag from a file name, or `None` when neither pattern matches.
///
/// # Errors
///
/// Returns `BidsError::Pattern` if the tag patterns fail to compile.
pub fn fieldmap_tag(file_name: &str) -> BidsResult<Option<FieldmapTag>> {
    Ok(tag_patterns()?.iter().find_map(|(kind, pattern)| {
        pattern.captures(file_name).map(|caps| FieldmapTag {
            kind: *kind,
            label: caps[1].to_string(),
        })
    }))
}

/// `(matrix dimension - 1) * effective echo spacing`, rounded to nine decimals.
///
/// The matrix dimension is read from `ReconMatrixPE`, then `AcquisitionMatrixPE`, then the
/// legacy nested `global.const.AcquisitionMatrix[0]`. Returns `None` when either input is
/// missing or the result is not a positive finite number.
pub fn total_readout_time(metadata: &Metadata) -> Option<f64> {
    let matrix = MATRIX_DIMENSION_KEYS
        .iter()
        .find_map(|key| metadata.get(*key).and_then(Value::as_f64))
        .or_else(|| {
            metadata
                .get("global")?
                .get("const")?
                .get("AcquisitionMatrix")?
                .get(0)?
                .as_f64()
        })?;
    let echo_spacing = metadata
        .get(EFFECTIVE_ECHO_SPACING_KEY)
        .and_then(Value::as_f64)?;

    let readout = (matrix - 1.0) * echo_spacing;
    if !readout.is_finite() || readout <= 0.0 {
        return None;
    }

    let scale = 10f64.powi(READOUT_TIME_DECIMALS);
    Some((readout * scale).round() / scale)
}

/// Plans `IntendedFor` and `TotalReadoutTime` for every fieldmap sidecar.
///
/// Fieldmap sidecars are the JSON files of the `fmap` datatype. A fieldmap is skipped, not
/// fatal, when its tag cannot be parsed, its sidecar cannot be read, its readout inputs are
/// missing, or no image of the same subject shares its tag. Fieldmaps and derivatives are
/// never listed in `IntendedFor`.
pub fn fieldmaps(layout: &BidsLayout, policy: IntendedForPolicy) -> BidsResult<Plan> {
    let mut plan = Plan::new(Operation::Fieldmaps);
    let query = BidsQuery::new()
        .datatype(FMAP_DATATYPE)
        .extension(SIDECAR_EXTENSION);

    for fmap in layout.get(&query) {
        let item = fmap.relative_path().display().to_string();

        let Some(tag) = fieldmap_tag(fmap.file_name())? else {
            tracing::warn!("{item}: no acq- or dir- tag in filename");
            plan.skip(Skipped::new(item, "no acq- or dir- tag in filename"));
            continue;
        };

        let Some(subject) = fmap.subject() else {
            plan.skip(Skipped::new(item, "not inside a subject directory"));
            continue;
        };

        let metadata = match Sidecar::open(fmap.path()).and_then(|s| s.metadata()) {
            Ok(metadata) => metadata,
            Err(e) => {
                plan.skip(Skipped::new(item, e.to_string()));
                continue;
            }
        };

        let Some(readout) = total_readout_time(&metadata) else {
            plan.skip(Skipped::new(
                item,
                "missing phase-encoding matrix size or EffectiveEchoSpacing",
            ));
            continue;
        };

        let images: Vec<&BidsFile> = layout
            .get(&BidsQuery::new().subject(subject))
            .into_iter()
            .filter(|f| {
                f.entities().is_image() && f.datatype() != Some(FMAP_DATATYPE) && tag.selects(f)
            })
            .collect();

        let Some(intended) = intended_for(&images, fmap, &tag, policy) else {
            plan.skip(Skipped::new(
                item,
                format!("no images share tag '{}'", tag.label),
            ));
            continue;
        };
        tracing::debug!("{item}: tag {:?} selects {} images", tag, intended.len());

        let mut fields = Metadata::new();
        fields.insert(
            INTENDED_FOR_KEY.to_string(),
            Value::Array(intended.into_iter().map(Value::String).collect()),
        );
        fields.insert(TOTAL_READOUT_TIME_KEY.to_string(), Value::from(readout));

        plan.push(PlannedChange::MergeMetadata {
            file: fmap.path().to_path_buf(),
            fields,
        });
        plan.affect(subject);
    }

    Ok(plan)
}

fn intended_for(
    images: &[&BidsFile],
    fmap: &BidsFile,
    tag: &FieldmapTag,
    policy: IntendedForPolicy,
) -> Option<Vec<String>> {
    let best_match_only = policy == IntendedForPolicy::BestMatch && tag.label != FUNC_DATATYPE;

    let chosen: Vec<&BidsFile> = if best_match_only {
        let target = stem(fmap.file_name());
        let mut best: Option<(f64, &BidsFile)> = None;
        for image in images {
            let score = strsim::normalized_levenshtein(stem(image.file_name()), target);
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, image));
            }
        }
        best.map(|(_, image)| vec![image]).unwrap_or_default()
    } else {
        images.to_vec()
    };

    let mut paths: Vec<String> = chosen
        .into_iter()
        .filter_map(|f| f.subject_relative_path())
        .collect();
    paths.sort();

    (!paths.is_empty()).then_some(paths)
}

fn stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    const FMAP_META: &str = r#"{"ReconMatrixPE": 64, "EffectiveEchoSpacing": 0.0005}"#;

    fn create_dataset() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "sub-01/fmap/sub-01_acq-func_dir-AP_epi.json", FMAP_META);
        write(root, "sub-01/fmap/sub-01_acq-func_dir-AP_epi.nii.gz", "");
        write(root, "sub-01/func/sub-01_task-rest_bold.nii.gz", "");
        write(root, "sub-01/func/sub-01_task-rest_bold.json", "{}");
        write(root, "sub-01/func/sub-01_task-nback_bold.nii.gz", "");
        write(root, "sub-01/anat/sub-01_T1w.nii.gz", "");
        write(
            root,
            "derivatives/prep/sub-01/func/sub-01_task-rest_desc-preproc_bold.nii.gz",
            "",
        );
        write(root, "sub-02/func/sub-02_task-rest_bold.nii.gz", "");
        temp
    }

    #[test]
    fn test_tag_prefers_acquisition_entity() {
        let tag = fieldmap_tag("sub-01_acq-func_dir-AP_epi.json").unwrap().unwrap();
        assert_eq!(tag.kind, TagKind::Acquisition);
        assert_eq!(tag.label, "func");
    }

    #[test]
    fn test_tag_falls_back_to_direction_entity() {
        let tag = fieldmap_tag("sub-01_dir-PA_epi.json").unwrap().unwrap();
        assert_eq!(tag.kind, TagKind::Direction);
        assert_eq!(tag.label, "PA");
    }

    #[test]
    fn test_tag_patterns_compile() {
        let patterns = tag_patterns().unwrap();
        assert_eq!(patterns[0].0, TagKind::Acquisition);
        assert_eq!(patterns[1].0, TagKind::Direction);
        assert!(Regex::new(ACQ_TAG_PATTERN).is_ok());
        assert!(Regex::new(DIR_TAG_PATTERN).is_ok());
    }

    #[test]
    fn test_tag_missing_returns_none() {
        assert!(fieldmap_tag("sub-01_phasediff.json").unwrap().is_none());
        assert!(fieldmap_tag("sub-01_myacq-func_epi.json").unwrap().is_none());
    }

    #[test]
    fn test_readout_time_from_matrix_and_echo_spacing() {
        let meta = metadata(json!({"ReconMatrixPE": 64, "EffectiveEchoSpacing": 0.0005}));
        assert_eq!(total_readout_time(&meta), Some(0.0315));
    }

    #[test]
    fn test_readout_time_legacy_nested_matrix() {
        let meta = metadata(json!({
            "global": {"const": {"AcquisitionMatrix": [64, 0, 0, 64]}},
            "EffectiveEchoSpacing": 0.0005
        }));
        assert_eq!(total_readout_time(&meta), Some(0.0315));
    }

    #[test]
    fn test_readout_time_missing_inputs() {
        assert_eq!(
            total_readout_time(&metadata(json!({"ReconMatrixPE": 64}))),
            None
        );
        assert_eq!(
            total_readout_time(&metadata(json!({"EffectiveEchoSpacing": 0.0005}))),
            None
        );
        assert_eq!(
            total_readout_time(&metadata(
                json!({"ReconMatrixPE": 1, "EffectiveEchoSpacing": 0.0005})
            )),
            None
        );
    }

    #[test]
    fn test_func_fieldmap_lists_all_functional_runs() {
        let temp = create_dataset();
        let layout = BidsLayout::index(temp.path()).unwrap();

        let plan = fieldmaps(&layout, IntendedForPolicy::All).unwrap();

        assert_eq!(plan.changes().len(), 1);
        let PlannedChange::MergeMetadata { file, fields } = &plan.changes()[0] else {
            panic!("expected a metadata merge");
        };
        assert!(file.ends_with("sub-01_acq-func_dir-AP_epi.json"));
        assert_eq!(
            fields[INTENDED_FOR_KEY],
            json!([
                "func/sub-01_task-nback_bold.nii.gz",
                "func/sub-01_task-rest_bold.nii.gz"
            ])
        );
        assert_eq!(fields[TOTAL_READOUT_TIME_KEY], json!(0.0315));
        assert_eq!(plan.affected(), ["01".to_string()]);
    }

    #[test]
    fn test_best_match_keeps_single_closest_image() {
        let temp = create_dataset();
        write(
            temp.path(),
            "sub-01/fmap/sub-01_acq-rest_dir-AP_epi.json",
            FMAP_META,
        );
        write(temp.path(), "sub-01/func/sub-01_acq-rest_task-rest_bold.nii.gz", "");
        let layout = BidsLayout::index(temp.path()).unwrap();

        let plan = fieldmaps(&layout, IntendedForPolicy::BestMatch).unwrap();

        let rest_fields = plan
            .changes()
            .iter()
            .find_map(|change| match change {
                PlannedChange::MergeMetadata { file, fields }
                    if file.ends_with("sub-01_acq-rest_dir-AP_epi.json") =>
                {
                    Some(fields)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(
            rest_fields[INTENDED_FOR_KEY],
            json!(["func/sub-01_acq-rest_task-rest_bold.nii.gz"])
        );
    }

    #[test]
    fn test_untagged_fieldmap_is_skipped_and_loop_continues() {
        let temp = create_dataset();
        write(temp.path(), "sub-01/fmap/sub-01_phasediff.json", FMAP_META);
        let layout = BidsLayout::index(temp.path()).unwrap();

        let plan = fieldmaps(&layout, IntendedForPolicy::All).unwrap();

        assert_eq!(plan.changes().len(), 1);
        assert_eq!(plan.skipped().len(), 1);
        assert_eq!(plan.skipped()[0].item, "sub-01/fmap/sub-01_phasediff.json");
    }

    #[test]
    fn test_fieldmap_without_matching_images_is_skipped() {
        let temp = create_dataset();
        write(
            temp.path(),
            "sub-02/fmap/sub-02_acq-dwi_epi.json",
            FMAP_META,
        );
        let layout = BidsLayout::index(temp.path()).unwrap();

        let plan = fieldmaps(&layout, IntendedForPolicy::All).unwrap();
        assert!(plan
            .skipped()
            .iter()
            .any(|s| s.reason.contains("no images share tag 'dwi'")));
    }

    #[cfg(unix)]
    #[test]
    fn test_applied_patch_keeps_sidecar_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = create_dataset();
        let sidecar = temp.path().join("sub-01/fmap/sub-01_acq-func_dir-AP_epi.json");
        fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o444)).unwrap();
        let layout = BidsLayout::index(temp.path()).unwrap();

        let report = fieldmaps(&layout, IntendedForPolicy::All)
            .unwrap()
            .apply()
            .unwrap();

        assert_eq!(report.sidecars_updated, 1);
        let mode = fs::metadata(&sidecar).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o444);

        let patched: Value = serde_json::from_slice(&fs::read(&sidecar).unwrap()).unwrap();
        assert_eq!(patched["ReconMatrixPE"], 64);
        assert_eq!(patched[TOTAL_READOUT_TIME_KEY], 0.0315);
    }
}
