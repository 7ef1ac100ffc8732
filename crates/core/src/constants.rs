//! Constants used throughout the BIDS core crate.
//!
//! This module contains the naming conventions, file names and metadata keys the operations
//! rely on, so that each is defined in exactly one place.

/// Marker that prefixes every canonical subject directory.
pub const SUBJECT_PREFIX: &str = "sub-";

/// Marker that prefixes every session directory.
pub const SESSION_PREFIX: &str = "ses-";

/// Separator between entities in a BIDS filename.
pub const ENTITY_SEPARATOR: char = '_';

/// Separator between an entity key and its label.
pub const KEY_VALUE_SEPARATOR: char = '-';

/// Directory holding derived data. Never treated as raw data.
pub const DERIVATIVES_DIR_NAME: &str = "derivatives";

/// Directory holding the pre-conversion source data (DICOMs etc).
pub const SOURCEDATA_DIR_NAME: &str = "sourcedata";

/// Top-level directories defined by BIDS that are never subjects.
pub const RESERVED_TOP_LEVEL_DIRS: &[&str] = &[
    SOURCEDATA_DIR_NAME,
    DERIVATIVES_DIR_NAME,
    "code",
    "stimuli",
    "phenotype",
];

/// Top-level directories skipped by the layout index.
pub const UNINDEXED_TOP_LEVEL_DIRS: &[&str] = &[SOURCEDATA_DIR_NAME, "code"];

/// Datatype directory for fieldmaps.
pub const FMAP_DATATYPE: &str = "fmap";

/// Datatype directory for functional runs.
pub const FUNC_DATATYPE: &str = "func";

/// Extensions of converted image files.
pub const IMAGE_EXTENSIONS: &[&str] = &[".nii.gz", ".nii"];

/// Suffix appended to the subject directory name for the per-subject scans table.
pub const SCANS_TABLE_SUFFIX: &str = "_scans.tsv";

/// Header row of the scans table.
pub const SCANS_TABLE_HEADER: [&str; 2] = ["filename", "acq_time"];

/// Sidecar key holding the task label.
pub const TASK_NAME_KEY: &str = "TaskName";

/// Sidecar key listing the images a fieldmap corrects.
pub const INTENDED_FOR_KEY: &str = "IntendedFor";

/// Sidecar key holding the total readout time in seconds.
pub const TOTAL_READOUT_TIME_KEY: &str = "TotalReadoutTime";

/// Sidecar key holding the effective echo spacing in seconds.
pub const EFFECTIVE_ECHO_SPACING_KEY: &str = "EffectiveEchoSpacing";

/// Sidecar keys holding the phase-encoding matrix dimension, in order of preference.
pub const MATRIX_DIMENSION_KEYS: &[&str] = &["ReconMatrixPE", "AcquisitionMatrixPE"];

/// Decimal places kept for a computed readout time.
pub const READOUT_TIME_DECIMALS: i32 = 9;
