//! BIDS Sidecar Metadata
//!
//! This crate reads and patches the JSON sidecar files that accompany every image in a BIDS
//! dataset (`sub-01_task-rest_bold.nii.gz` is described by `sub-01_task-rest_bold.json`).
//!
//! ## Patching Model
//!
//! - A sidecar is a single JSON object with string keys
//! - Patches are shallow merges: added keys overwrite existing keys, every other key is kept
//! - Output is written with sorted keys and one-space indentation, so repeated patches with
//!   the same input produce byte-identical files
//! - Converters commonly leave sidecars read-only; a patch relaxes the permissions, rewrites
//!   the file and then restores the permissions it found
//!
//! ## Example Usage
//!
//! ```no_run
//! use bids_sidecar::{Metadata, Sidecar};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sidecar = Sidecar::open(Path::new("sub-01/func/sub-01_task-rest_bold.json"))?;
//!
//! let mut additions = Metadata::new();
//! additions.insert("TaskName".into(), "rest".into());
//! sidecar.merge(&additions)?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod sidecar;

pub use constants::{SIDECAR_EXTENSION, SIDECAR_INDENT};
pub use sidecar::{merge_metadata, render_metadata, MergeOutcome, Sidecar};

/// A parsed sidecar: a JSON object with keys kept in sorted order.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur while reading or patching a sidecar
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    /// The sidecar path does not exist or is not a regular file
    #[error("Sidecar not found: {0}")]
    NotFound(String),

    /// The path does not carry the `.json` extension
    #[error("Not a JSON sidecar: {0}")]
    NotJson(String),

    /// The file parsed, but the top-level value is not a JSON object
    #[error("Sidecar {0} does not contain a JSON object")]
    NotAnObject(String),

    /// The file content is not valid JSON
    #[error("Failed to parse sidecar {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialising the merged metadata failed
    #[error("Failed to serialise sidecar metadata: {0}")]
    Serialisation(serde_json::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SidecarResult<T> = std::result::Result<T, SidecarError>;
