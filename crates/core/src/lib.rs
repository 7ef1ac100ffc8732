//! # BIDS Core
//!
//! Point fixes that bring a freshly converted neuroimaging dataset into BIDS shape:
//! - Prefixing bare subject directories with `sub-`
//! - Removing `_` from subject labels, cascading into every file that carries the label
//! - Writing per-subject `_scans.tsv` tables dated from the source DICOM headers
//! - Adding `TaskName` to task sidecars
//! - Adding `IntendedFor` and `TotalReadoutTime` to fieldmap sidecars
//!
//! Operations return a [`Plan`]; nothing is changed until the plan is applied. [`BidsFixer`]
//! ties configuration, the [`BidsLayout`] snapshot and the operations together.
//!
//! **No DICOM parsing here**: headers are read through [`HeaderReader`], implemented in
//! `bids_dicom`.

pub mod config;
pub mod constants;
pub mod entities;
pub mod error;
pub mod fixer;
pub mod layout;
pub mod operations;
pub mod plan;
pub mod source;
pub mod validation;

pub use config::{CoreConfig, IntendedForPolicy, RunMode};
pub use entities::Entities;
pub use error::{BidsError, BidsResult};
pub use fixer::{BidsFixer, RunOutcome};
pub use layout::{BidsFile, BidsLayout, BidsQuery};
pub use operations::Operation;
pub use plan::{ApplyReport, Plan, PlannedChange, Skipped};
pub use source::{AcquisitionDate, HeaderReader, SourceLookup};
