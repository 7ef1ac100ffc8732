//! The five dataset fixes.
//!
//! Every operation is a pure planning function: it reads the dataset (directly, or through a
//! [`crate::BidsLayout`] snapshot) and returns a [`crate::Plan`]. None of them mutate anything.

mod fieldmaps;
mod scans;
mod subjects;
mod tasks;
mod underscores;

pub use fieldmaps::{fieldmaps, fieldmap_tag, total_readout_time, FieldmapTag, TagKind};
pub use scans::{scan_tables, ScanRow, ScansTable};
pub use subjects::prefix_subjects;
pub use tasks::task_names;
pub use underscores::normalise_underscores;

use crate::BidsError;
use std::fmt;
use std::str::FromStr;

/// Operation selectable from the menu, numbered as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PrefixSubjects,
    NormaliseUnderscores,
    ScanTables,
    TaskNames,
    Fieldmaps,
}

impl Operation {
    /// All operations in the order `--all` runs them.
    pub const ALL: [Operation; 5] = [
        Operation::PrefixSubjects,
        Operation::NormaliseUnderscores,
        Operation::ScanTables,
        Operation::TaskNames,
        Operation::Fieldmaps,
    ];

    pub fn menu_number(&self) -> u8 {
        match self {
            Operation::PrefixSubjects => 1,
            Operation::NormaliseUnderscores => 2,
            Operation::ScanTables => 3,
            Operation::TaskNames => 4,
            Operation::Fieldmaps => 5,
        }
    }

    pub fn from_menu_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.menu_number() == number)
    }

    /// Short name accepted on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PrefixSubjects => "prefix",
            Operation::NormaliseUnderscores => "underscores",
            Operation::ScanTables => "scans",
            Operation::TaskNames => "taskname",
            Operation::Fieldmaps => "fieldmaps",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::PrefixSubjects => "Add sub prefix",
            Operation::NormaliseUnderscores => "Remove underscore",
            Operation::ScanTables => "Make subject scan files",
            Operation::TaskNames => "Add taskname to json",
            Operation::Fieldmaps => "Add IntendedFor / Readout",
        }
    }

    /// True for operations that rename entries, invalidating any layout snapshot.
    pub fn renames(&self) -> bool {
        matches!(
            self,
            Operation::PrefixSubjects | Operation::NormaliseUnderscores
        )
    }

    /// The numbered menu shown when no operation is given on the command line.
    pub fn menu() -> String {
        let mut menu = String::from("Choose an option:\n");
        for op in Self::ALL {
            menu.push_str(&format!("{}. {}\n", op.menu_number(), op.description()));
        }
        menu
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Operation {
    type Err = BidsError;

    /// Accepts a menu number or a short name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Self::from_menu_number(number)
                .ok_or_else(|| BidsError::UnknownOperation(trimmed.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| BidsError::UnknownOperation(trimmed.to_string()))
    }
}
