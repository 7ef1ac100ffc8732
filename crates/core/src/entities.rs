//! Filename entity parsing.
//!
//! BIDS encodes acquisition metadata in file and directory names:
//!
//! ```text
//! sub-01_ses-1_task-rest_acq-mb4_dir-AP_run-2_bold.nii.gz
//! └────┘ └───┘ └───────┘ └─────┘ └────┘ └───┘ └──┘└─────┘
//! entity entity  entity   entity  entity entity suffix extension
//! ```
//!
//! [`Entities::parse`] is the single parser every operation uses to read that encoding. It is
//! lenient: chunks that are not `key-label` pairs (for example the `A` in a not yet normalised
//! `sub-01_A_bold.nii.gz`) are kept in [`Entities::unparsed`] rather than rejected.

use crate::constants::{ENTITY_SEPARATOR, IMAGE_EXTENSIONS, KEY_VALUE_SEPARATOR};

/// Structured view of a BIDS file or directory name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pairs: Vec<(String, String)>,
    suffix: Option<String>,
    extension: Option<String>,
    unparsed: Vec<String>,
}

impl Entities {
    /// Parses a file or directory name (not a path).
    ///
    /// The extension starts at the first `.`, so `.nii.gz` is kept whole. The last chunk of
    /// the stem becomes the suffix when it is not a `key-label` pair.
    pub fn parse(name: &str) -> Self {
        let (stem, extension) = match name.find('.') {
            Some(0) | None => (name, None),
            Some(idx) => (&name[..idx], Some(name[idx..].to_string())),
        };

        let mut entities = Self {
            extension,
            ..Self::default()
        };

        let chunks: Vec<&str> = stem.split(ENTITY_SEPARATOR).collect();
        let last = chunks.len().saturating_sub(1);

        for (idx, chunk) in chunks.iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }
            match chunk.split_once(KEY_VALUE_SEPARATOR) {
                Some((key, value)) if !key.is_empty() => {
                    entities.pairs.push((key.to_string(), value.to_string()));
                }
                _ if idx == last => entities.suffix = Some(chunk.to_string()),
                _ => entities.unparsed.push(chunk.to_string()),
            }
        }

        entities
    }

    /// Returns the label of the first entity with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub")
    }

    pub fn session(&self) -> Option<&str> {
        self.get("ses")
    }

    pub fn task(&self) -> Option<&str> {
        self.get("task")
    }

    pub fn acquisition(&self) -> Option<&str> {
        self.get("acq")
    }

    /// Phase-encoding direction (`dir-` entity).
    pub fn direction(&self) -> Option<&str> {
        self.get("dir")
    }

    pub fn run(&self) -> Option<&str> {
        self.get("run")
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Extension including the leading dot, e.g. `.nii.gz`.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Chunks that were neither `key-label` pairs nor the suffix.
    pub fn unparsed(&self) -> &[String] {
        &self.unparsed
    }

    /// All `key-label` pairs in filename order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True for converted image files (`.nii`, `.nii.gz`).
    pub fn is_image(&self) -> bool {
        self.extension
            .as_deref()
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_functional_name() {
        let e = Entities::parse("sub-01_ses-1_task-rest_acq-mb4_dir-AP_run-2_bold.nii.gz");
        assert_eq!(e.subject(), Some("01"));
        assert_eq!(e.session(), Some("1"));
        assert_eq!(e.task(), Some("rest"));
        assert_eq!(e.acquisition(), Some("mb4"));
        assert_eq!(e.direction(), Some("AP"));
        assert_eq!(e.run(), Some("2"));
        assert_eq!(e.suffix(), Some("bold"));
        assert_eq!(e.extension(), Some(".nii.gz"));
        assert!(e.is_image());
        assert!(e.unparsed().is_empty());
    }

    #[test]
    fn test_parse_sidecar_is_not_image() {
        let e = Entities::parse("sub-01_task-rest_bold.json");
        assert_eq!(e.extension(), Some(".json"));
        assert!(!e.is_image());
    }

    #[test]
    fn test_parse_directory_name() {
        let e = Entities::parse("sub-01");
        assert_eq!(e.subject(), Some("01"));
        assert_eq!(e.suffix(), None);
        assert_eq!(e.extension(), None);
    }

    #[test]
    fn test_parse_keeps_stray_chunks() {
        let e = Entities::parse("sub-01_A_task-rest_bold.nii");
        assert_eq!(e.subject(), Some("01"));
        assert_eq!(e.task(), Some("rest"));
        assert_eq!(e.unparsed(), ["A".to_string()]);
        assert_eq!(e.suffix(), Some("bold"));
    }

    #[test]
    fn test_parse_scans_table_name() {
        let e = Entities::parse("sub-01_scans.tsv");
        assert_eq!(e.subject(), Some("01"));
        assert_eq!(e.suffix(), Some("scans"));
        assert_eq!(e.extension(), Some(".tsv"));
    }

    #[test]
    fn test_parse_hidden_file_has_no_extension() {
        let e = Entities::parse(".bidsignore");
        assert_eq!(e.extension(), None);
        assert_eq!(e.suffix(), Some(".bidsignore"));
    }

    #[test]
    fn test_pairs_preserve_order() {
        let e = Entities::parse("sub-02_acq-func_dir-PA_epi.json");
        let pairs: Vec<_> = e.pairs().collect();
        assert_eq!(pairs, vec![("sub", "02"), ("acq", "func"), ("dir", "PA")]);
    }
}
