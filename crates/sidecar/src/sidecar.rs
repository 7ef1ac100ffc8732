//! Sidecar load, merge and rewrite.
//!
//! The [`Sidecar`] type is bound to one JSON file. Reading never mutates the file; merging
//! follows a fixed write sequence:
//!
//! 1. record the current permissions
//! 2. relax them so the owner can write
//! 3. rewrite the merged, sorted JSON
//! 4. restore the recorded permissions, even if the write failed
//!
//! An interruption between steps 2 and 4 leaves the file writable. That window is accepted.

use crate::{Metadata, SidecarError, SidecarResult, SIDECAR_EXTENSION, SIDECAR_INDENT};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The file was rewritten.
    Updated,
    /// The merged output was byte-identical to the file on disk, nothing was written.
    Unchanged,
}

/// A JSON sidecar file on disk.
#[derive(Debug, Clone)]
pub struct Sidecar {
    path: PathBuf,
}

impl Sidecar {
    /// Binds a `Sidecar` to an existing `.json` file.
    ///
    /// # Errors
    ///
    /// Returns `SidecarError` if:
    /// - the path does not exist or is not a regular file
    /// - the path does not end in `.json`
    pub fn open(path: &Path) -> SidecarResult<Self> {
        if !path.is_file() {
            return Err(SidecarError::NotFound(path.display().to_string()));
        }

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SIDECAR_EXTENSION));
        if !is_json {
            return Err(SidecarError::NotJson(path.display().to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Returns the path of the sidecar file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the sidecar.
    ///
    /// # Errors
    ///
    /// Returns `SidecarError` if the file cannot be read, is not valid JSON, or its top-level
    /// value is not an object.
    pub fn metadata(&self) -> SidecarResult<Metadata> {
        let bytes = fs::read(&self.path)?;
        parse_metadata(&self.path, &bytes)
    }

    /// Merges `additions` into the sidecar and rewrites it.
    ///
    /// Keys in `additions` replace existing keys of the same name; all other existing keys are
    /// preserved. The file's permissions after the call equal its permissions before it.
    ///
    /// # Errors
    ///
    /// Returns `SidecarError` if reading, parsing, serialising, writing, or changing
    /// permissions fails.
    pub fn merge(&self, additions: &Metadata) -> SidecarResult<MergeOutcome> {
        let original = fs::read(&self.path)?;
        let mut metadata = parse_metadata(&self.path, &original)?;
        merge_metadata(&mut metadata, additions);

        let rendered = render_metadata(&metadata)?;
        if rendered == original {
            tracing::debug!("sidecar already up to date: {}", self.path.display());
            return Ok(MergeOutcome::Unchanged);
        }

        self.write_preserving_permissions(&rendered)?;
        Ok(MergeOutcome::Updated)
    }

    fn write_preserving_permissions(&self, bytes: &[u8]) -> SidecarResult<()> {
        let original = fs::metadata(&self.path)?.permissions();
        let relaxed = owner_writable(&original);
        let needs_relax = relaxed != original;

        if needs_relax {
            fs::set_permissions(&self.path, relaxed)?;
        }

        let written = fs::write(&self.path, bytes);

        let restored = if needs_relax {
            fs::set_permissions(&self.path, original)
        } else {
            Ok(())
        };

        written?;
        restored?;
        Ok(())
    }
}

/// Shallow merge, last write wins.
pub fn merge_metadata(metadata: &mut Metadata, additions: &Metadata) {
    for (key, value) in additions {
        metadata.insert(key.clone(), value.clone());
    }
}

/// Serialises metadata with sorted keys and one-space indentation, newline terminated.
///
/// # Errors
///
/// Returns `SidecarError::Serialisation` if serialisation fails.
pub fn render_metadata(metadata: &Metadata) -> SidecarResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(SIDECAR_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    metadata
        .serialize(&mut serializer)
        .map_err(SidecarError::Serialisation)?;
    buffer.push(b'\n');
    Ok(buffer)
}

fn parse_metadata(path: &Path, bytes: &[u8]) -> SidecarResult<Metadata> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|source| SidecarError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(SidecarError::NotAnObject(path.display().to_string())),
    }
}

#[cfg_attr(not(unix), allow(clippy::permissions_set_readonly_false))]
fn owner_writable(permissions: &fs::Permissions) -> fs::Permissions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::Permissions::from_mode(permissions.mode() | 0o200)
    }
    #[cfg(not(unix))]
    {
        let mut relaxed = permissions.clone();
        relaxed.set_readonly(false);
        relaxed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_sidecar(dir: &Path, name: &str, content: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(&content).unwrap()).unwrap();
        path
    }

    fn additions(value: serde_json::Value) -> Metadata {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("additions must be an object"),
        }
    }

    #[test]
    fn test_open_rejects_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Sidecar::open(&temp.path().join("missing.json"));
        assert!(matches!(result, Err(SidecarError::NotFound(_))));
    }

    #[test]
    fn test_open_rejects_non_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub-01_bold.nii.gz");
        fs::write(&path, b"").unwrap();
        assert!(matches!(Sidecar::open(&path), Err(SidecarError::NotJson(_))));
    }

    #[test]
    fn test_metadata_rejects_array() {
        let temp = TempDir::new().unwrap();
        let path = write_sidecar(temp.path(), "a.json", json!([1, 2, 3]));
        let sidecar = Sidecar::open(&path).unwrap();
        assert!(matches!(
            sidecar.metadata(),
            Err(SidecarError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_metadata_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        fs::write(&path, b"{ not json").unwrap();
        let sidecar = Sidecar::open(&path).unwrap();
        assert!(matches!(sidecar.metadata(), Err(SidecarError::Parse { .. })));
    }

    #[test]
    fn test_merge_preserves_existing_and_adds_new_keys() {
        let temp = TempDir::new().unwrap();
        let path = write_sidecar(
            temp.path(),
            "sub-01_task-rest_bold.json",
            json!({"RepetitionTime": 2.0, "EchoTime": 0.03}),
        );
        let sidecar = Sidecar::open(&path).unwrap();

        let outcome = sidecar
            .merge(&additions(json!({"TaskName": "rest"})))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);

        let reloaded = sidecar.metadata().unwrap();
        assert_eq!(reloaded["TaskName"], json!("rest"));
        assert_eq!(reloaded["RepetitionTime"], json!(2.0));
        assert_eq!(reloaded["EchoTime"], json!(0.03));
        assert_eq!(reloaded.len(), 3);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let temp = TempDir::new().unwrap();
        let path = write_sidecar(temp.path(), "a.json", json!({"TaskName": "old"}));
        let sidecar = Sidecar::open(&path).unwrap();

        sidecar
            .merge(&additions(json!({"TaskName": "new"})))
            .unwrap();

        assert_eq!(sidecar.metadata().unwrap()["TaskName"], json!("new"));
    }

    #[test]
    fn test_merge_twice_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let path = write_sidecar(temp.path(), "a.json", json!({"b": 1, "a": [1, 2]}));
        let sidecar = Sidecar::open(&path).unwrap();
        let add = additions(json!({"TaskName": "rest"}));

        sidecar.merge(&add).unwrap();
        let first = fs::read(&path).unwrap();

        let outcome = sidecar.merge(&add).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_sorts_keys_with_single_space_indent() {
        let metadata = additions(json!({"b": 1, "a": [true]}));
        let rendered = String::from_utf8(render_metadata(&metadata).unwrap()).unwrap();
        assert_eq!(rendered, "{\n \"a\": [\n  true\n ],\n \"b\": 1\n}\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_restores_read_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = write_sidecar(temp.path(), "a.json", json!({"EchoTime": 0.03}));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        let sidecar = Sidecar::open(&path).unwrap();
        sidecar
            .merge(&additions(json!({"TaskName": "rest"})))
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o444);
        assert_eq!(sidecar.metadata().unwrap()["TaskName"], json!("rest"));
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_keeps_writable_permissions_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = write_sidecar(temp.path(), "a.json", json!({}));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        Sidecar::open(&path)
            .unwrap()
            .merge(&additions(json!({"TaskName": "rest"})))
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
