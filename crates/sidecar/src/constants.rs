//! Constants for sidecar files.

/// File extension (without the dot) carried by every sidecar.
pub const SIDECAR_EXTENSION: &str = "json";

/// Indentation used when rewriting a sidecar.
pub const SIDECAR_INDENT: &[u8] = b" ";
