//! Shared JSON artifact I/O.
//!
//! Artifacts are written pretty-printed through a `.tmp` sibling and
//! renamed into place, so a reader never observes a half-written file
//! and a crash mid-write leaves the previous version intact.

use std::fs;
use std::path::Path;

use benchmix_error::{BenchmixError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `value` as pretty JSON and atomically replaces `path`.
///
/// # Errors
///
/// Returns [`BenchmixError::Io`] when the temporary file cannot be
/// written or renamed, and [`BenchmixError::Internal`] when `value`
/// cannot be serialized.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_vec_pretty(value).map_err(|error| {
        BenchmixError::internal(format!("serialize {} failed: {error}", path.display()))
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, payload).map_err(|source| BenchmixError::io(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| BenchmixError::io(path, source))
}

/// Reads and deserializes a JSON artifact.
///
/// # Errors
///
/// Returns [`BenchmixError::Io`] when the file cannot be read and
/// [`BenchmixError::MalformedArtifact`] when it does not deserialize.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|source| BenchmixError::io(path, source))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| BenchmixError::malformed(path, error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.json");
        let value: BTreeMap<String, u32> =
            [("a".to_owned(), 1), ("b".to_owned(), 2)].into_iter().collect();
        write_json_atomic(&path, &value).expect("write");
        let loaded: BTreeMap<String, u32> = read_json(&path).expect("read");
        assert_eq!(loaded, value);
    }

    #[test]
    fn write_leaves_no_temporary_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.json");
        write_json_atomic(&path, &vec![1, 2, 3]).expect("write");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn read_reports_malformed_content_with_the_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.json");
        fs::write(&path, b"not json").expect("write");
        let error = read_json::<Vec<u32>>(&path).expect_err("read must fail");
        assert!(error.to_string().contains("artifact.json"));
    }
}
