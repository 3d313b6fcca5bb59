//! Atomic JSON writes shared by the index and the evaluation report.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;

/// Serialize `data` into a uniquely named temp file beside `path`, fsync it,
/// then rename it over `path`. On any failure the temp file is removed and
/// `path` is left untouched.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T, pretty: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        if pretty {
            serde_json::to_writer_pretty(&mut writer, data)?;
        } else {
            serde_json::to_writer(&mut writer, data)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_write_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        atomic_write_json(&path, &vec![1, 2, 3], false).unwrap();
        atomic_write_json(&path, &vec![4], true).unwrap();

        let value: Vec<i32> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, vec![4]);
        assert_eq!(dir_entries(path.parent().unwrap()), vec!["out.json".to_string()]);
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        fs::write(&path, "[1]").unwrap();

        assert!(atomic_write_json(&path, &Unserializable, false).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");
        assert_eq!(dir_entries(dir.path()), vec!["out.json".to_string()]);
    }
}
