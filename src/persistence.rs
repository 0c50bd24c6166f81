use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SeriesError;

/// Writes `value` to `path` as one self-describing MessagePack document with
/// named struct fields.
///
/// The document goes to a temp file in the same directory first, then is
/// renamed into place, so a torn write never replaces good contents.
pub(crate) fn write_object<T, P>(path: P, value: &T) -> Result<(), SeriesError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let tmp_path = tmp_sibling(path);

    let file = File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write_named(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_data()?;
    drop(writer);

    fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }
    Ok(())
}

/// Reads one whole-object MessagePack document from `path`.
pub(crate) fn read_object<T, P>(path: P) -> Result<T, SeriesError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(rmp_serde::decode::from_read(reader)?)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".tmp_{}", name))
}

fn sync_dir(dir: &Path) -> Result<(), SeriesError> {
    let d = File::open(dir)?;
    d.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchiveConfig, SeriesConfig};
    use tempfile::tempdir;

    #[test]
    fn object_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");

        let config = SeriesConfig {
            archives: vec![
                ArchiveConfig { resolution: 1, retention: 3600 },
                ArchiveConfig { resolution: 60, retention: 86400 },
            ],
            default_value: 1.5,
        };

        write_object(&path, &config).unwrap();
        let loaded: SeriesConfig = read_object(&path).unwrap();
        assert_eq!(loaded, config);

        // No temp file left behind after a successful install.
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn read_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let res: Result<SeriesConfig, _> = read_object(dir.path().join("nope"));
        match res {
            Err(SeriesError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {:?}", other.err()),
        }
    }

    #[test]
    fn read_corrupt_file_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, b"not msgpack at all \xff\xff\xff").unwrap();
        let res: Result<SeriesConfig, _> = read_object(&path);
        assert!(matches!(res, Err(SeriesError::Decode(_))));
    }
}
