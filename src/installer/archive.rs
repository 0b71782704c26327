//! Installer archive access
//!
//! The primary archive is a zip, optionally prefixed by the runtime
//! executable; the zip reader locates the central directory from the end of
//! the file, so a prefix is transparent.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::InstallerError;
use crate::metadata::entries;

pub struct InstallerArchive {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl InstallerArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open installer {:?}", path))?;
        let zip = ZipArchive::new(BufReader::new(file))
            .map_err(InstallerError::from)
            .with_context(|| format!("{:?} is not an installer archive", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the archive; volumes, web packs and loose files
    /// are looked up relative to it.
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    pub fn read_bytes(&mut self, name: &str) -> Result<Vec<u8>, InstallerError> {
        read_entry(&mut self.zip, name)
    }

    pub fn read_json<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, InstallerError> {
        let bytes = self.read_bytes(name)?;
        serde_json::from_slice(&bytes).map_err(|source| InstallerError::Metadata {
            entry: name.to_string(),
            source,
        })
    }

    /// Like [`read_json`](Self::read_json), `None` when the entry is absent.
    pub fn read_json_opt<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>, InstallerError> {
        if self.has_entry(name) {
            self.read_json(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Bytes of a `<res>` resource, `None` when the installer has none.
    pub fn resource(&mut self, id: &str) -> Result<Option<Vec<u8>>, InstallerError> {
        let name = entries::resource(id);
        if self.has_entry(&name) {
            self.read_bytes(&name).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Read a whole entry of any zip archive.
pub(crate) fn read_entry<R: Read + std::io::Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, InstallerError> {
    let mut entry = zip.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => InstallerError::MissingEntry(name.to_string()),
        other => InstallerError::Zip(other),
    })?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes).map_err(|source| InstallerError::Io {
        path: PathBuf::from(name),
        source,
    })?;
    Ok(bytes)
}

/// Open a zip archive (primary installer or web pack) for streaming.
pub(crate) fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    ZipArchive::new(BufReader::new(file))
        .map_err(InstallerError::from)
        .with_context(|| format!("{:?} is not a valid archive", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_archive(path: &Path, prefix: &[u8]) {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(entries::INFO, SimpleFileOptions::default()).unwrap();
        zip.write_all(br#"{"answer":42}"#).unwrap();
        zip.start_file(entries::resource("readme"), SimpleFileOptions::default()).unwrap();
        zip.write_all(b"hello").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let mut file = File::create(path).unwrap();
        file.write_all(prefix).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[derive(serde::Deserialize)]
    struct Answer {
        answer: u32,
    }

    #[test]
    fn test_read_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("install.jar");
        write_archive(&path, b"");

        let mut archive = InstallerArchive::open(&path).unwrap();
        let answer: Answer = archive.read_json(entries::INFO).unwrap();
        assert_eq!(answer.answer, 42);
        assert_eq!(archive.resource("readme").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(archive.resource("missing").unwrap(), None);
        assert!(matches!(
            archive.read_bytes(entries::PACKS_INFO),
            Err(InstallerError::MissingEntry(_))
        ));
        assert_eq!(archive.dir(), dir.path());
    }

    #[test]
    fn test_runtime_prefix_is_transparent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("setup");
        write_archive(&path, &[0x7f, b'E', b'L', b'F', 0, 0, 0, 0]);

        let mut archive = InstallerArchive::open(&path).unwrap();
        let answer: Answer = archive.read_json(entries::INFO).unwrap();
        assert_eq!(answer.answer, 42);
    }
}
