//! Spanned Volume Streams
//!
//! A spanned stream is one logical byte stream cut into fixed-size volume
//! files: `base`, `base.1`, `base.2`, ... Every volume starts with the same
//! random magic number so the reader can reject volumes from another set.
//! File pointers count payload bytes only; the magic is never part of the
//! logical stream, but it does count against each volume's capacity.

use anyhow::{bail, Context, Result};
use rand::RngCore;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::InstallerError;
use crate::metadata::VolumesInfo;

/// Length of the per-set magic number
pub const MAGIC_LENGTH: usize = 10;

/// Smallest usable volume: magic plus one payload byte
pub const MIN_VOLUME_SIZE: u64 = MAGIC_LENGTH as u64 + 1;

/// Volume sizes are given in decimal units
pub const KB: u64 = 1000;
pub const MB: u64 = KB * KB;

/// CD-sized volumes
pub const DEFAULT_VOLUME_SIZE: u64 = 650 * MB;

pub const DEFAULT_FIRST_VOLUME_FREE_SPACE: u64 = 0;

/// Path of volume `index` of the set rooted at `base`.
pub fn volume_path(base: &Path, index: usize) -> PathBuf {
    if index == 0 {
        base.to_path_buf()
    } else {
        let mut name = base.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }
}

/// Payload capacity of volume `index`.
fn payload_capacity(index: usize, volume_size: u64, first_volume_size: u64) -> u64 {
    let size = if index == 0 { first_volume_size } else { volume_size };
    size.saturating_sub(MAGIC_LENGTH as u64)
}

/// Writes a logical stream across as many volumes as needed.
pub struct FileSpanningWriter {
    base: PathBuf,
    volume_size: u64,
    first_volume_size: u64,
    magic: [u8; MAGIC_LENGTH],
    current: BufWriter<File>,
    index: usize,
    /// Bytes in the current volume, magic included
    current_size: u64,
    file_pointer: u64,
    volume_payloads: Vec<u64>,
}

impl FileSpanningWriter {
    /// Create the first volume. The first volume's capacity is reduced by
    /// `first_volume_free_space` to leave room for other media content.
    pub fn new(base: &Path, volume_size: u64, first_volume_free_space: u64) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LENGTH];
        rand::thread_rng().fill_bytes(&mut magic);
        Self::with_magic(base, volume_size, first_volume_free_space, magic)
    }

    pub fn with_magic(
        base: &Path,
        volume_size: u64,
        first_volume_free_space: u64,
        magic: [u8; MAGIC_LENGTH],
    ) -> Result<Self> {
        if volume_size < MIN_VOLUME_SIZE {
            bail!("Volume size {} is below the minimum of {} bytes", volume_size, MIN_VOLUME_SIZE);
        }
        let first_volume_size = volume_size.saturating_sub(first_volume_free_space);
        if first_volume_size < MIN_VOLUME_SIZE {
            bail!(
                "First volume free space {} leaves less than {} bytes in the first volume",
                first_volume_free_space,
                MIN_VOLUME_SIZE
            );
        }

        let current = Self::create_volume(base, 0, &magic)?;
        Ok(Self {
            base: base.to_path_buf(),
            volume_size,
            first_volume_size,
            magic,
            current,
            index: 0,
            current_size: MAGIC_LENGTH as u64,
            file_pointer: 0,
            volume_payloads: vec![0],
        })
    }

    fn create_volume(base: &Path, index: usize, magic: &[u8]) -> Result<BufWriter<File>> {
        let path = volume_path(base, index);
        let file = File::create(&path).with_context(|| format!("Failed to create volume {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(magic)?;
        debug!("Opened volume {} at {:?}", index, path);
        Ok(writer)
    }

    fn next_volume(&mut self) -> io::Result<()> {
        self.current.flush()?;
        self.index += 1;
        self.current = Self::create_volume(&self.base, self.index, &self.magic)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.current_size = MAGIC_LENGTH as u64;
        self.volume_payloads.push(0);
        Ok(())
    }

    fn current_capacity(&self) -> u64 {
        if self.index == 0 {
            self.first_volume_size
        } else {
            self.volume_size
        }
    }

    /// Logical position: payload bytes written so far.
    pub fn file_pointer(&self) -> u64 {
        self.file_pointer
    }

    pub fn volume_count(&self) -> usize {
        self.index + 1
    }

    /// Payload bytes held by each volume so far.
    pub fn volume_payloads(&self) -> &[u64] {
        &self.volume_payloads
    }

    pub fn magic(&self) -> &[u8; MAGIC_LENGTH] {
        &self.magic
    }

    /// Flush and describe the finished set.
    pub fn finish(mut self) -> Result<VolumesInfo> {
        self.current.flush()?;
        let volume_name = self
            .base
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(
            "Wrote {} bytes into {} volume(s) of {}",
            self.file_pointer,
            self.volume_count(),
            volume_name
        );
        Ok(VolumesInfo {
            volume_count: self.volume_count(),
            volume_name,
            volume_size: self.volume_size,
            first_volume_free_space: self.volume_size - self.first_volume_size,
        })
    }
}

impl Write for FileSpanningWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let available = self.current_capacity() - self.current_size;
            if available == 0 {
                self.next_volume()?;
                continue;
            }
            let n = remaining.len().min(available as usize);
            self.current.write_all(&remaining[..n])?;
            self.current_size += n as u64;
            self.file_pointer += n as u64;
            if let Some(last) = self.volume_payloads.last_mut() {
                *last += n as u64;
            }
            remaining = &remaining[n..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current.flush()
    }
}

/// Why a volume has to be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeProblem {
    Missing,
    Corrupt,
}

/// Finds volumes the reader cannot open where it expects them.
pub trait VolumeLocator {
    /// Return a path to try for volume `index`, or an error to give up.
    fn locate(&mut self, index: usize, expected: &Path, problem: VolumeProblem) -> Result<PathBuf>;
}

/// Looks for volumes by file name in a list of directories, trying each
/// candidate once per volume.
pub struct DirectoryLocator {
    dirs: Vec<PathBuf>,
    tried: Vec<(usize, PathBuf)>,
}

impl DirectoryLocator {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs, tried: Vec::new() }
    }
}

impl VolumeLocator for DirectoryLocator {
    fn locate(&mut self, index: usize, expected: &Path, problem: VolumeProblem) -> Result<PathBuf> {
        let name = expected.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        for dir in &self.dirs {
            let candidate = dir.join(&name);
            let key = (index, candidate);
            if key.1.exists() && !self.tried.contains(&key) {
                self.tried.push(key.clone());
                return Ok(key.1);
            }
        }
        match problem {
            VolumeProblem::Missing => Err(InstallerError::VolumeNotFound {
                index,
                name: name.to_string_lossy().to_string(),
            }
            .into()),
            VolumeProblem::Corrupt => Err(InstallerError::CorruptVolume {
                path: expected.to_path_buf(),
            }
            .into()),
        }
    }
}

/// Reads a spanned stream back, verifying each volume's magic.
pub struct FileSpanningReader {
    base: PathBuf,
    info: VolumesInfo,
    first_volume_size: u64,
    magic: Option<[u8; MAGIC_LENGTH]>,
    /// Where each volume was found, so later seeks reopen the same file
    resolved: HashMap<usize, PathBuf>,
    current: Option<(usize, BufReader<File>)>,
    /// Payload offset inside the current volume
    offset_in_volume: u64,
    file_pointer: u64,
    locator: Box<dyn VolumeLocator + Send>,
}

impl FileSpanningReader {
    /// `base` is the path of the first volume.
    pub fn open(base: &Path, info: VolumesInfo, locator: Box<dyn VolumeLocator + Send>) -> Result<Self> {
        let first_volume_size = info
            .volume_size
            .checked_sub(info.first_volume_free_space)
            .filter(|size| *size >= MIN_VOLUME_SIZE && info.volume_size >= MIN_VOLUME_SIZE)
            .ok_or_else(|| {
                InstallerError::VolumeLayout(format!(
                    "volume size {} with {} bytes kept free on the first volume",
                    info.volume_size, info.first_volume_free_space
                ))
            })?;
        let mut reader = Self {
            base: base.to_path_buf(),
            info,
            first_volume_size,
            magic: None,
            resolved: HashMap::new(),
            current: None,
            offset_in_volume: 0,
            file_pointer: 0,
            locator,
        };
        reader.open_volume(0)?;
        Ok(reader)
    }

    pub fn file_pointer(&self) -> u64 {
        self.file_pointer
    }

    fn capacity(&self, index: usize) -> u64 {
        payload_capacity(index, self.info.volume_size, self.first_volume_size)
    }

    fn open_volume(&mut self, index: usize) -> Result<()> {
        let expected = volume_path(&self.base, index);
        let mut path = self.resolved.get(&index).cloned().unwrap_or_else(|| expected.clone());
        loop {
            if !path.exists() {
                path = self.locator.locate(index, &expected, VolumeProblem::Missing)?;
                continue;
            }
            let file = File::open(&path).with_context(|| format!("Failed to open volume {:?}", path))?;
            let mut reader = BufReader::new(file);
            let mut magic = [0u8; MAGIC_LENGTH];
            let valid = reader.read_exact(&mut magic).is_ok()
                && match &self.magic {
                    Some(expected_magic) => *expected_magic == magic,
                    None => true,
                };
            if !valid {
                debug!("Volume {:?} has a foreign magic number", path);
                path = self.locator.locate(index, &expected, VolumeProblem::Corrupt)?;
                continue;
            }
            if self.magic.is_none() {
                self.magic = Some(magic);
            }
            debug!("Reading volume {} from {:?}", index, path);
            self.resolved.insert(index, path);
            self.current = Some((index, reader));
            self.offset_in_volume = 0;
            return Ok(());
        }
    }

    /// Map a logical offset to (volume, payload offset in that volume).
    fn locate_offset(&self, mut offset: u64) -> (usize, u64) {
        let mut index = 0;
        while index + 1 < self.info.volume_count && offset >= self.capacity(index) {
            offset -= self.capacity(index);
            index += 1;
        }
        (index, offset)
    }

    fn io_error(e: anyhow::Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

impl Read for FileSpanningReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let index = match &self.current {
                Some((index, _)) => *index,
                None => return Ok(0),
            };
            let is_last = index + 1 >= self.info.volume_count;
            let available = self.capacity(index).saturating_sub(self.offset_in_volume);
            if available == 0 && !is_last {
                self.open_volume(index + 1).map_err(Self::io_error)?;
                continue;
            }
            let limit = if is_last { buf.len() } else { buf.len().min(available as usize) };
            let n = match &mut self.current {
                Some((_, reader)) => reader.read(&mut buf[..limit])?,
                None => 0,
            };
            if n == 0 && !is_last {
                // Volume shorter than its declared capacity
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated volume"));
            }
            self.offset_in_volume += n as u64;
            self.file_pointer += n as u64;
            return Ok(n);
        }
    }
}

impl Seek for FileSpanningReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p,
            SeekFrom::Current(delta) => self
                .file_pointer
                .checked_add_signed(delta)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?,
            SeekFrom::End(_) => {
                return Err(io::Error::new(io::ErrorKind::Unsupported, "seek from end of a spanned stream"))
            }
        };
        let (index, offset) = self.locate_offset(target);
        let same_volume = matches!(&self.current, Some((i, _)) if *i == index);
        if !same_volume {
            self.open_volume(index).map_err(Self::io_error)?;
        }
        if let Some((_, reader)) = &mut self.current {
            reader.seek(SeekFrom::Start(MAGIC_LENGTH as u64 + offset))?;
        }
        self.offset_in_volume = offset;
        self.file_pointer = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct GiveUp;

    impl VolumeLocator for GiveUp {
        fn locate(&mut self, index: usize, expected: &Path, _problem: VolumeProblem) -> Result<PathBuf> {
            Err(InstallerError::VolumeNotFound {
                index,
                name: expected.display().to_string(),
            }
            .into())
        }
    }

    fn write_set(dir: &Path, volume_size: u64, free: u64, data: &[u8]) -> VolumesInfo {
        let mut writer = FileSpanningWriter::new(&dir.join("installer.pak"), volume_size, free).unwrap();
        writer.write_all(data).unwrap();
        assert_eq!(writer.file_pointer(), data.len() as u64);
        assert_eq!(writer.volume_payloads().iter().sum::<u64>(), data.len() as u64);
        writer.finish().unwrap()
    }

    #[test]
    fn test_volume_path() {
        let base = Path::new("/tmp/installer.pak");
        assert_eq!(volume_path(base, 0), PathBuf::from("/tmp/installer.pak"));
        assert_eq!(volume_path(base, 2), PathBuf::from("/tmp/installer.pak.2"));
    }

    #[test]
    fn test_writer_spans_volumes() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..100u8).collect();
        // 20-byte volumes hold 10 payload bytes each; first volume holds 5
        let info = write_set(dir.path(), 20, 5, &data);

        assert_eq!(info.volume_count, 11);
        assert_eq!(info.volume_name, "installer.pak");

        let first = std::fs::metadata(volume_path(&dir.path().join("installer.pak"), 0)).unwrap();
        assert_eq!(first.len(), 15);
        let total: u64 = (0..info.volume_count)
            .map(|i| std::fs::metadata(volume_path(&dir.path().join("installer.pak"), i)).unwrap().len())
            .map(|len| len - MAGIC_LENGTH as u64)
            .sum();
        assert_eq!(total, data.len() as u64);
    }

    #[test]
    fn test_no_trailing_empty_volume() {
        let dir = TempDir::new().unwrap();
        let info = write_set(dir.path(), 20, 0, &[7u8; 20]);
        assert_eq!(info.volume_count, 2);
        assert!(!volume_path(&dir.path().join("installer.pak"), 2).exists());
    }

    #[test]
    fn test_rejects_tiny_volumes() {
        let dir = TempDir::new().unwrap();
        assert!(FileSpanningWriter::new(&dir.path().join("a.pak"), MAGIC_LENGTH as u64, 0).is_err());
        assert!(FileSpanningWriter::new(&dir.path().join("a.pak"), 20, 15).is_err());
    }

    #[test]
    fn test_reader_round_trip_and_seek() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let info = write_set(dir.path(), 64, 16, &data);

        let mut reader =
            FileSpanningReader::open(&dir.path().join("installer.pak"), info, Box::new(GiveUp)).unwrap();
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, data);

        reader.seek(SeekFrom::Start(517)).unwrap();
        let mut chunk = [0u8; 100];
        reader.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk[..], &data[517..617]);

        reader.seek(SeekFrom::Start(3)).unwrap();
        let mut chunk = [0u8; 4];
        reader.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk[..], &data[3..7]);
    }

    #[test]
    fn test_reader_detects_foreign_volume() {
        let dir = TempDir::new().unwrap();
        let data = vec![1u8; 50];
        let info = write_set(dir.path(), 20, 0, &data);

        // Replace volume 2 with one from another set
        let other = TempDir::new().unwrap();
        write_set(other.path(), 20, 0, &data);
        std::fs::copy(
            volume_path(&other.path().join("installer.pak"), 2),
            volume_path(&dir.path().join("installer.pak"), 2),
        )
        .unwrap();

        let mut reader =
            FileSpanningReader::open(&dir.path().join("installer.pak"), info, Box::new(GiveUp)).unwrap();
        let mut all = Vec::new();
        assert!(reader.read_to_end(&mut all).is_err());
    }

    #[test]
    fn test_directory_locator_finds_moved_volume() {
        let dir = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let data: Vec<u8> = (0..40u8).collect();
        let info = write_set(dir.path(), 20, 0, &data);

        let moved = volume_path(&dir.path().join("installer.pak"), 1);
        std::fs::rename(&moved, media.path().join("installer.pak.1")).unwrap();

        let locator = DirectoryLocator::new(vec![media.path().to_path_buf()]);
        let mut reader =
            FileSpanningReader::open(&dir.path().join("installer.pak"), info, Box::new(locator)).unwrap();
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, data);
    }

    #[test]
    fn test_seek_back_into_relocated_volume() {
        let dir = TempDir::new().unwrap();
        let media = TempDir::new().unwrap();
        let data: Vec<u8> = (0..60u8).collect();
        let info = write_set(dir.path(), 20, 0, &data);

        let moved = volume_path(&dir.path().join("installer.pak"), 1);
        std::fs::rename(&moved, media.path().join("installer.pak.1")).unwrap();

        let locator = DirectoryLocator::new(vec![dir.path().to_path_buf(), media.path().to_path_buf()]);
        let mut reader =
            FileSpanningReader::open(&dir.path().join("installer.pak"), info, Box::new(locator)).unwrap();
        let mut all = Vec::new();
        reader.read_to_end(&mut all).unwrap();
        assert_eq!(all, data);

        // Volume 1 holds bytes 10..20 and has to be opened a second time
        reader.seek(SeekFrom::Start(12)).unwrap();
        let mut chunk = [0u8; 5];
        reader.read_exact(&mut chunk).unwrap();
        assert_eq!(&chunk[..], &data[12..17]);
    }

    #[test]
    fn test_invalid_layout_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut info = write_set(dir.path(), 20, 0, &[1u8; 15]);
        info.first_volume_free_space = 30;
        let err = FileSpanningReader::open(&dir.path().join("installer.pak"), info.clone(), Box::new(GiveUp))
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<InstallerError>(), Some(InstallerError::VolumeLayout(_))));

        info.first_volume_free_space = 0;
        info.volume_size = 4;
        assert!(FileSpanningReader::open(&dir.path().join("installer.pak"), info, Box::new(GiveUp)).is_err());
    }
}
