//! Unpacker
//!
//! Copies the files of the selected packs to their targets. The work runs
//! on a blocking worker; progress goes out through a `watch` channel and
//! anything that needs the user (overwrite questions, missing volumes,
//! failed executables) is sent back to the thread that owns the UI.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::archive::{open_zip, read_entry};
use super::data::InstallData;
use super::state::InstallationInformation;
use super::validation::UiHandler;
use crate::error::InstallerError;
use crate::metadata::{
    entries, BackReference, ExecutableFile, ExecuteFailure, ExecuteStage, InstallerKind, OverridePolicy, Pack,
    PackManifest, UpdateCheck, XPackFile,
};
use crate::paths::{self, INSTALL_LOG};
use crate::spanning::{DirectoryLocator, FileSpanningReader, VolumeLocator, VolumeProblem};

/// Progress information sent to the UI
#[derive(Debug, Clone)]
pub struct UnpackProgress {
    /// Total bytes of the selected packs
    pub total_bytes: u64,

    /// Bytes unpacked so far
    pub unpacked_bytes: u64,

    pub files_unpacked: u32,

    pub current_pack: String,

    pub current_file: String,

    /// Whether unpacking is complete
    pub complete: bool,

    /// Error message if unpacking failed
    pub error: Option<String>,
}

impl UnpackProgress {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            unpacked_bytes: 0,
            files_unpacked: 0,
            current_pack: String::new(),
            current_file: String::new(),
            complete: false,
            error: None,
        }
    }

    /// Progress as a fraction 0.0 - 1.0
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            if self.complete {
                1.0
            } else {
                0.0
            }
        } else {
            (self.unpacked_bytes as f64 / self.total_bytes as f64).min(1.0)
        }
    }
}

/// Something the worker needs the user for.
#[derive(Debug)]
pub enum UnpackRequest {
    /// Overwrite an existing file?
    Overwrite {
        path: PathBuf,
        default: bool,
        reply: oneshot::Sender<bool>,
    },
    /// A non-fatal failure; the reply says whether to carry on.
    Warning {
        message: String,
        reply: oneshot::Sender<bool>,
    },
    /// Volume `index` could not be found; the reply is a directory to look
    /// in, or `None` to give up.
    Volume {
        index: usize,
        name: String,
        reply: oneshot::Sender<Option<PathBuf>>,
    },
}

/// What was installed.
#[derive(Debug, Clone, Default)]
pub struct UnpackReport {
    /// Files of packs that are recorded for uninstallation
    pub installed: Vec<PathBuf>,
    pub files_unpacked: u32,
    pub bytes_unpacked: u64,
    pub skipped: u32,
    pub removed: u32,
    pub packs: Vec<String>,
}

/// Where a pack's bytes are read from.
trait DataSource {
    /// Copy `length` bytes found at `offset` into `out`, returning the
    /// number of bytes copied.
    fn copy_to(&mut self, offset: u64, length: u64, out: &mut dyn Write) -> Result<u64>;
}

/// A forward-only stream, e.g. a compressed archive entry.
struct SequentialSource<R: Read> {
    reader: R,
    position: u64,
}

impl<R: Read> SequentialSource<R> {
    fn new(reader: R) -> Self {
        Self { reader, position: 0 }
    }
}

impl<R: Read> DataSource for SequentialSource<R> {
    fn copy_to(&mut self, offset: u64, length: u64, out: &mut dyn Write) -> Result<u64> {
        if offset < self.position {
            bail!("Pack data out of order: offset {} is behind {}", offset, self.position);
        }
        let gap = offset - self.position;
        let skipped = io::copy(&mut (&mut self.reader).take(gap), &mut io::sink())?;
        self.position += skipped;
        let copied = io::copy(&mut (&mut self.reader).take(length), out)?;
        self.position += copied;
        Ok(copied)
    }
}

impl DataSource for FileSpanningReader {
    fn copy_to(&mut self, offset: u64, length: u64, out: &mut dyn Write) -> Result<u64> {
        self.seek(SeekFrom::Start(offset))?;
        let mut limited = Read::take(&mut *self, length);
        Ok(io::copy(&mut limited, out)?)
    }
}

/// Hashes what passes through.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Asks the UI thread for a volume once the media directories are exhausted.
struct RequestLocator {
    dirs: DirectoryLocator,
    requests: mpsc::UnboundedSender<UnpackRequest>,
}

impl VolumeLocator for RequestLocator {
    fn locate(&mut self, index: usize, expected: &Path, problem: VolumeProblem) -> Result<PathBuf> {
        let error = match self.dirs.locate(index, expected, problem) {
            Ok(path) => return Ok(path),
            Err(e) => e,
        };
        let name = expected
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (reply, answer) = oneshot::channel();
        let request = UnpackRequest::Volume {
            index,
            name: name.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return Err(error);
        }
        match answer.blocking_recv().ok().flatten() {
            Some(dir) if dir.is_file() => Ok(dir),
            Some(dir) => Ok(dir.join(name)),
            None => Err(error),
        }
    }
}

pub struct Unpacker {
    data: InstallData,
    progress_tx: watch::Sender<UnpackProgress>,
    requests: mpsc::UnboundedSender<UnpackRequest>,
    progress: UnpackProgress,
    report: UnpackReport,
    /// Every target written, for update checks
    written: HashSet<PathBuf>,
    volumes: Option<FileSpanningReader>,
}

impl Unpacker {
    pub fn new(
        data: InstallData,
        progress_tx: watch::Sender<UnpackProgress>,
        requests: mpsc::UnboundedSender<UnpackRequest>,
    ) -> Self {
        let total = data.selected_packs().iter().map(|(_, p)| p.size).sum();
        Self {
            data,
            progress_tx,
            requests,
            progress: UnpackProgress::new(total),
            report: UnpackReport::default(),
            written: HashSet::new(),
            volumes: None,
        }
    }

    /// Unpack everything selected. Blocks.
    pub fn run(mut self) -> Result<UnpackReport> {
        let result = self.unpack();
        match &result {
            Ok(()) => self.progress.complete = true,
            Err(e) => self.progress.error = Some(format!("{:#}", e)),
        }
        self.publish();
        result.map(|()| self.report)
    }

    fn publish(&self) {
        let _ = self.progress_tx.send(self.progress.clone());
    }

    fn unpack(&mut self) -> Result<()> {
        let install_path = self.data.install_path();
        fs::create_dir_all(&install_path)
            .with_context(|| format!("Failed to create install directory {:?}", install_path))?;
        info!("Installing to {:?}", install_path);

        let selected: Vec<(usize, Pack)> = self
            .data
            .selected_packs()
            .into_iter()
            .map(|(i, p)| (i, p.clone()))
            .collect();
        let mut archive = open_zip(&self.data.archive_path)?;
        let mut executables = Vec::new();
        let mut update_checks = Vec::new();

        for (index, pack) in &selected {
            self.progress.current_pack = pack.name.clone();
            self.publish();

            let name = entries::pack_manifest(*index);
            let bytes = read_entry(&mut archive, &name)?;
            let manifest: PackManifest = serde_json::from_slice(&bytes)
                .map_err(|source| InstallerError::Metadata { entry: name, source })?;

            self.unpack_pack(*index, pack, &manifest)
                .with_context(|| format!("Failed to install pack '{}'", pack.name))?;
            self.parse_files(&manifest)?;
            self.mark_executables(&manifest.executables)?;
            executables.extend(manifest.executables.iter().cloned());
            update_checks.extend(manifest.update_checks.iter().cloned());
            self.report.packs.push(pack.name.clone());
        }

        self.run_executables(&executables)?;
        self.apply_update_checks(&install_path, &update_checks)?;
        Ok(())
    }

    fn unpack_pack(&mut self, index: usize, pack: &Pack, manifest: &PackManifest) -> Result<()> {
        debug!("Unpacking pack {} ({} files)", pack.name, manifest.files.len());
        if pack.loose {
            return self.unpack_files(index, pack, manifest, None);
        }
        match self.data.info.installer_kind {
            InstallerKind::Standard => {
                let mut zip = open_zip(&self.data.archive_path)?;
                let entry = zip
                    .by_name(&entries::pack_data(index))
                    .map_err(InstallerError::from)
                    .with_context(|| format!("Pack {} has no data", index))?;
                let mut source = SequentialSource::new(entry);
                let unpacked = self.unpack_files(index, pack, manifest, Some(&mut source));
                unpacked
            }
            InstallerKind::Web => {
                let path = self.web_pack(index)?;
                let mut zip = open_zip(&path)?;
                let entry = zip
                    .by_name(&entries::pack_data(index))
                    .map_err(InstallerError::from)
                    .with_context(|| format!("{:?} holds no data for pack {}", path, index))?;
                let mut source = SequentialSource::new(entry);
                let unpacked = self.unpack_files(index, pack, manifest, Some(&mut source));
                unpacked
            }
            InstallerKind::MultiVolume => {
                let mut reader = match self.volumes.take() {
                    Some(reader) => reader,
                    None => self.open_volumes()?,
                };
                let result = self.unpack_files(index, pack, manifest, Some(&mut reader));
                self.volumes = Some(reader);
                result
            }
        }
    }

    fn open_volumes(&self) -> Result<FileSpanningReader> {
        let volumes = self
            .data
            .volumes
            .clone()
            .ok_or_else(|| InstallerError::MissingEntry(entries::VOLUMES_INFO.to_string()))?;
        let dir = archive_dir(&self.data.archive_path);
        let first = dir.join(&volumes.volume_name);
        let mut dirs = vec![dir];
        dirs.extend(self.data.media_dirs.iter().cloned());
        let locator = RequestLocator {
            dirs: DirectoryLocator::new(dirs),
            requests: self.requests.clone(),
        };
        FileSpanningReader::open(&first, volumes, Box::new(locator))
    }

    /// Local copy next to the installer, otherwise a download from the
    /// web directory into the cache.
    fn web_pack(&self, index: usize) -> Result<PathBuf> {
        let info = &self.data.info;
        let name = entries::web_pack(&info.installer_base, index);
        let local = archive_dir(&self.data.archive_path).join(&name);
        if local.exists() {
            return Ok(local);
        }

        let base_url = info
            .web_dir_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Pack archive {} not found and no web directory is set", name))?;
        let url = format!("{}/{}", base_url.trim_end_matches('/'), name);
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("izpack")
            .join(&info.app_name);
        fs::create_dir_all(&cache).with_context(|| format!("Failed to create {:?}", cache))?;
        let path = cache.join(&name);

        info!("Downloading {}", url);
        let mut response = reqwest::blocking::get(&url).map_err(|e| InstallerError::Download {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(InstallerError::Download {
                url,
                reason: response.status().to_string(),
            }
            .into());
        }
        let mut file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        response.copy_to(&mut file).map_err(|e| InstallerError::Download {
            url,
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    fn unpack_files(
        &mut self,
        index: usize,
        pack: &Pack,
        manifest: &PackManifest,
        mut source: Option<&mut dyn DataSource>,
    ) -> Result<()> {
        for xfile in &manifest.files {
            let file = &xfile.file;
            if !self.data.os_matches(&file.os_constraints) || !self.data.condition_holds(file.condition.as_deref())
            {
                debug!("Skipping {}", file.target);
                self.report.skipped += 1;
                continue;
            }

            let target = self.target_path(&file.target);
            self.progress.current_file = target.to_string_lossy().to_string();
            self.publish();

            if file.is_directory {
                fs::create_dir_all(&target).with_context(|| format!("Failed to create {:?}", target))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
            }

            if !self.should_write(&target, xfile)? {
                debug!("Keeping existing {:?}", target);
                self.report.skipped += 1;
                self.progress.unpacked_bytes += file.length;
                continue;
            }

            let output = File::create(&target).with_context(|| format!("Failed to create {:?}", target))?;
            let mut writer = HashingWriter::new(BufWriter::new(output));
            let copied = if pack.loose {
                let path = archive_dir(&self.data.archive_path).join(&file.source);
                let input = File::open(&path).with_context(|| format!("Loose file {:?} not found", path))?;
                io::copy(&mut input.take(file.length), &mut writer)?
            } else {
                match (&xfile.back_reference, source.as_deref_mut()) {
                    (Some(reference), Some(source)) => {
                        self.copy_back_reference(index, *reference, file.length, source, &mut writer)?
                    }
                    (None, Some(source)) => source.copy_to(xfile.archive_position, file.length, &mut writer)?,
                    (_, None) => bail!("No data source for {}", file.target),
                }
            };

            let (buffered, checksum) = writer.finish();
            let output = buffered.into_inner().map_err(|e| e.into_error())?;
            if copied != file.length {
                return Err(InstallerError::Truncated {
                    target: file.target.clone(),
                    expected: file.length,
                    actual: copied,
                }
                .into());
            }
            if let Some(expected) = &file.checksum {
                if *expected != checksum {
                    return Err(InstallerError::ChecksumMismatch {
                        target: file.target.clone(),
                        expected: expected.clone(),
                        actual: checksum,
                    }
                    .into());
                }
            }
            if file.mtime > 0 {
                if let Err(e) = output.set_modified(UNIX_EPOCH + Duration::from_secs(file.mtime)) {
                    warn!("Failed to restore modification time of {:?}: {}", target, e);
                }
            }
            drop(output);
            if file.executable {
                make_executable(&target)?;
            }

            self.written.insert(target.clone());
            if pack.uninstall {
                self.report.installed.push(target);
            }
            self.report.files_unpacked += 1;
            self.report.bytes_unpacked += copied;
            self.progress.files_unpacked += 1;
            self.progress.unpacked_bytes += copied;
            self.publish();
        }
        Ok(())
    }

    fn copy_back_reference(
        &self,
        index: usize,
        reference: BackReference,
        length: u64,
        source: &mut dyn DataSource,
        out: &mut dyn Write,
    ) -> Result<u64> {
        debug!("Back-reference to pack {} @ {}", reference.pack, reference.offset);
        match self.data.info.installer_kind {
            // Offsets in a volume set are global.
            InstallerKind::MultiVolume => source.copy_to(reference.offset, length, out),
            // The referenced bytes lie behind the pack stream, even within
            // the same pack, so the entry is read again from the start.
            InstallerKind::Standard => {
                let mut zip = open_zip(&self.data.archive_path)?;
                let entry = zip
                    .by_name(&entries::pack_data(reference.pack))
                    .map_err(InstallerError::from)?;
                let mut referenced = SequentialSource::new(entry);
                let copied = referenced.copy_to(reference.offset, length, out)?;
                Ok(copied)
            }
            InstallerKind::Web => bail!("Web pack {} refers to another pack's data", index),
        }
    }

    fn target_path(&self, target: &str) -> PathBuf {
        let path = paths::clean_target(&self.data.substitute(target));
        if path.is_absolute() {
            path
        } else {
            self.data.install_path().join(path)
        }
    }

    fn should_write(&self, target: &Path, xfile: &XPackFile) -> Result<bool> {
        if !target.exists() {
            return Ok(true);
        }
        match xfile.file.override_policy {
            OverridePolicy::True => Ok(true),
            OverridePolicy::False => Ok(false),
            OverridePolicy::AskTrue => Ok(self.ask_overwrite(target, true)),
            OverridePolicy::AskFalse => Ok(self.ask_overwrite(target, false)),
            OverridePolicy::Update => {
                let existing = fs::metadata(target)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                Ok(xfile.file.mtime > existing)
            }
        }
    }

    fn ask_overwrite(&self, target: &Path, default: bool) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = UnpackRequest::Overwrite {
            path: target.to_path_buf(),
            default,
            reply,
        };
        if self.requests.send(request).is_err() {
            return default;
        }
        answer.blocking_recv().unwrap_or(default)
    }

    fn ask_continue(&self, message: String) -> bool {
        let (reply, answer) = oneshot::channel();
        if self.requests.send(UnpackRequest::Warning { message, reply }).is_err() {
            return false;
        }
        answer.blocking_recv().unwrap_or(false)
    }

    /// Substitute variables into the pack's parsable files.
    fn parse_files(&mut self, manifest: &PackManifest) -> Result<()> {
        for parsable in &manifest.parsables {
            if !self.data.os_matches(&parsable.os_constraints)
                || !self.data.condition_holds(parsable.condition.as_deref())
            {
                continue;
            }
            let path = self.target_path(&parsable.path);
            if !path.exists() {
                debug!("Parsable {:?} was not installed", path);
                continue;
            }
            let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
            let parsed = self.data.variables.substitute_as(&content, parsable.kind);
            fs::write(&path, parsed).with_context(|| format!("Failed to write {:?}", path))?;
            debug!("Parsed {:?}", path);
        }
        Ok(())
    }

    fn mark_executables(&self, executables: &[ExecutableFile]) -> Result<()> {
        for executable in executables {
            let path = self.target_path(&executable.path);
            if path.exists() {
                make_executable(&path)?;
            }
        }
        Ok(())
    }

    fn run_executables(&mut self, executables: &[ExecutableFile]) -> Result<()> {
        let install_path = self.data.install_path();
        for executable in executables {
            if executable.stage != ExecuteStage::PostInstall
                || !self.data.os_matches(&executable.os_constraints)
                || !self.data.condition_holds(executable.condition.as_deref())
            {
                continue;
            }
            let path = self.target_path(&executable.path);
            let args: Vec<String> = executable.args.iter().map(|a| self.data.substitute(a)).collect();
            self.progress.current_file = path.to_string_lossy().to_string();
            self.publish();
            info!("Running {:?} {:?}", path, args);

            let failure = match Command::new(&path).args(&args).current_dir(&install_path).status() {
                Ok(status) if status.success() => None,
                Ok(status) => Some(format!("{} exited with {}", path.display(), status)),
                Err(e) => Some(format!("{} could not be started: {}", path.display(), e)),
            };
            let message = match failure {
                Some(message) => message,
                None => continue,
            };
            match executable.on_failure {
                ExecuteFailure::Abort => {
                    return Err(anyhow::Error::new(InstallerError::Aborted).context(message));
                }
                ExecuteFailure::Warn => {
                    warn!("{}", message);
                    if !self.ask_continue(message) {
                        return Err(InstallerError::Aborted.into());
                    }
                }
                ExecuteFailure::Ignore => warn!("{}", message),
            }
        }
        Ok(())
    }

    /// Remove files below the install path that match an update check and
    /// were not written by this run.
    fn apply_update_checks(&mut self, install_path: &Path, checks: &[UpdateCheck]) -> Result<()> {
        if checks.is_empty() {
            return Ok(());
        }
        let mut stale = Vec::new();
        for entry in walkdir::WalkDir::new(install_path).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || self.written.contains(entry.path()) {
                continue;
            }
            let relative = match entry.path().strip_prefix(install_path) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            if relative == paths::INSTALLATION_INFORMATION {
                continue;
            }
            if checks.iter().any(|check| update_check_matches(check, &relative)) {
                stale.push(entry.into_path());
            }
        }
        for path in stale {
            debug!("Removing stale {:?}", path);
            fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
            self.report.removed += 1;
        }
        Ok(())
    }
}

fn update_check_matches(check: &UpdateCheck, relative: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: check.case_sensitive,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let matches = |patterns: &[String]| {
        patterns.iter().any(|p| {
            glob::Pattern::new(p)
                .map(|pattern| pattern.matches_with(relative, options))
                .unwrap_or(false)
        })
    };
    matches(&check.includes) && !matches(&check.excludes)
}

fn archive_dir(archive: &Path) -> PathBuf {
    archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms).with_context(|| format!("Failed to make {:?} executable", path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Start unpacking on a blocking worker of `handle`.
/// Returns the progress receiver, the request receiver and the task.
pub fn unpack_async(
    handle: &Handle,
    data: InstallData,
) -> (
    watch::Receiver<UnpackProgress>,
    mpsc::UnboundedReceiver<UnpackRequest>,
    tokio::task::JoinHandle<Result<UnpackReport>>,
) {
    let total = data.selected_packs().iter().map(|(_, p)| p.size).sum();
    let (progress_tx, progress_rx) = watch::channel(UnpackProgress::new(total));
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let task = handle.spawn_blocking(move || Unpacker::new(data, progress_tx, request_tx).run());
    (progress_rx, request_rx, task)
}

/// Answer a worker request through the UI.
fn answer(request: UnpackRequest, data: &InstallData, ui: &mut dyn UiHandler) {
    match request {
        UnpackRequest::Overwrite { path, default, reply } => {
            let question = format!("{}\n{}", path.display(), data.message("installer.overwrite"));
            let _ = reply.send(ui.ask_question(data.message("installer.warning"), &question, default));
        }
        UnpackRequest::Warning { message, reply } => {
            let _ = reply.send(ui.emit_warning(data.message("installer.warning"), &message));
        }
        UnpackRequest::Volume { index, name, reply } => {
            let question = format!("{} {} (#{})", data.message("installer.media"), name, index + 1);
            ui.emit_notification(&question);
            let _ = reply.send(ui.ask_path(data.message("installer.media.path"), &question));
        }
    }
}

/// Unpack the selected packs, serving worker requests and reporting
/// progress on the calling thread, then write the uninstall data.
pub fn install(
    data: &mut InstallData,
    handle: &Handle,
    ui: &mut dyn UiHandler,
    on_progress: &mut dyn FnMut(&UnpackProgress),
) -> Result<UnpackReport> {
    let (mut progress_rx, mut requests, mut task) = unpack_async(handle, data.clone());

    let result = handle.block_on(async {
        let mut progress_open = true;
        loop {
            tokio::select! {
                result = &mut task => break result,
                changed = progress_rx.changed(), if progress_open => match changed {
                    Ok(()) => on_progress(&*progress_rx.borrow_and_update()),
                    Err(_) => progress_open = false,
                },
                Some(request) = requests.recv() => answer(request, data, ui),
            }
        }
    });
    while let Ok(request) = requests.try_recv() {
        answer(request, data, ui);
    }
    on_progress(&*progress_rx.borrow());

    let report = result.context("Unpack worker panicked")??;
    data.install_success = true;
    info!(
        "Installed {} files ({} bytes), {} skipped",
        report.files_unpacked, report.bytes_unpacked, report.skipped
    );
    write_uninstall_data(data, &report, ui);
    Ok(report)
}

/// Write `install.log` and `.installationinformation`. Failures are shown
/// and otherwise ignored.
pub fn write_uninstall_data(data: &InstallData, report: &UnpackReport, ui: &mut dyn UiHandler) {
    let install_path = data.install_path();

    if let Some(dir) = &data.info.uninstaller_path {
        if data.condition_holds(data.info.uninstaller_condition.as_deref()) {
            let dir = paths::clean_target(&data.substitute(dir));
            if let Err(e) = write_install_log(&dir, &install_path, &report.installed) {
                warn!("{:#}", e);
                ui.emit_error(
                    data.message("installer.error"),
                    &format!("{} {:#}", data.message("installer.error.uninstall"), e),
                );
            }
        }
    }

    if data.info.write_installation_information {
        let current = InstallationInformation {
            app_name: data.info.app_name.clone(),
            app_version: data.info.app_version.clone(),
            installed_packs: data.selected_names(),
        };
        let result = InstallationInformation::read(&install_path)
            .unwrap_or(None)
            .map(|mut record| {
                record.merge(current.clone());
                record
            })
            .unwrap_or(current)
            .write(&install_path);
        if let Err(e) = result {
            warn!("{:#}", e);
            ui.emit_error(data.message("installer.error"), &format!("{:#}", e));
        }
    }
}

/// First line is the install path, then one installed file per line.
fn write_install_log(dir: &Path, install_path: &Path, files: &[PathBuf]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(INSTALL_LOG);
    let mut log = BufWriter::new(File::create(&path).with_context(|| format!("Failed to create {:?}", path))?);
    writeln!(log, "{}", install_path.display())?;
    for file in files {
        writeln!(log, "{}", file.display())?;
    }
    log.flush()?;
    debug!("Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let mut progress = UnpackProgress::new(200);
        assert_eq!(progress.fraction(), 0.0);
        progress.unpacked_bytes = 50;
        assert_eq!(progress.fraction(), 0.25);

        let mut empty = UnpackProgress::new(0);
        assert_eq!(empty.fraction(), 0.0);
        empty.complete = true;
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_sequential_source_skips_forward_only() {
        let mut source = SequentialSource::new(&b"aaabbbcc"[..]);
        let mut out = Vec::new();
        assert_eq!(source.copy_to(3, 3, &mut out).unwrap(), 3);
        assert_eq!(out, b"bbb");
        out.clear();
        assert_eq!(source.copy_to(6, 5, &mut out).unwrap(), 2);
        assert_eq!(out, b"cc");
        assert!(source.copy_to(0, 1, &mut out).is_err());
    }

    #[test]
    fn test_update_check_patterns() {
        let check = UpdateCheck {
            includes: vec!["lib/*.jar".to_string()],
            excludes: vec!["lib/keep*.jar".to_string()],
            case_sensitive: false,
        };
        assert!(update_check_matches(&check, "lib/old.jar"));
        assert!(update_check_matches(&check, "LIB/OLD.JAR"));
        assert!(!update_check_matches(&check, "lib/keep-me.jar"));
        assert!(!update_check_matches(&check, "bin/old.jar"));
    }

    #[test]
    fn test_install_log_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = vec![PathBuf::from("/opt/demo/a"), PathBuf::from("/opt/demo/b")];
        write_install_log(&dir.path().join("Uninstaller"), Path::new("/opt/demo"), &files).unwrap();
        let log = fs::read_to_string(dir.path().join("Uninstaller").join(INSTALL_LOG)).unwrap();
        assert_eq!(log, "/opt/demo\n/opt/demo/a\n/opt/demo/b\n");
    }
}
