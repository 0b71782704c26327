//! Packagers
//!
//! A packager takes the compiled installation (info, variables, panels,
//! rules, resources, langpacks and packs) and writes the installer. All
//! kinds share [`PackagerBase`] for the metadata entries of the primary
//! archive; they differ in where pack bytes go:
//!
//! - [`StdPackager`]: pack data entries inside the primary archive
//! - [`WebPackager`]: one `<base>.pack-N.jar` archive per pack, fetched on demand
//! - [`MultiVolumePackager`]: a spanned `installer.pak` volume set

mod multi_volume;
mod standard;
mod web;

pub use multi_volume::MultiVolumePackager;
pub use standard::StdPackager;
pub use web::WebPackager;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::compiler::pack_info::PackInfo;
use crate::metadata::{
    entries, BackReference, GuiPrefs, Info, InstallerKind, InstallerRequirement, Pack, PackManifest, Panel,
    VolumesInfo, XPackFile,
};
use crate::rules::RulesEngine;
use crate::variables::DynamicVariable;

/// Severity of a packager message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    Info,
    Verbose,
    Warning,
    Error,
}

/// Receives progress from a packager run.
pub trait PackagerListener {
    fn packager_msg(&self, msg: &str, kind: MsgKind);
    fn packager_start(&self) {}
    fn packager_stop(&self) {}
}

/// Default listener: forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct TracingListener;

impl PackagerListener for TracingListener {
    fn packager_msg(&self, msg: &str, kind: MsgKind) {
        match kind {
            MsgKind::Info => info!("{}", msg),
            MsgKind::Verbose => debug!("{}", msg),
            MsgKind::Warning => warn!("{}", msg),
            MsgKind::Error => tracing::error!("{}", msg),
        }
    }
}

/// What a packager run produced.
#[derive(Debug, Clone)]
pub struct PackagerReport {
    pub installer: PathBuf,
    /// Web pack archives or volumes written next to the installer
    pub extra_files: Vec<PathBuf>,
    pub packs: usize,
    /// Pack bytes actually written (back-references excluded)
    pub bytes_written: u64,
    pub volumes: Option<VolumesInfo>,
}

/// Common interface of the installer writers.
pub trait Packager {
    fn base(&self) -> &PackagerBase;
    fn base_mut(&mut self) -> &mut PackagerBase;
    fn kind(&self) -> InstallerKind;

    /// Write the installer to `output`.
    fn create_installer(&mut self, output: &Path) -> Result<PackagerReport>;
}

/// Create the packager for an installer kind.
pub fn create(kind: InstallerKind, base: PackagerBase) -> Box<dyn Packager> {
    match kind {
        InstallerKind::Standard => Box::new(StdPackager::new(base)),
        InstallerKind::Web => Box::new(WebPackager::new(base)),
        InstallerKind::MultiVolume => Box::new(MultiVolumePackager::new(base)),
    }
}

/// Destination for pack bytes, with a logical position per pack or set.
pub(crate) trait PackSink: Write {
    fn begin_pack(&mut self, index: usize) -> Result<()>;
    /// Position where the next byte lands
    fn position(&self) -> u64;
    fn end_pack(&mut self, index: usize) -> Result<()>;
}

/// Compiled installation shared by every packager kind.
pub struct PackagerBase {
    pub info: Info,
    pub gui_prefs: GuiPrefs,
    pub variables: BTreeMap<String, String>,
    pub panels: Vec<Panel>,
    pub rules: RulesEngine,
    pub dynamic_variables: Vec<DynamicVariable>,
    pub installer_requirements: Vec<InstallerRequirement>,
    pub dynamic_installer_requirements: Vec<InstallerRequirement>,
    /// ISO3 code → langpack XML
    pub langpacks: Vec<(String, Vec<u8>)>,
    pub resources: BTreeMap<String, Vec<u8>>,
    pub packs: Vec<PackInfo>,
    /// Executable prepended to the primary archive
    pub runtime: Option<Vec<u8>>,
    listener: Box<dyn PackagerListener>,
}

impl PackagerBase {
    pub fn new(info: Info) -> Self {
        Self {
            info,
            gui_prefs: GuiPrefs::default(),
            variables: BTreeMap::new(),
            panels: Vec::new(),
            rules: RulesEngine::new(),
            dynamic_variables: Vec::new(),
            installer_requirements: Vec::new(),
            dynamic_installer_requirements: Vec::new(),
            langpacks: Vec::new(),
            resources: BTreeMap::new(),
            packs: Vec::new(),
            runtime: None,
            listener: Box::new(TracingListener),
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn PackagerListener>) {
        self.listener = listener;
    }

    pub fn listener(&self) -> &dyn PackagerListener {
        self.listener.as_ref()
    }

    pub fn add_pack(&mut self, pack: PackInfo) {
        self.packs.push(pack);
    }

    pub fn add_panel(&mut self, panel: Panel) {
        self.panels.push(panel);
    }

    pub fn add_resource(&mut self, id: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(id.into(), bytes);
    }

    pub fn add_langpack(&mut self, iso3: impl Into<String>, bytes: Vec<u8>) {
        self.langpacks.push((iso3.into(), bytes));
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Record the installer name and kind, and make sure the output
    /// directory exists.
    pub(crate) fn prepare_output(&mut self, output: &Path, kind: InstallerKind) -> Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
        }
        self.info.installer_base = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("Output path {:?} has no file name", output))?;
        self.info.installer_kind = kind;
        self.set_variable(crate::variables::names::INSTALLER_KIND, kind.as_str());
        Ok(())
    }

    /// Write every pack's bytes into `sink`, returning the final pack
    /// records and manifests. With `dedup`, a source file already written
    /// becomes a back-reference to its first copy.
    pub(crate) fn write_packs(&self, sink: &mut dyn PackSink, dedup: bool) -> Result<(Vec<Pack>, Vec<PackManifest>, u64)> {
        let mut written: HashMap<PathBuf, BackReference> = HashMap::new();
        let mut packs = Vec::with_capacity(self.packs.len());
        let mut manifests = Vec::with_capacity(self.packs.len());
        let mut bytes_written = 0u64;

        for (index, pack_info) in self.packs.iter().enumerate() {
            let mut pack = pack_info.pack.clone();
            let mut manifest = PackManifest {
                files: Vec::with_capacity(pack_info.files.len()),
                parsables: pack_info.parsables.clone(),
                executables: pack_info.executables.clone(),
                update_checks: pack_info.update_checks.clone(),
            };
            self.listener
                .packager_msg(&format!("Writing pack {}: {}", index, pack.name), MsgKind::Verbose);

            // Bytes are laid out in target order so the unpacker can stream
            // each pack front to back.
            let mut files: Vec<_> = pack_info.files.iter().collect();
            files.sort_by(|a, b| a.file.target.cmp(&b.file.target));

            sink.begin_pack(index)?;
            let mut file_size = 0u64;
            for sourced in files {
                let mut xfile = XPackFile::new(sourced.file.clone());
                file_size += xfile.file.length;

                let source = match &sourced.source {
                    Some(source) => source,
                    None => {
                        manifest.files.push(xfile);
                        continue;
                    }
                };

                if pack.loose {
                    xfile.file.checksum = Some(hash_file(source)?);
                    manifest.files.push(xfile);
                    continue;
                }

                let key = std::fs::canonicalize(source).unwrap_or_else(|_| source.clone());
                if dedup {
                    if let Some(reference) = written.get(&key) {
                        debug!("{} back-references pack {} @ {}", xfile.file.target, reference.pack, reference.offset);
                        xfile.back_reference = Some(*reference);
                        xfile.file.checksum = Some(hash_file(source)?);
                        manifest.files.push(xfile);
                        continue;
                    }
                }

                let position = sink.position();
                let (copied, checksum) = copy_hashed(source, sink)
                    .with_context(|| format!("Failed to write {:?} into pack {}", source, pack.name))?;
                if copied != xfile.file.length {
                    anyhow::bail!(
                        "File {:?} changed while packing: expected {} bytes, copied {}",
                        source,
                        xfile.file.length,
                        copied
                    );
                }
                let advanced = sink.position() - position;
                if advanced != copied {
                    anyhow::bail!(
                        "Pack stream advanced {} bytes while writing {} bytes of {:?}",
                        advanced,
                        copied,
                        source
                    );
                }

                xfile.archive_position = position;
                xfile.file.checksum = Some(checksum);
                bytes_written += copied;
                written.insert(key, BackReference { pack: index, offset: position });
                manifest.files.push(xfile);
            }
            sink.end_pack(index)?;

            pack.file_size = file_size;
            pack.size = pack.size.max(file_size);
            packs.push(pack);
            manifests.push(manifest);
        }

        Ok((packs, manifests, bytes_written))
    }

    /// Write the metadata entries of the primary archive.
    pub(crate) fn write_metadata<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        packs: &[Pack],
        manifests: &[PackManifest],
        volumes: Option<&VolumesInfo>,
    ) -> Result<()> {
        write_json(zip, entries::INFO, &self.info)?;
        write_json(zip, entries::VARS, &self.variables)?;
        write_json(zip, entries::GUI_PREFS, &self.gui_prefs)?;
        write_json(zip, entries::PANELS_ORDER, &self.panels)?;
        write_json(zip, entries::RULES, &self.rules)?;
        write_json(zip, entries::DYN_VARIABLES, &self.dynamic_variables)?;
        write_json(zip, entries::INSTALLER_REQUIREMENTS, &self.installer_requirements)?;
        write_json(zip, entries::DYN_INSTALLER_REQUIREMENTS, &self.dynamic_installer_requirements)?;

        let iso3: Vec<&str> = self.langpacks.iter().map(|(code, _)| code.as_str()).collect();
        write_json(zip, entries::LANGPACKS_INFO, &iso3)?;
        for (code, bytes) in &self.langpacks {
            write_bytes(zip, &entries::langpack(code), bytes)?;
        }

        for (id, bytes) in &self.resources {
            write_bytes(zip, &entries::resource(id), bytes)?;
        }

        write_json(zip, entries::PACKS_INFO, &packs)?;
        for (index, manifest) in manifests.iter().enumerate() {
            write_json(zip, &entries::pack_manifest(index), manifest)?;
        }

        if let Some(volumes) = volumes {
            write_json(zip, entries::VOLUMES_INFO, volumes)?;
        }
        Ok(())
    }

    /// Prepend the runtime executable to a finished archive.
    pub(crate) fn attach_runtime(&self, output: &Path) -> Result<()> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime,
            None => return Ok(()),
        };
        let archive = std::fs::read(output).with_context(|| format!("Failed to read {:?}", output))?;
        let mut file = File::create(output)?;
        file.write_all(runtime)?;
        file.write_all(&archive)?;
        file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(output)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(output, perms)?;
        }
        self.listener.packager_msg(
            &format!("Attached {} byte runtime to {:?}", runtime.len(), output),
            MsgKind::Verbose,
        );
        Ok(())
    }
}

pub(crate) fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_json<W: Write + Seek, T: Serialize + ?Sized>(zip: &mut ZipWriter<W>, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).with_context(|| format!("Failed to serialize {}", name))?;
    write_bytes(zip, name, &bytes)
}

fn write_bytes<W: Write + Seek>(zip: &mut ZipWriter<W>, name: &str, bytes: &[u8]) -> Result<()> {
    zip.start_file(name, file_options())
        .with_context(|| format!("Failed to add {} to installer", name))?;
    zip.write_all(bytes)?;
    Ok(())
}

/// Copy a file into `sink`, returning the byte count and hex SHA-256.
fn copy_hashed(source: &Path, sink: &mut dyn PackSink) -> Result<(u64, String)> {
    let mut file = File::open(source)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        sink.write_all(&buffer[..n])?;
        total += n as u64;
    }
    Ok((total, hex::encode(hasher.finalize())))
}

/// Calculate the SHA-256 of a file
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::pack_info::FileOptions;
    use tempfile::TempDir;

    /// Sink collecting every pack into one buffer.
    struct VecSink {
        data: Vec<u8>,
        begun: Vec<usize>,
    }

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl PackSink for VecSink {
        fn begin_pack(&mut self, index: usize) -> Result<()> {
            self.begun.push(index);
            Ok(())
        }
        fn position(&self) -> u64 {
            self.data.len() as u64
        }
        fn end_pack(&mut self, _index: usize) -> Result<()> {
            Ok(())
        }
    }

    pub(crate) fn test_info() -> Info {
        Info {
            format_version: crate::metadata::METADATA_VERSION,
            app_name: "Demo".to_string(),
            app_version: "1.0".to_string(),
            app_url: None,
            authors: Vec::new(),
            app_subpath: None,
            web_dir_url: None,
            installer_kind: InstallerKind::Standard,
            installer_base: "install.jar".to_string(),
            uninstaller_path: None,
            uninstaller_condition: None,
            write_installation_information: true,
        }
    }

    #[test]
    fn test_write_packs_back_references_shared_sources() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shared.txt"), b"shared bytes").unwrap();
        std::fs::write(dir.path().join("own.txt"), b"own").unwrap();

        let mut base = PackagerBase::new(test_info());
        let mut first = PackInfo::new(Pack::new("First"), dir.path());
        first.add_file("shared.txt", "$INSTALL_PATH/a", &FileOptions::default()).unwrap();
        let mut second = PackInfo::new(Pack::new("Second"), dir.path());
        second.add_file("own.txt", "$INSTALL_PATH/b", &FileOptions::default()).unwrap();
        second.add_file("shared.txt", "$INSTALL_PATH/b", &FileOptions::default()).unwrap();
        base.add_pack(first);
        base.add_pack(second);

        let mut sink = VecSink { data: Vec::new(), begun: Vec::new() };
        let (packs, manifests, written) = base.write_packs(&mut sink, true).unwrap();

        assert_eq!(sink.begun, vec![0, 1]);
        assert_eq!(written, 15);
        assert_eq!(sink.data, b"shared bytesown");
        assert_eq!(packs[1].file_size, 15);

        let shared = manifests[1]
            .files
            .iter()
            .find(|f| f.file.target.ends_with("shared.txt"))
            .unwrap();
        assert_eq!(shared.back_reference, Some(BackReference { pack: 0, offset: 0 }));
        assert_eq!(shared.file.checksum, manifests[0].files[0].file.checksum);
    }

    #[test]
    fn test_write_packs_without_dedup_copies_again() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("shared.txt"), b"xyz").unwrap();

        let mut base = PackagerBase::new(test_info());
        for name in ["One", "Two"] {
            let mut info = PackInfo::new(Pack::new(name), dir.path());
            info.add_file("shared.txt", "$INSTALL_PATH", &FileOptions::default()).unwrap();
            base.add_pack(info);
        }

        let mut sink = VecSink { data: Vec::new(), begun: Vec::new() };
        let (_, manifests, written) = base.write_packs(&mut sink, false).unwrap();
        assert_eq!(written, 6);
        assert!(manifests.iter().all(|m| !m.files[0].is_back_reference()));
        assert_eq!(manifests[1].files[0].archive_position, 3);
    }

    #[test]
    fn test_loose_pack_writes_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.iso"), vec![0u8; 128]).unwrap();

        let mut base = PackagerBase::new(test_info());
        let mut pack = Pack::new("Media");
        pack.loose = true;
        let mut info = PackInfo::new(pack, dir.path());
        info.add_file("big.iso", "$INSTALL_PATH", &FileOptions::default()).unwrap();
        base.add_pack(info);

        let mut sink = VecSink { data: Vec::new(), begun: Vec::new() };
        let (packs, manifests, written) = base.write_packs(&mut sink, true).unwrap();
        assert_eq!(written, 0);
        assert!(sink.data.is_empty());
        assert_eq!(packs[0].size, 128);
        assert_eq!(manifests[0].files[0].file.source, "big.iso");
        assert!(manifests[0].files[0].file.checksum.is_some());
    }
}
