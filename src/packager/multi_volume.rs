//! Multi-volume installer: pack data is spanned across `installer.pak`,
//! `installer.pak.1`, ... next to the primary archive.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::ZipWriter;

use super::{MsgKind, PackSink, Packager, PackagerBase, PackagerReport};
use crate::error::CompilerError;
use crate::metadata::InstallerKind;
use crate::spanning::{self, FileSpanningWriter, DEFAULT_FIRST_VOLUME_FREE_SPACE, DEFAULT_VOLUME_SIZE};

/// File name of the first volume
pub const VOLUME_NAME: &str = "installer.pak";

/// Variables published to the installer
pub const VOLUME_SIZE_VARIABLE: &str = "MultiVolumePackager.volumesize";
pub const FIRST_VOLUME_FREE_SPACE_VARIABLE: &str = "MultiVolumePackager.firstvolumefreespace";

pub struct MultiVolumePackager {
    base: PackagerBase,
    volume_size: u64,
    first_volume_free_space: u64,
}

impl MultiVolumePackager {
    pub fn new(base: PackagerBase) -> Self {
        Self {
            base,
            volume_size: DEFAULT_VOLUME_SIZE,
            first_volume_free_space: DEFAULT_FIRST_VOLUME_FREE_SPACE,
        }
    }

    /// Apply `<options volumesize firstvolumefreespace>`; absent values keep
    /// the defaults.
    pub fn configure(&mut self, volume_size: Option<&str>, first_volume_free_space: Option<&str>) -> Result<(), CompilerError> {
        if let Some(size) = volume_size {
            self.volume_size = parse_size("volumesize", size)?;
        }
        if let Some(free) = first_volume_free_space {
            self.first_volume_free_space = parse_size("firstvolumefreespace", free)?;
        }
        Ok(())
    }

    pub fn volume_size(&self) -> u64 {
        self.volume_size
    }

    pub fn first_volume_free_space(&self) -> u64 {
        self.first_volume_free_space
    }
}

fn parse_size(what: &str, value: &str) -> Result<u64, CompilerError> {
    value.trim().parse().map_err(|_| CompilerError::InvalidValue {
        what: what.to_string(),
        value: value.to_string(),
    })
}

impl PackSink for FileSpanningWriter {
    fn begin_pack(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        self.file_pointer()
    }

    fn end_pack(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }
}

impl Packager for MultiVolumePackager {
    fn base(&self) -> &PackagerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PackagerBase {
        &mut self.base
    }

    fn kind(&self) -> InstallerKind {
        InstallerKind::MultiVolume
    }

    fn create_installer(&mut self, output: &Path) -> Result<PackagerReport> {
        self.base.prepare_output(output, self.kind())?;
        self.base.set_variable(VOLUME_SIZE_VARIABLE, self.volume_size.to_string());
        self.base
            .set_variable(FIRST_VOLUME_FREE_SPACE_VARIABLE, self.first_volume_free_space.to_string());
        self.base.listener().packager_start();

        let volume_base = output.with_file_name(VOLUME_NAME);
        let mut writer = FileSpanningWriter::new(&volume_base, self.volume_size, self.first_volume_free_space)?;
        let (packs, manifests, bytes_written) = self.base.write_packs(&mut writer, true)?;
        let volumes = writer.finish()?;

        let extra_files = (0..volumes.volume_count)
            .map(|index| spanning::volume_path(&volume_base, index))
            .collect();

        let file = File::create(output).with_context(|| format!("Failed to create installer {:?}", output))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        self.base.write_metadata(&mut zip, &packs, &manifests, Some(&volumes))?;
        zip.finish()
            .context("Failed to finalize installer archive")?
            .flush()?;
        self.base.attach_runtime(output)?;

        self.base.listener().packager_msg(
            &format!(
                "Spanned {} bytes over {} volume(s) of {} bytes",
                bytes_written, volumes.volume_count, volumes.volume_size
            ),
            MsgKind::Info,
        );
        self.base.listener().packager_stop();

        Ok(PackagerReport {
            installer: output.to_path_buf(),
            extra_files,
            packs: packs.len(),
            bytes_written,
            volumes: Some(volumes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Info;

    fn info() -> Info {
        Info {
            format_version: crate::metadata::METADATA_VERSION,
            app_name: "Demo".to_string(),
            app_version: "1.0".to_string(),
            app_url: None,
            authors: Vec::new(),
            app_subpath: None,
            web_dir_url: None,
            installer_kind: InstallerKind::MultiVolume,
            installer_base: String::new(),
            uninstaller_path: None,
            uninstaller_condition: None,
            write_installation_information: true,
        }
    }

    #[test]
    fn test_default_and_configured_sizes() {
        let mut packager = MultiVolumePackager::new(PackagerBase::new(info()));
        assert_eq!(packager.volume_size(), 650_000_000);
        assert_eq!(packager.first_volume_free_space(), 0);

        packager.configure(Some("1048576"), None).unwrap();
        assert_eq!(packager.volume_size(), 1_048_576);
        assert_eq!(packager.first_volume_free_space(), 0);

        assert!(packager.configure(None, Some("lots")).is_err());
    }
}
