//! Single-archive installer: pack data lives in the primary archive.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use zip::ZipWriter;

use super::{file_options, MsgKind, PackSink, Packager, PackagerBase, PackagerReport};
use crate::metadata::{entries, InstallerKind};

pub struct StdPackager {
    base: PackagerBase,
}

impl StdPackager {
    pub fn new(base: PackagerBase) -> Self {
        Self { base }
    }
}

/// Writes each pack as its own `pack-N.data` entry.
struct ZipPackSink<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
    position: u64,
}

impl<W: Write + Seek> Write for ZipPackSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.zip.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.zip.flush()
    }
}

impl<W: Write + Seek> PackSink for ZipPackSink<'_, W> {
    fn begin_pack(&mut self, index: usize) -> Result<()> {
        self.zip
            .start_file(entries::pack_data(index), file_options())
            .with_context(|| format!("Failed to start pack {} entry", index))?;
        self.position = 0;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn end_pack(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }
}

impl Packager for StdPackager {
    fn base(&self) -> &PackagerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PackagerBase {
        &mut self.base
    }

    fn kind(&self) -> InstallerKind {
        InstallerKind::Standard
    }

    fn create_installer(&mut self, output: &Path) -> Result<PackagerReport> {
        self.base.prepare_output(output, self.kind())?;
        self.base.listener().packager_start();

        let file = File::create(output).with_context(|| format!("Failed to create installer {:?}", output))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        let (packs, manifests, bytes_written) = {
            let mut sink = ZipPackSink { zip: &mut zip, position: 0 };
            self.base.write_packs(&mut sink, true)?
        };
        self.base.write_metadata(&mut zip, &packs, &manifests, None)?;
        zip.finish()
            .context("Failed to finalize installer archive")?
            .flush()?;

        self.base.attach_runtime(output)?;
        self.base.listener().packager_msg(
            &format!("Wrote {} pack(s), {} bytes, to {:?}", packs.len(), bytes_written, output),
            MsgKind::Info,
        );
        self.base.listener().packager_stop();

        Ok(PackagerReport {
            installer: output.to_path_buf(),
            extra_files: Vec::new(),
            packs: packs.len(),
            bytes_written,
            volumes: None,
        })
    }
}
