//! Web installer: the primary archive holds metadata only; every pack is
//! written to its own archive to be published under the web directory.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;

use super::{file_options, MsgKind, PackSink, Packager, PackagerBase, PackagerReport};
use crate::metadata::{entries, InstallerKind};

pub struct WebPackager {
    base: PackagerBase,
}

impl WebPackager {
    pub fn new(base: PackagerBase) -> Self {
        Self { base }
    }
}

struct WebPackSink {
    dir: PathBuf,
    installer_base: String,
    current: Option<ZipWriter<BufWriter<File>>>,
    position: u64,
    written: Vec<PathBuf>,
}

impl Write for WebPackSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let zip = self
            .current
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "no pack archive open"))?;
        let n = zip.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.current.as_mut() {
            Some(zip) => zip.flush(),
            None => Ok(()),
        }
    }
}

impl PackSink for WebPackSink {
    fn begin_pack(&mut self, index: usize) -> Result<()> {
        let path = self.dir.join(entries::web_pack(&self.installer_base, index));
        let file = File::create(&path).with_context(|| format!("Failed to create pack archive {:?}", path))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        zip.start_file(entries::pack_data(index), file_options())?;
        self.current = Some(zip);
        self.position = 0;
        self.written.push(path);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn end_pack(&mut self, index: usize) -> Result<()> {
        if let Some(zip) = self.current.take() {
            zip.finish()
                .with_context(|| format!("Failed to finalize pack archive {}", index))?
                .flush()?;
        }
        Ok(())
    }
}

impl Packager for WebPackager {
    fn base(&self) -> &PackagerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PackagerBase {
        &mut self.base
    }

    fn kind(&self) -> InstallerKind {
        InstallerKind::Web
    }

    fn create_installer(&mut self, output: &Path) -> Result<PackagerReport> {
        if self.base.info.web_dir_url.as_deref().map(str::trim).unwrap_or("").is_empty() {
            bail!("A web installer needs <webdir> in <info>");
        }
        self.base.prepare_output(output, self.kind())?;
        self.base.listener().packager_start();

        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut sink = WebPackSink {
            dir,
            installer_base: self.base.info.installer_base.clone(),
            current: None,
            position: 0,
            written: Vec::new(),
        };
        // Packs are fetched independently, so no pack may point into another.
        let (packs, manifests, bytes_written) = self.base.write_packs(&mut sink, false)?;

        let file = File::create(output).with_context(|| format!("Failed to create installer {:?}", output))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        self.base.write_metadata(&mut zip, &packs, &manifests, None)?;
        zip.finish()
            .context("Failed to finalize installer archive")?
            .flush()?;
        self.base.attach_runtime(output)?;

        self.base.listener().packager_msg(
            &format!(
                "Wrote {} pack archive(s) to publish under {}",
                sink.written.len(),
                self.base.info.web_dir_url.as_deref().unwrap_or_default()
            ),
            MsgKind::Info,
        );
        self.base.listener().packager_stop();

        Ok(PackagerReport {
            installer: output.to_path_buf(),
            extra_files: sink.written,
            packs: packs.len(),
            bytes_written,
            volumes: None,
        })
    }
}
