//! Compile installers of every kind and install them again.

use std::fs;
use std::path::{Path, PathBuf};

use izpack::compiler::Compiler;
use izpack::descriptor::Descriptor;
use izpack::installer::automated::AutomatedUi;
use izpack::installer::unpacker::{self, UnpackProgress, UnpackReport};
use izpack::installer::{self, packs, InstallData, InstallerArchive, RunOptions};
use izpack::metadata::InstallerKind;
use izpack::packager::PackagerReport;
use izpack::spanning::MAGIC_LENGTH;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const DESCRIPTOR: &str = r#"<installation version="1.0">
    <info>
        <appname>Demo</appname>
        <appversion>1.0</appversion>
        <webdir>http://packs.example.invalid/demo</webdir>
    </info>
    <panels>
        <panel classname="HelloPanel"/>
        <panel classname="TargetPanel"/>
        <panel classname="PacksPanel"/>
        <panel classname="InstallPanel"/>
        <panel classname="FinishPanel"/>
    </panels>
    <packs>
        <pack name="Base" required="yes">
            <description>Base files</description>
            <file src="README" targetdir="$INSTALL_PATH"/>
            <file src="bin" targetdir="$INSTALL_PATH"/>
        </pack>
        <pack name="Docs" required="no" preselected="no">
            <description>Documentation</description>
            <depends packname="Base"/>
            <singlefile src="doc/manual.txt" target="$INSTALL_PATH/doc/manual.txt"/>
            <singlefile src="README" target="$INSTALL_PATH/doc/README"/>
        </pack>
    </packs>
</installation>"#;

fn sources(dir: &Path) {
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::create_dir_all(dir.join("doc")).unwrap();
    fs::write(dir.join("README"), "Demo readme\n".repeat(20)).unwrap();
    fs::write(dir.join("bin/run.sh"), "#!/bin/sh\necho demo\n").unwrap();
    fs::write(dir.join("doc/manual.txt"), "Chapter one\n".repeat(40)).unwrap();
}

fn compile(xml: &str, src: &Path, output: &Path, kind: InstallerKind) -> PackagerReport {
    let descriptor = Descriptor::from_str(xml).unwrap();
    Compiler::new(descriptor, src).with_kind(kind).compile(output).unwrap()
}

fn install(archive_path: &Path, target: &Path, selection: &[&str]) -> anyhow::Result<(InstallData, UnpackReport)> {
    let mut archive = InstallerArchive::open(archive_path)?;
    let mut data = InstallData::load(&mut archive, None)?;
    data.set_install_path(target);
    let names: Vec<String> = selection.iter().map(|s| s.to_string()).collect();
    packs::select_only(&mut data, &names)?;

    let rt = Runtime::new()?;
    let mut ui = AutomatedUi::default();
    let mut on_progress = |_: &UnpackProgress| {};
    let report = unpacker::install(&mut data, rt.handle(), &mut ui, &mut on_progress)?;
    Ok((data, report))
}

fn assert_installed(target: &Path, src: &Path, with_docs: bool) {
    assert_eq!(fs::read(target.join("README")).unwrap(), fs::read(src.join("README")).unwrap());
    assert_eq!(
        fs::read(target.join("bin/run.sh")).unwrap(),
        fs::read(src.join("bin/run.sh")).unwrap()
    );
    assert_eq!(target.join("doc/manual.txt").exists(), with_docs);
    if with_docs {
        assert_eq!(
            fs::read(target.join("doc/manual.txt")).unwrap(),
            fs::read(src.join("doc/manual.txt")).unwrap()
        );
        assert_eq!(fs::read(target.join("doc/README")).unwrap(), fs::read(src.join("README")).unwrap());
    }
}

fn workspace() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    let target = tmp.path().join("target");
    sources(&src);
    (tmp, src, out, target)
}

#[test]
fn test_standard_installer_round_trip() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(DESCRIPTOR, &src, &out.join("install.jar"), InstallerKind::Standard);
    assert_eq!(report.packs, 2);
    assert!(report.extra_files.is_empty());
    // README is shared by both packs and written once
    let readme = fs::metadata(src.join("README")).unwrap().len();
    let manual = fs::metadata(src.join("doc/manual.txt")).unwrap().len();
    let script = fs::metadata(src.join("bin/run.sh")).unwrap().len();
    assert_eq!(report.bytes_written, readme + manual + script);

    let (data, unpacked) = install(&report.installer, &target, &["Docs"]).unwrap();
    assert!(data.install_success);
    assert_eq!(unpacked.packs, vec!["Base", "Docs"]);
    assert_installed(&target, &src, true);

    let log = fs::read_to_string(target.join("Uninstaller").join("install.log")).unwrap();
    assert_eq!(log.lines().next(), Some(target.to_string_lossy().as_ref()));
    assert!(log.contains("manual.txt"));
    assert!(target.join(".installationinformation").exists());
}

#[test]
fn test_required_packs_only() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(DESCRIPTOR, &src, &out.join("install.jar"), InstallerKind::Standard);

    let (data, unpacked) = install(&report.installer, &target, &[]).unwrap();
    assert_eq!(data.selected_names(), vec!["Base"]);
    assert_eq!(unpacked.packs, vec!["Base"]);
    assert_installed(&target, &src, false);
}

#[test]
fn test_web_installer_uses_local_pack_archives() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(DESCRIPTOR, &src, &out.join("install.jar"), InstallerKind::Web);
    assert_eq!(report.extra_files.len(), 2);
    for file in &report.extra_files {
        assert!(file.exists(), "{:?} missing", file);
    }

    install(&report.installer, &target, &["Docs"]).unwrap();
    assert_installed(&target, &src, true);
}

#[test]
fn test_web_installer_without_webdir_fails() {
    let (_tmp, src, out, _target) = workspace();
    let xml = DESCRIPTOR.replace("<webdir>http://packs.example.invalid/demo</webdir>", "");
    let descriptor = Descriptor::from_str(&xml).unwrap();
    let result = Compiler::new(descriptor, &src)
        .with_kind(InstallerKind::Web)
        .compile(&out.join("install.jar"));
    assert!(result.is_err());
}

fn multi_volume_descriptor() -> String {
    DESCRIPTOR.replace(
        "</packs>",
        r#"</packs>
    <packaging>
        <packager class="com.izforge.izpack.compiler.packager.impl.MultiVolumePackager">
            <options volumesize="128" firstvolumefreespace="32"/>
        </packager>
    </packaging>"#,
    )
}

#[test]
fn test_multi_volume_installer_round_trip() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(&multi_volume_descriptor(), &src, &out.join("install.jar"), InstallerKind::MultiVolume);
    let volumes = report.volumes.clone().unwrap();
    assert!(volumes.volume_count > 2);
    assert_eq!(report.extra_files.len(), volumes.volume_count);
    for file in &report.extra_files {
        assert!(fs::metadata(file).unwrap().len() <= 128);
    }

    // volumes hold the magic header plus raw pack bytes; the second README
    // is a back-reference and takes no space
    let spanned: u64 = report
        .extra_files
        .iter()
        .map(|file| fs::metadata(file).unwrap().len() - MAGIC_LENGTH as u64)
        .sum();
    let readme = fs::metadata(src.join("README")).unwrap().len();
    let manual = fs::metadata(src.join("doc/manual.txt")).unwrap().len();
    let script = fs::metadata(src.join("bin/run.sh")).unwrap().len();
    assert_eq!(report.bytes_written, spanned);
    assert_eq!(report.bytes_written, readme + manual + script);

    install(&report.installer, &target, &["Docs"]).unwrap();
    assert_installed(&target, &src, true);
}

const SHARED_SOURCE: &str = r#"<installation version="1.0">
    <info>
        <appname>Demo</appname>
        <appversion>1.0</appversion>
    </info>
    <panels>
        <panel classname="InstallPanel"/>
    </panels>
    <packs>
        <pack name="Base" required="yes">
            <description>Base files</description>
            <singlefile src="README" target="$INSTALL_PATH/a/README"/>
            <singlefile src="README" target="$INSTALL_PATH/b/README"/>
        </pack>
    </packs>
</installation>"#;

fn assert_shared_source_installed(target: &Path, src: &Path) {
    let expected = fs::read(src.join("README")).unwrap();
    assert_eq!(fs::read(target.join("a/README")).unwrap(), expected);
    assert_eq!(fs::read(target.join("b/README")).unwrap(), expected);
}

#[test]
fn test_same_source_twice_in_one_pack() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(SHARED_SOURCE, &src, &out.join("install.jar"), InstallerKind::Standard);
    let readme = fs::metadata(src.join("README")).unwrap().len();
    assert_eq!(report.bytes_written, readme);

    let (data, unpacked) = install(&report.installer, &target, &[]).unwrap();
    assert!(data.install_success);
    assert_eq!(unpacked.packs, vec!["Base"]);
    assert_shared_source_installed(&target, &src);
}

#[test]
fn test_same_source_twice_in_one_pack_multi_volume() {
    let (_tmp, src, out, target) = workspace();
    let xml = SHARED_SOURCE.replace(
        "</packs>",
        r#"</packs>
    <packaging>
        <packager class="com.izforge.izpack.compiler.packager.impl.MultiVolumePackager">
            <options volumesize="128" firstvolumefreespace="32"/>
        </packager>
    </packaging>"#,
    );
    let report = compile(&xml, &src, &out.join("install.jar"), InstallerKind::MultiVolume);
    let readme = fs::metadata(src.join("README")).unwrap().len();
    assert_eq!(report.bytes_written, readme);

    install(&report.installer, &target, &[]).unwrap();
    assert_shared_source_installed(&target, &src);
}

#[test]
fn test_multi_volume_missing_volume_fails() {
    let (_tmp, src, out, target) = workspace();
    let report = compile(&multi_volume_descriptor(), &src, &out.join("install.jar"), InstallerKind::MultiVolume);
    fs::remove_file(&report.extra_files[1]).unwrap();

    let err = install(&report.installer, &target, &["Docs"]).unwrap_err();
    assert!(format!("{:#}", err).contains("volume"), "{:#}", err);
}

#[test]
fn test_multi_volume_found_in_media_dir() {
    let (tmp, src, out, target) = workspace();
    let report = compile(&multi_volume_descriptor(), &src, &out.join("install.jar"), InstallerKind::MultiVolume);
    let media = tmp.path().join("media");
    fs::create_dir_all(&media).unwrap();
    let moved = &report.extra_files[1];
    fs::rename(moved, media.join(moved.file_name().unwrap())).unwrap();

    let mut archive = InstallerArchive::open(&report.installer).unwrap();
    let mut data = InstallData::load(&mut archive, None).unwrap();
    data.set_install_path(&target);
    data.media_dirs = vec![media];
    packs::select_only(&mut data, &["Docs".to_string()]).unwrap();

    let rt = Runtime::new().unwrap();
    let mut ui = AutomatedUi::default();
    let mut on_progress = |_: &UnpackProgress| {};
    unpacker::install(&mut data, rt.handle(), &mut ui, &mut on_progress).unwrap();
    assert_installed(&target, &src, true);
}

#[test]
fn test_duplicate_pack_names_fail_to_compile() {
    let (_tmp, src, out, _target) = workspace();
    let xml = DESCRIPTOR.replace(r#"<pack name="Docs""#, r#"<pack name="Base""#);
    let descriptor = Descriptor::from_str(&xml).unwrap();
    let err = Compiler::new(descriptor, &src)
        .compile(&out.join("install.jar"))
        .unwrap_err();
    assert!(format!("{:#}", err).contains("duplicate pack name"));
}

#[test]
fn test_unattended_run_with_answers_file() {
    let (tmp, src, out, target) = workspace();
    let report = compile(DESCRIPTOR, &src, &out.join("install.jar"), InstallerKind::Standard);

    let answers = tmp.path().join("answers.toml");
    fs::write(
        &answers,
        format!(
            "packs = [\"Docs\"]\n\n[variables]\nINSTALL_PATH = {:?}\n",
            target.to_string_lossy()
        ),
    )
    .unwrap();

    let rt = Runtime::new().unwrap();
    let options = RunOptions {
        lang: None,
        answers: Some(answers),
        media_dirs: Vec::new(),
    };
    assert!(installer::run(&report.installer, options, rt.handle()).unwrap());
    assert_installed(&target, &src, true);
}
