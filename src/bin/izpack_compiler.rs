//! IzPack Compiler - build installers from an installation descriptor
//!
//! Usage:
//!   izpack-compiler install.xml                   Standard installer next to the descriptor
//!   izpack-compiler install.xml -k web -o out.jar Web installer, packs as separate jars
//!   izpack-compiler install.xml -k multi-volume   Installer plus installer.pak volumes

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use izpack::compiler::Compiler;
use izpack::descriptor::Descriptor;
use izpack::metadata::InstallerKind;
use izpack::packager::{MsgKind, PackagerListener, PackagerReport};

#[derive(Parser, Debug)]
#[command(name = "izpack-compiler")]
#[command(about = "IzPack - compile an installation descriptor into an installer")]
#[command(version)]
struct Args {
    /// Installation descriptor (install.xml)
    descriptor: PathBuf,

    /// Base directory for relative sources (default: the descriptor's directory)
    #[arg(short, long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Installer kind: standard, web or multi-volume (default: from <packaging>)
    #[arg(short, long)]
    kind: Option<InstallerKind>,

    /// Output installer (default: install.jar next to the descriptor)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Runtime executable prepended to the installer
    #[arg(long, value_name = "FILE")]
    runtime: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    silent: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Packager messages on a spinner line.
struct SpinnerListener {
    bar: ProgressBar,
    verbose: bool,
}

impl SpinnerListener {
    fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar, verbose }
    }
}

impl PackagerListener for SpinnerListener {
    fn packager_msg(&self, msg: &str, kind: MsgKind) {
        match kind {
            MsgKind::Info => self.bar.set_message(msg.to_string()),
            MsgKind::Verbose if self.verbose => self.bar.println(format!("  {}", msg)),
            MsgKind::Verbose => {}
            MsgKind::Warning => self.bar.println(format!("⚠️  {}", msg)),
            MsgKind::Error => self.bar.println(format!("❌ {}", msg)),
        }
    }

    fn packager_start(&self) {
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn packager_stop(&self) {
        self.bar.finish_and_clear();
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .try_init();

    match run(&args) {
        Ok(report) => {
            if !args.silent {
                print_report(&report);
            }
        }
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<PackagerReport> {
    let descriptor = Descriptor::from_file(&args.descriptor)?;
    let descriptor_dir = args
        .descriptor
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let base_dir = args.base_dir.clone().unwrap_or_else(|| descriptor_dir.to_path_buf());
    let output = args.output.clone().unwrap_or_else(|| descriptor_dir.join("install.jar"));

    if !args.silent {
        println!("🔧 IzPack Compiler v{}\n", env!("CARGO_PKG_VERSION"));
        println!("   Descriptor: {}", args.descriptor.display());
        println!("   Base dir:   {}", base_dir.display());
    }

    let mut compiler = Compiler::new(descriptor, &base_dir);
    if let Some(kind) = args.kind {
        compiler = compiler.with_kind(kind);
    }
    if let Some(runtime) = &args.runtime {
        compiler = compiler.with_runtime(runtime.clone());
    }
    if !args.silent {
        compiler = compiler.with_listener(Box::new(SpinnerListener::new(args.verbose)));
    }

    compiler
        .compile(&output)
        .with_context(|| format!("Failed to compile {}", args.descriptor.display()))
}

fn print_report(report: &PackagerReport) {
    println!("✅ Installer written: {}", report.installer.display());
    println!("   Packs: {}", report.packs);
    println!("   Pack data: {} bytes", report.bytes_written);
    if let Some(volumes) = &report.volumes {
        println!(
            "   Volumes: {} x {} ({} bytes max)",
            volumes.volume_count, volumes.volume_name, volumes.volume_size
        );
    }
    for file in &report.extra_files {
        println!("   + {}", file.display());
    }
}
