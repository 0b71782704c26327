//! IzPack Installer - runs a compiled installer archive
//!
//! The runtime is normally prepended to the primary archive, so by default
//! it installs from its own executable. It handles:
//! 1. CLI argument parsing (--auto, --archive, --media-dir, ...)
//! 2. Loading the installer metadata and langpack
//! 3. Walking the panels in the console, or unattended from an answers file

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use izpack::installer::{self, RunOptions};

/// IzPack Installer
#[derive(Parser, Debug)]
#[command(name = "izpack-installer")]
#[command(about = "Install an application from an IzPack installer archive")]
#[command(version)]
struct Args {
    /// Installer archive (defaults to this executable)
    #[arg(long, value_name = "FILE")]
    archive: Option<PathBuf>,

    /// Install unattended with answers from a TOML file
    #[arg(long, value_name = "FILE")]
    auto: Option<PathBuf>,

    /// Directory to search for installer volumes (repeatable)
    #[arg(long = "media-dir", value_name = "DIR")]
    media_dirs: Vec<PathBuf>,

    /// Langpack to use (ISO3 code, e.g. eng, deu)
    #[arg(long, value_name = "ISO3")]
    lang: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _ = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .try_init();

    info!("IzPack Installer v{}", env!("CARGO_PKG_VERSION"));

    let archive = match args.archive {
        Some(path) => path,
        None => std::env::current_exe().context("Failed to locate the installer executable")?,
    };
    info!("Archive: {:?}", archive);

    let rt = tokio::runtime::Runtime::new()?;
    let options = RunOptions {
        lang: args.lang,
        answers: args.auto,
        media_dirs: args.media_dirs,
    };

    match installer::run(&archive, options, rt.handle()) {
        Ok(true) => {
            println!("✅ Installation finished");
            Ok(())
        }
        Ok(false) => {
            println!("ℹ️  Installation cancelled");
            std::process::exit(1);
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ Installation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
