//! Installer runtime
//!
//! Reads an installer archive, walks the user through its panels and
//! unpacks the selected packs. Two front-ends share the navigator: an
//! interactive console and an unattended mode driven by an answers file.

pub mod archive;
pub mod automated;
pub mod console;
pub mod data;
pub mod packs;
pub mod panels;
pub mod state;
pub mod unpacker;
pub mod validation;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tracing::info;

pub use archive::InstallerArchive;
pub use data::InstallData;
pub use panels::{Navigator, Panels};
pub use state::{detect_install_state, InstallState};
pub use validation::{Registry, UiHandler};

/// How to run an installer.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Langpack to use, ISO3
    pub lang: Option<String>,
    /// Answers file; switches to unattended mode
    pub answers: Option<PathBuf>,
    /// Extra directories searched for volumes
    pub media_dirs: Vec<PathBuf>,
}

/// Check the chosen install path and what is already installed there.
/// Packs an earlier run installed are preselected once the path is accepted.
pub fn check_target(data: &mut InstallData, ui: &mut dyn UiHandler) -> bool {
    let path = data.install_path();
    if path.as_os_str().is_empty() {
        ui.emit_error(data.message("installer.error"), data.message("TargetPanel.empty_target"));
        return false;
    }

    let state = detect_install_state(&path, &data.info.app_version);
    info!("Target {:?}: {:?}", path, state);
    let accepted = match &state {
        InstallState::Fresh => {
            let occupied = std::fs::read_dir(&path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            !occupied || ui.ask_question(data.message("installer.warning"), data.message("TargetPanel.warn"), true)
        }
        InstallState::Installed { .. } => true,
        InstallState::Upgradeable { .. } => {
            ui.ask_question(data.message("installer.warning"), data.message("TargetPanel.upgrade"), true)
        }
        InstallState::Downgrade { .. } => {
            ui.ask_question(data.message("installer.warning"), data.message("TargetPanel.downgrade"), false)
        }
        InstallState::Corrupted => ui.emit_warning(data.message("installer.warning"), data.message("TargetPanel.warn")),
    };
    if accepted {
        packs::initial_selection(data, state.installed_packs());
    }
    accepted
}

/// Checks that run before the first panel: installer requirements, dynamic
/// variables and the initial pack selection.
pub fn prepare(data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<()> {
    let requirements = data.installer_requirements.clone();
    if !validation::check_requirements(&requirements, data, ui) {
        bail!("Installer requirements are not met");
    }
    data.refresh_variables()?;
    packs::initial_selection(data, &[]);
    Ok(())
}

/// Load `archive_path` and run it to the end. Returns whether files were
/// installed.
pub fn run(archive_path: &Path, options: RunOptions, handle: &Handle) -> Result<bool> {
    let mut archive = InstallerArchive::open(archive_path)?;
    let mut data = InstallData::load(&mut archive, options.lang.as_deref())?;
    data.media_dirs = options.media_dirs;
    let panel_defs = data.panels.clone();

    match options.answers {
        Some(answers) => {
            let config = automated::AutomatedConfig::from_file(&answers)?;
            config.apply_variables(&mut data);
            let mut ui = automated::AutomatedUi::default();
            prepare(&mut data, &mut ui)?;

            let panels = Panels::new(panel_defs, Registry::default(), |panel| {
                automated::create_view(panel, &config, handle)
            });
            let mut navigator = Navigator::new(panels);
            panels::run_wizard(&mut navigator, &mut data, &mut ui)
        }
        None => {
            let mut ui = console::ConsoleUi::new(&data);
            prepare(&mut data, &mut ui)?;

            let panels = Panels::new(panel_defs, Registry::default(), |panel| {
                console::create_view(panel, &mut archive, handle)
            });
            let mut navigator = Navigator::new(panels);
            panels::run_wizard(&mut navigator, &mut data, &mut ui)
        }
    }
}
