//! Unattended installs
//!
//! Answers come from a TOML file:
//!
//! ```toml
//! packs = ["Base", "Docs"]
//!
//! [variables]
//! INSTALL_PATH = "/opt/demo"
//! ```
//!
//! Questions take their default answer; errors are logged and fail the
//! panel that raised them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use super::data::InstallData;
use super::packs;
use super::panels::{PanelContext, PanelView, SilentView};
use super::unpacker::{self, UnpackProgress};
use super::validation::{self, UiHandler};
use crate::metadata::Panel;

#[derive(Debug, Default, Deserialize)]
pub struct AutomatedConfig {
    /// Variables set before the first panel
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Packs to install besides the required ones; the preselection when
    /// absent
    #[serde(default)]
    pub packs: Option<Vec<String>>,
}

impl AutomatedConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file: {}", path.display()))?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse answers file")
    }

    /// Store the configured variables.
    pub fn apply_variables(&self, data: &mut InstallData) {
        for (name, value) in &self.variables {
            data.variables.set(name.clone(), value.clone());
        }
    }
}

/// Logs instead of asking.
#[derive(Debug, Default)]
pub struct AutomatedUi {
    pub errors: usize,
}

impl UiHandler for AutomatedUi {
    fn emit_notification(&mut self, message: &str) {
        info!("{}", message);
    }

    fn emit_warning(&mut self, title: &str, message: &str) -> bool {
        warn!("{}: {}", title, message);
        true
    }

    fn emit_error(&mut self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        self.errors += 1;
    }

    fn ask_question(&mut self, title: &str, question: &str, default: bool) -> bool {
        info!("{}: {} -> {}", title, question, if default { "yes" } else { "no" });
        default
    }
}

struct TargetView;

impl PanelView for TargetView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        info!("Install path: {}", ctx.data.install_path().display());
        Ok(true)
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        super::check_target(ctx.data, ctx.ui)
    }
}

struct PacksView {
    packs: Option<Vec<String>>,
    valid: bool,
}

impl PanelView for PacksView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        if let Some(names) = &self.packs {
            self.valid = match packs::select_only(ctx.data, names) {
                Ok(()) => true,
                Err(e) => {
                    ctx.ui.emit_error(ctx.panel.display_id(), &format!("{:#}", e));
                    false
                }
            };
        }
        info!("Packs: {}", ctx.data.selected_names().join(", "));
        Ok(true)
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        self.valid && validation::validate_packs(ctx.registry, ctx.panel, ctx.data, ctx.ui)
    }
}

struct InstallView {
    handle: Handle,
}

impl PanelView for InstallView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        if ctx.data.install_success {
            return Ok(true);
        }
        let mut last_pack = String::new();
        let mut on_progress = |progress: &UnpackProgress| {
            if progress.current_pack != last_pack {
                info!("Installing pack {}", progress.current_pack);
                last_pack = progress.current_pack.clone();
            }
        };
        let report = unpacker::install(ctx.data, &self.handle, ctx.ui, &mut on_progress)?;
        info!("✅ {} files installed", report.files_unpacked);
        Ok(true)
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        ctx.data.install_success
    }

    fn locks_previous(&self) -> bool {
        true
    }
}

/// Unattended view for a panel, by simple class name.
pub fn create_view(panel: &Panel, config: &AutomatedConfig, handle: &Handle) -> Box<dyn PanelView> {
    let class = panel.class_name.rsplit('.').next().unwrap_or(&panel.class_name);
    match class {
        "TargetPanel" | "DefaultTargetPanel" => Box::new(TargetView),
        "PacksPanel" | "ImgPacksPanel" | "TreePacksPanel" => Box::new(PacksView {
            packs: config.packs.clone(),
            valid: true,
        }),
        "InstallPanel" => Box::new(InstallView { handle: handle.clone() }),
        _ => Box::new(SilentView),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answers() {
        let config = AutomatedConfig::from_str(
            r#"
packs = ["Docs"]

[variables]
INSTALL_PATH = "/opt/demo"
"#,
        )
        .unwrap();
        assert_eq!(config.packs, Some(vec!["Docs".to_string()]));
        assert_eq!(config.variables.get("INSTALL_PATH").map(String::as_str), Some("/opt/demo"));

        let empty = AutomatedConfig::from_str("").unwrap();
        assert!(empty.packs.is_none());
        assert!(empty.variables.is_empty());
    }

    #[test]
    fn test_questions_take_defaults() {
        let mut ui = AutomatedUi::default();
        assert!(ui.ask_question("t", "q", true));
        assert!(!ui.ask_question("t", "q", false));
        ui.emit_error("t", "boom");
        assert_eq!(ui.errors, 1);
        assert!(!ui.is_interactive());
    }
}
