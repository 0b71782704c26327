//! Install-time state: everything read from the installer archive plus the
//! user's choices, shared by the navigator, the views and the unpacker.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::archive::InstallerArchive;
use crate::langpack::{Messages, DEFAULT_ISO3};
use crate::metadata::{
    entries, GuiPrefs, Info, InstallerRequirement, Pack, Panel, VolumesInfo, METADATA_VERSION,
};
use crate::paths;
use crate::platform::{self, OsConstraint, Platform};
use crate::rules::{ConditionContext, RulesEngine};
use crate::variables::{names, DynamicVariable, Variables};

#[derive(Debug, Clone)]
pub struct InstallData {
    pub info: Info,
    pub gui_prefs: GuiPrefs,
    pub variables: Variables,
    pub rules: RulesEngine,
    pub packs: Vec<Pack>,
    pub panels: Vec<Panel>,
    pub installer_requirements: Vec<InstallerRequirement>,
    pub dynamic_installer_requirements: Vec<InstallerRequirement>,
    pub volumes: Option<VolumesInfo>,
    /// ISO3 codes of the langpacks in the installer
    pub langpacks: Vec<String>,
    pub locale: String,
    pub messages: Messages,
    pub platform: Platform,
    /// Primary archive; volumes, web packs and loose files sit next to it
    pub archive_path: PathBuf,
    /// Extra directories searched for volumes
    pub media_dirs: Vec<PathBuf>,
    /// Set once files have been unpacked
    pub install_success: bool,
    selected: BTreeSet<String>,
}

impl InstallData {
    pub fn new(info: Info) -> Self {
        let mut variables = Variables::new();
        variables.set(names::APP_NAME, info.app_name.clone());
        variables.set(names::APP_VER, info.app_version.clone());
        Self {
            info,
            gui_prefs: GuiPrefs::default(),
            variables,
            rules: RulesEngine::new(),
            packs: Vec::new(),
            panels: Vec::new(),
            installer_requirements: Vec::new(),
            dynamic_installer_requirements: Vec::new(),
            volumes: None,
            langpacks: vec![DEFAULT_ISO3.to_string()],
            locale: DEFAULT_ISO3.to_string(),
            messages: Messages::builtin(),
            platform: Platform::current(),
            archive_path: PathBuf::new(),
            media_dirs: Vec::new(),
            install_success: false,
            selected: BTreeSet::new(),
        }
    }

    /// Read the installer metadata. `lang` picks the langpack when the
    /// installer carries it; otherwise the first langpack is used.
    pub fn load(archive: &mut InstallerArchive, lang: Option<&str>) -> Result<Self> {
        let info: Info = archive.read_json(entries::INFO)?;
        if info.format_version != METADATA_VERSION {
            bail!(
                "Installer metadata version {} is not supported (expected {})",
                info.format_version,
                METADATA_VERSION
            );
        }
        info!("Installer for {} {} ({})", info.app_name, info.app_version, info.installer_kind.as_str());

        let mut data = Self::new(info);
        data.archive_path = archive.path().to_path_buf();

        let vars: BTreeMap<String, String> = archive.read_json(entries::VARS)?;
        for (name, value) in vars {
            data.variables.set(name, value);
        }
        data.gui_prefs = archive.read_json_opt(entries::GUI_PREFS)?.unwrap_or_default();
        data.panels = archive.read_json(entries::PANELS_ORDER)?;
        data.packs = archive.read_json(entries::PACKS_INFO)?;
        data.rules = archive.read_json_opt(entries::RULES)?.unwrap_or_default();
        data.installer_requirements = archive.read_json_opt(entries::INSTALLER_REQUIREMENTS)?.unwrap_or_default();
        data.dynamic_installer_requirements = archive
            .read_json_opt(entries::DYN_INSTALLER_REQUIREMENTS)?
            .unwrap_or_default();
        data.volumes = archive.read_json_opt(entries::VOLUMES_INFO)?;
        let dynamic: Vec<DynamicVariable> = archive.read_json_opt(entries::DYN_VARIABLES)?.unwrap_or_default();
        for variable in dynamic {
            data.variables.add_dynamic(variable);
        }

        data.langpacks = archive
            .read_json_opt::<Vec<String>>(entries::LANGPACKS_INFO)?
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_ISO3.to_string()]);
        data.locale = match lang.map(str::to_ascii_lowercase) {
            Some(lang) if data.langpacks.contains(&lang) => lang,
            _ => data.langpacks[0].clone(),
        };
        let langpack = entries::langpack(&data.locale);
        if archive.has_entry(&langpack) {
            let bytes = archive.read_bytes(&langpack)?;
            let messages = Messages::from_bytes(&bytes)
                .with_context(|| format!("Invalid langpack '{}'", data.locale))?;
            data.messages.merge(messages);
        }

        data.set_builtin_variables();
        Ok(data)
    }

    /// Platform and user variables, only where the installer did not set them.
    fn set_builtin_variables(&mut self) {
        let defaults = [
            (
                names::INSTALL_PATH,
                paths::default_install_path(&self.info.app_name, self.info.app_subpath.as_deref())
                    .to_string_lossy()
                    .to_string(),
            ),
            (
                names::USER_HOME,
                paths::user::home_dir()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ),
            (names::USER_NAME, paths::user::name()),
            (names::FILE_SEPARATOR, std::path::MAIN_SEPARATOR.to_string()),
            (names::ISO3_LANG, self.locale.clone()),
        ];
        for (name, value) in defaults {
            if !self.variables.contains(name) {
                self.variables.set(name, value);
            }
        }
        if let Some(url) = &self.info.app_url {
            if !self.variables.contains(names::APP_URL) {
                self.variables.set(names::APP_URL, url.clone());
            }
        }
    }

    pub fn install_path(&self) -> PathBuf {
        PathBuf::from(self.variables.get(names::INSTALL_PATH).unwrap_or_default())
    }

    pub fn set_install_path(&mut self, path: &Path) {
        self.variables.set(names::INSTALL_PATH, path.to_string_lossy().to_string());
    }

    pub fn substitute(&self, text: &str) -> String {
        self.variables.substitute(text)
    }

    pub fn message<'a>(&'a self, id: &'a str) -> &'a str {
        self.messages.get(id)
    }

    /// Whether an optional condition holds; no condition always holds.
    pub fn condition_holds(&self, condition: Option<&str>) -> bool {
        match condition {
            Some(expr) if !expr.trim().is_empty() => self.rules.is_true(expr, self),
            _ => true,
        }
    }

    pub fn os_matches(&self, constraints: &[OsConstraint]) -> bool {
        platform::one_matches(constraints, &self.platform)
    }

    /// Re-evaluate dynamic variables against the current state.
    pub fn refresh_variables(&mut self) -> Result<()> {
        let rules = &self.rules;
        let selected = &self.selected;
        let platform = &self.platform;
        self.variables.refresh(|condition, variables| {
            let view = View {
                variables,
                selected,
                platform,
            };
            rules.is_true(condition, &view)
        })
    }

    pub fn pack_index(&self, name: &str) -> Option<usize> {
        self.packs.iter().position(|p| p.name == name)
    }

    pub fn pack(&self, name: &str) -> Option<&Pack> {
        self.packs.iter().find(|p| p.name == name)
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Raw selection change; see [`super::packs`] for the rules around it.
    pub(crate) fn set_selected(&mut self, name: &str, selected: bool) {
        if selected {
            if self.selected.insert(name.to_string()) {
                debug!("Pack {} selected", name);
            }
        } else if self.selected.remove(name) {
            debug!("Pack {} deselected", name);
        }
    }

    /// Selected packs with their indices, in installation order.
    pub fn selected_packs(&self) -> Vec<(usize, &Pack)> {
        self.packs
            .iter()
            .enumerate()
            .filter(|(_, p)| self.selected.contains(&p.name))
            .collect()
    }

    pub fn selected_names(&self) -> Vec<String> {
        self.selected_packs().into_iter().map(|(_, p)| p.name.clone()).collect()
    }
}

impl ConditionContext for InstallData {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(str::to_string)
    }

    fn is_pack_selected(&self, pack: &str) -> bool {
        self.selected.contains(pack)
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }
}

/// Condition context over borrowed parts, used while the variables are
/// being refreshed.
struct View<'a> {
    variables: &'a Variables,
    selected: &'a BTreeSet<String>,
    platform: &'a Platform,
}

impl ConditionContext for View<'_> {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).map(str::to_string)
    }

    fn is_pack_selected(&self, pack: &str) -> bool {
        self.selected.contains(pack)
    }

    fn platform(&self) -> &Platform {
        self.platform
    }
}
