//! Validators, panel actions and the user-facing message channel.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::data::InstallData;
use super::panels::{Choice, NavigationState};
use crate::metadata::{InstallerRequirement, Panel};

/// How the installer talks to the user. Console and automated front-ends
/// implement this differently; the navigator and unpacker only see the trait.
pub trait UiHandler {
    fn emit_notification(&mut self, message: &str);

    /// Show a warning; `true` means carry on.
    fn emit_warning(&mut self, title: &str, message: &str) -> bool;

    fn emit_error(&mut self, title: &str, message: &str);

    /// Yes/no question.
    fn ask_question(&mut self, title: &str, question: &str, default: bool) -> bool;

    /// Ask for a filesystem path; `None` gives up.
    fn ask_path(&mut self, _title: &str, _question: &str) -> Option<std::path::PathBuf> {
        None
    }

    /// What to do after a panel was shown. Without a user, always move
    /// forward; the wizard ends once no panel is left.
    fn navigate(&mut self, _state: NavigationState) -> Choice {
        Choice::Next
    }

    /// Whether a user can correct a panel that failed validation.
    fn is_interactive(&self) -> bool {
        false
    }
}

/// Outcome of a data validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Error,
}

/// Checks install data before a panel may be left.
pub trait DataValidator: Send + Sync {
    fn validate(&self, panel: &Panel, data: &InstallData) -> Status;

    /// Langpack id of the message shown on error
    fn error_message_id(&self) -> &str;

    /// Langpack id of the message shown on warning
    fn warning_message_id(&self) -> &str;

    /// Answer used for a warning that has no message.
    fn default_answer(&self) -> bool {
        true
    }
}

/// Install path must be set; an existing non-empty directory is a warning.
pub struct TargetDirValidator;

impl DataValidator for TargetDirValidator {
    fn validate(&self, _panel: &Panel, data: &InstallData) -> Status {
        let path = data.install_path();
        if path.as_os_str().is_empty() {
            return Status::Error;
        }
        let occupied = std::fs::read_dir(&path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if occupied {
            Status::Warning
        } else {
            Status::Ok
        }
    }

    fn error_message_id(&self) -> &str {
        "TargetPanel.empty_target"
    }

    fn warning_message_id(&self) -> &str {
        "TargetPanel.warn"
    }
}

/// Every variable listed in the panel's `variables` parameter must be set
/// and non-blank.
pub struct VariableNotEmptyValidator;

impl DataValidator for VariableNotEmptyValidator {
    fn validate(&self, panel: &Panel, data: &InstallData) -> Status {
        let names = panel.config("variables").unwrap_or_default();
        let missing = names
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .find(|n| data.variables.get(n).map(|v| v.trim().is_empty()).unwrap_or(true));
        match missing {
            Some(name) => {
                debug!("Variable {} is empty", name);
                Status::Error
            }
            None => Status::Ok,
        }
    }

    fn error_message_id(&self) -> &str {
        "installer.error.variable.empty"
    }

    fn warning_message_id(&self) -> &str {
        ""
    }
}

/// The panel's `condition` parameter must hold.
pub struct ConditionValidator;

impl DataValidator for ConditionValidator {
    fn validate(&self, panel: &Panel, data: &InstallData) -> Status {
        match panel.config("condition") {
            Some(condition) if !data.condition_holds(Some(condition)) => Status::Error,
            _ => Status::Ok,
        }
    }

    fn error_message_id(&self) -> &str {
        "installer.error.condition"
    }

    fn warning_message_id(&self) -> &str {
        ""
    }
}

/// Runs at a fixed point of a panel's life cycle.
pub trait PanelAction: Send + Sync {
    fn execute(&self, params: &BTreeMap<String, String>, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<()>;
}

/// Sets variable `name` to `value` (substituted).
pub struct SetVariableAction;

impl PanelAction for SetVariableAction {
    fn execute(&self, params: &BTreeMap<String, String>, data: &mut InstallData, _ui: &mut dyn UiHandler) -> Result<()> {
        let name = params
            .get("name")
            .ok_or_else(|| anyhow::anyhow!("SetVariableAction needs a 'name' parameter"))?;
        let value = data.substitute(params.get("value").map(String::as_str).unwrap_or_default());
        data.variables.set(name.clone(), value);
        Ok(())
    }
}

/// Removes variable `name`.
pub struct ClearVariableAction;

impl PanelAction for ClearVariableAction {
    fn execute(&self, params: &BTreeMap<String, String>, data: &mut InstallData, _ui: &mut dyn UiHandler) -> Result<()> {
        if let Some(name) = params.get("name") {
            data.variables.remove(name);
        }
        Ok(())
    }
}

/// Fails unless the install path can be created.
pub struct CreateInstallPathAction;

impl PanelAction for CreateInstallPathAction {
    fn execute(&self, _params: &BTreeMap<String, String>, data: &mut InstallData, _ui: &mut dyn UiHandler) -> Result<()> {
        let path = data.install_path();
        std::fs::create_dir_all(&path).with_context(|| format!("Cannot create {:?}", path))?;
        data.set_install_path(&path);
        Ok(())
    }
}

/// Validators and actions by class name. Fully qualified names resolve by
/// their last segment.
pub struct Registry {
    validators: HashMap<String, Box<dyn DataValidator>>,
    actions: HashMap<String, Box<dyn PanelAction>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self {
            validators: HashMap::new(),
            actions: HashMap::new(),
        };
        registry.register_validator("TargetDirValidator", Box::new(TargetDirValidator));
        registry.register_validator("VariableNotEmptyValidator", Box::new(VariableNotEmptyValidator));
        registry.register_validator("ConditionValidator", Box::new(ConditionValidator));
        registry.register_action("SetVariableAction", Box::new(SetVariableAction));
        registry.register_action("ClearVariableAction", Box::new(ClearVariableAction));
        registry.register_action("CreateInstallPathAction", Box::new(CreateInstallPathAction));
        registry
    }
}

fn simple_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

impl Registry {
    pub fn register_validator(&mut self, name: &str, validator: Box<dyn DataValidator>) {
        self.validators.insert(name.to_string(), validator);
    }

    pub fn register_action(&mut self, name: &str, action: Box<dyn PanelAction>) {
        self.actions.insert(name.to_string(), action);
    }

    pub fn validator(&self, class_name: &str) -> Option<&dyn DataValidator> {
        self.validators.get(simple_name(class_name)).map(|v| v.as_ref())
    }

    pub fn action(&self, class_name: &str) -> Option<&dyn PanelAction> {
        self.actions.get(simple_name(class_name)).map(|a| a.as_ref())
    }

    /// Run a named validator and talk to the user about the outcome.
    /// `false` blocks the transition.
    pub fn run_validator(&self, class_name: &str, panel: &Panel, data: &InstallData, ui: &mut dyn UiHandler) -> bool {
        let validator = match self.validator(class_name) {
            Some(v) => v,
            None => {
                warn!("Unknown validator {}, skipped", class_name);
                return true;
            }
        };
        match validator.validate(panel, data) {
            Status::Ok => true,
            Status::Warning => {
                let id = validator.warning_message_id();
                if id.is_empty() {
                    validator.default_answer()
                } else {
                    ui.ask_question(data.message("installer.warning"), data.message(id), validator.default_answer())
                }
            }
            Status::Error => {
                let id = validator.error_message_id();
                let message = if id.is_empty() { class_name } else { data.message(id) };
                ui.emit_error(data.message("installer.error"), message);
                false
            }
        }
    }

    /// Run actions in order; the first failure stops the chain.
    pub fn run_actions(
        &self,
        actions: &[crate::metadata::PanelActionConfig],
        data: &mut InstallData,
        ui: &mut dyn UiHandler,
    ) -> Result<()> {
        for config in actions {
            match self.action(&config.class_name) {
                Some(action) => action.execute(&config.params, data, ui)?,
                None => warn!("Unknown panel action {}, skipped", config.class_name),
            }
        }
        Ok(())
    }
}

/// Check requirements; each failing one is reported. `true` when all hold.
pub fn check_requirements(requirements: &[InstallerRequirement], data: &InstallData, ui: &mut dyn UiHandler) -> bool {
    let mut ok = true;
    for requirement in requirements {
        if !data.condition_holds(Some(&requirement.condition)) {
            let message = data.substitute(data.message(&requirement.message));
            ui.emit_error(data.message("installer.error"), &message);
            ok = false;
        }
    }
    ok
}

/// Run the validators of every selected pack.
pub fn validate_packs(registry: &Registry, panel: &Panel, data: &InstallData, ui: &mut dyn UiHandler) -> bool {
    data.selected_packs()
        .iter()
        .flat_map(|(_, p)| p.validators.iter())
        .all(|v| registry.run_validator(v, panel, data, ui))
}
