//! Panel navigation
//!
//! Panels are visited in declaration order. A panel whose condition is
//! false or whose OS constraints do not match is skipped in both
//! directions. Leaving a panel forward runs its pre-validation actions, the
//! dynamic installer requirements, the view's own check, the data
//! validators and finally the post-validation actions; any failure keeps
//! the wizard where it is.

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use super::data::InstallData;
use super::validation::{self, Registry, UiHandler};
use crate::metadata::Panel;

/// What a view gets to work with while it is active.
pub struct PanelContext<'a> {
    pub panel: &'a Panel,
    /// Validators and actions, for views that run them themselves
    pub registry: &'a Registry,
    pub data: &'a mut InstallData,
    pub ui: &'a mut dyn UiHandler,
}

/// Front-end side of a panel.
pub trait PanelView {
    /// Show the panel. `Ok(false)` rejects the switch.
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool>;

    /// Check user input before moving on.
    fn is_validated(&mut self, _ctx: &mut PanelContext<'_>) -> bool {
        true
    }

    fn locks_previous(&self) -> bool {
        false
    }

    fn locks_next(&self) -> bool {
        false
    }

    /// Hidden views still run when moving forward but are skipped going back.
    fn is_visible(&self) -> bool {
        true
    }
}

/// A view for panels that show nothing, e.g. in unattended mode.
pub struct SilentView;

impl PanelView for SilentView {
    fn activate(&mut self, _ctx: &mut PanelContext<'_>) -> Result<bool> {
        Ok(true)
    }
}

struct Entry {
    panel: Panel,
    view: Box<dyn PanelView>,
}

/// Ordered panels plus the index of the one being shown.
pub struct Panels {
    entries: Vec<Entry>,
    index: Option<usize>,
    registry: Registry,
}

impl Panels {
    pub fn new<F>(panels: Vec<Panel>, registry: Registry, mut create_view: F) -> Self
    where
        F: FnMut(&Panel) -> Box<dyn PanelView>,
    {
        let entries = panels
            .into_iter()
            .map(|panel| {
                let view = create_view(&panel);
                Entry { panel, view }
            })
            .collect();
        Self {
            entries,
            index: None,
            registry,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn panel(&self, index: usize) -> Option<&Panel> {
        self.entries.get(index).map(|e| &e.panel)
    }

    pub fn current(&self) -> Option<&Panel> {
        self.index.and_then(|i| self.panel(i))
    }

    /// Condition and OS constraints of the panel pass.
    pub fn can_show(&self, index: usize, data: &InstallData) -> bool {
        match self.entries.get(index) {
            Some(entry) => {
                data.os_matches(&entry.panel.os_constraints)
                    && data.condition_holds(entry.panel.condition.as_deref())
            }
            None => false,
        }
    }

    /// First showable panel after `from`, or from the start when `None`.
    pub fn next_index(&self, from: Option<usize>, data: &InstallData) -> Option<usize> {
        let start = from.map(|i| i + 1).unwrap_or(0);
        (start..self.entries.len()).find(|&i| self.can_show(i, data))
    }

    /// Last showable, visible panel before `from`.
    pub fn previous_index(&self, from: usize, data: &InstallData) -> Option<usize> {
        (0..from.min(self.entries.len()))
            .rev()
            .find(|&i| self.entries[i].view.is_visible() && self.can_show(i, data))
    }

    /// Run every panel's pre-construction actions.
    pub fn construct(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<()> {
        for entry in &self.entries {
            self.registry
                .run_actions(&entry.panel.actions.pre_construction, data, ui)?;
        }
        Ok(())
    }

    /// Validate the current panel and move to the next showable one.
    /// `false` when validation failed or there is nowhere to go.
    pub fn next(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler, validate: bool) -> Result<bool> {
        if let Some(current) = self.index {
            if validate && !self.validate(current, data, ui) {
                debug!("Panel {} did not validate", self.entries[current].panel.display_id());
                return Ok(false);
            }
        }
        match self.next_index(self.index, data) {
            Some(target) => self.switch_to(target, data, ui),
            None => Ok(false),
        }
    }

    /// Move to the previous showable panel. No validation.
    pub fn previous(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        let target = match self.index.and_then(|i| self.previous_index(i, data)) {
            Some(target) => target,
            None => return Ok(false),
        };
        self.switch_to(target, data, ui)
    }

    /// Show the current panel again.
    pub fn reactivate(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        match self.index {
            Some(current) => self.switch_to(current, data, ui),
            None => Ok(false),
        }
    }

    /// Make `target` the current panel. On rejection the previous index is
    /// restored.
    pub fn switch_to(&mut self, target: usize, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        if target >= self.entries.len() {
            bail!("No panel at index {}", target);
        }
        let previous = self.index;
        self.index = Some(target);
        data.refresh_variables()?;

        let Self { entries, registry, .. } = self;
        let entry = &mut entries[target];
        if let Err(e) = registry.run_actions(&entry.panel.actions.pre_activation, data, ui) {
            warn!("Pre-activation of {} failed: {:#}", entry.panel.display_id(), e);
            ui.emit_error(data.message("installer.error"), &format!("{:#}", e));
            self.index = previous;
            return Ok(false);
        }

        let mut ctx = PanelContext {
            panel: &entry.panel,
            registry: &*registry,
            data: &mut *data,
            ui: &mut *ui,
        };
        if !entry.view.activate(&mut ctx)? {
            debug!("Panel {} rejected activation", entry.panel.display_id());
            self.index = previous;
            return Ok(false);
        }
        info!("Panel {} ({})", target, entry.panel.display_id());
        Ok(true)
    }

    fn validate(&mut self, index: usize, data: &mut InstallData, ui: &mut dyn UiHandler) -> bool {
        let Self { entries, registry, .. } = self;
        let entry = &mut entries[index];
        let panel = &entry.panel;

        if let Err(e) = registry.run_actions(&panel.actions.pre_validation, data, ui) {
            ui.emit_error(data.message("installer.error"), &format!("{:#}", e));
            return false;
        }
        let requirements = data.dynamic_installer_requirements.clone();
        if !validation::check_requirements(&requirements, data, ui) {
            return false;
        }
        let mut ctx = PanelContext {
            panel,
            registry: &*registry,
            data: &mut *data,
            ui: &mut *ui,
        };
        if !entry.view.is_validated(&mut ctx) {
            return false;
        }
        if !panel
            .validators
            .iter()
            .all(|v| registry.run_validator(v, panel, data, ui))
        {
            return false;
        }
        if let Err(e) = registry.run_actions(&panel.actions.post_validation, data, ui) {
            ui.emit_error(data.message("installer.error"), &format!("{:#}", e));
            return false;
        }
        true
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn current_view(&self) -> Option<&dyn PanelView> {
        self.index.map(|i| self.entries[i].view.as_ref())
    }
}

/// Which navigation buttons are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigationState {
    pub next: bool,
    pub previous: bool,
    pub quit: bool,
}

/// Outcome of a forward move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved,
    /// Locked, not validated, or the target rejected activation
    Blocked,
    /// Validated, but no panel is left to show
    End,
}

/// What the user asked for after a panel was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Next,
    Previous,
    Quit,
}

/// Drives [`Panels`] and keeps the button state in sync with it.
pub struct Navigator {
    panels: Panels,
    state: NavigationState,
}

impl Navigator {
    pub fn new(panels: Panels) -> Self {
        Self {
            panels,
            state: NavigationState::default(),
        }
    }

    pub fn panels(&self) -> &Panels {
        &self.panels
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// Construct the panels and show the first one.
    pub fn start(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        self.panels.construct(data, ui)?;
        let shown = self.panels.next(data, ui, false)?;
        self.update_state(data);
        Ok(shown)
    }

    /// Validate and move forward. The target is resolved after validation,
    /// since actions run during it may make later panels showable.
    pub fn advance(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<Advance> {
        if self.panels.current_view().map(|v| v.locks_next()).unwrap_or(false) {
            return Ok(Advance::Blocked);
        }
        if let Some(current) = self.panels.index() {
            if !self.panels.validate(current, data, ui) {
                debug!("Panel {} did not validate", self.panels.entries[current].panel.display_id());
                self.update_state(data);
                return Ok(Advance::Blocked);
            }
        }
        let advanced = match self.panels.next_index(self.panels.index(), data) {
            Some(target) => {
                if self.panels.switch_to(target, data, ui)? {
                    Advance::Moved
                } else {
                    Advance::Blocked
                }
            }
            None => Advance::End,
        };
        self.update_state(data);
        Ok(advanced)
    }

    pub fn next(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        Ok(self.advance(data, ui)? == Advance::Moved)
    }

    pub fn previous(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        if !self.state.previous {
            return Ok(false);
        }
        let moved = self.panels.previous(data, ui)?;
        self.update_state(data);
        Ok(moved)
    }

    pub fn reactivate(&mut self, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
        let shown = self.panels.reactivate(data, ui)?;
        self.update_state(data);
        Ok(shown)
    }

    /// `true` when the installer may exit. Before the end of the wizard the
    /// user has to confirm.
    pub fn quit(&mut self, data: &InstallData, ui: &mut dyn UiHandler) -> bool {
        if !self.state.quit {
            return false;
        }
        if !self.state.next || data.install_success || !ui.is_interactive() {
            return true;
        }
        ui.ask_question(
            data.message("installer.quit.title"),
            data.message("installer.quit.message"),
            false,
        )
    }

    fn update_state(&mut self, data: &InstallData) {
        let index = self.panels.index();
        let view = self.panels.current_view();
        let locks_next = view.map(|v| v.locks_next()).unwrap_or(false);
        let locks_previous = view.map(|v| v.locks_previous()).unwrap_or(false);
        self.state = NavigationState {
            next: !locks_next && self.panels.next_index(index, data).is_some(),
            previous: !locks_previous && index.and_then(|i| self.panels.previous_index(i, data)).is_some(),
            quit: true,
        };
        debug!("Navigation {:?}", self.state);
    }
}

/// Run the wizard to the end. Returns whether files were installed.
///
/// Every successful forward move increases the panel index, so a
/// non-interactive run terminates after the last panel; an interactive one
/// ends when the user quits.
pub fn run_wizard(navigator: &mut Navigator, data: &mut InstallData, ui: &mut dyn UiHandler) -> Result<bool> {
    if !navigator.start(data, ui)? {
        bail!("No panel can be shown");
    }
    loop {
        let state = navigator.state();
        let interactive = ui.is_interactive();
        match ui.navigate(state) {
            // Without a user the next target is only known once the
            // current panel has validated.
            Choice::Next if state.next || !interactive => match navigator.advance(data, ui)? {
                Advance::Moved => {}
                Advance::End if !interactive => break,
                Advance::Blocked if !interactive => {
                    let id = navigator
                        .panels()
                        .current()
                        .map(|p| p.display_id().to_string())
                        .unwrap_or_default();
                    bail!("Panel {} could not be completed", id);
                }
                _ => {
                    navigator.reactivate(data, ui)?;
                }
            },
            Choice::Previous if state.previous => {
                navigator.previous(data, ui)?;
            }
            _ => {
                if navigator.quit(data, ui) {
                    break;
                }
                navigator.reactivate(data, ui)?;
            }
        }
    }
    Ok(data.install_success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::data::tests::info;
    use crate::installer::validation::tests::RecordingUi;
    use crate::metadata::PanelActionConfig;
    use crate::platform::OsConstraint;
    use crate::rules::Condition;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records activations; optionally rejects them or fails validation.
    struct TestView {
        log: Rc<RefCell<Vec<String>>>,
        reject: bool,
        valid: bool,
        lock_previous: bool,
        lock_next: bool,
        visible: bool,
    }

    impl PanelView for TestView {
        fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
            self.log.borrow_mut().push(ctx.panel.display_id().to_string());
            Ok(!self.reject)
        }

        fn is_validated(&mut self, _ctx: &mut PanelContext<'_>) -> bool {
            self.valid
        }

        fn locks_previous(&self) -> bool {
            self.lock_previous
        }

        fn locks_next(&self) -> bool {
            self.lock_next
        }

        fn is_visible(&self) -> bool {
            self.visible
        }
    }

    fn panel(id: &str) -> Panel {
        let mut panel = Panel::new(format!("{}Panel", id));
        panel.id = Some(id.to_string());
        panel
    }

    fn navigator(panels: Vec<Panel>, log: &Rc<RefCell<Vec<String>>>) -> Navigator {
        let log = Rc::clone(log);
        Navigator::new(Panels::new(panels, Registry::default(), move |p| {
            Box::new(TestView {
                log: Rc::clone(&log),
                reject: p.config("reject").is_some(),
                valid: p.config("invalid").is_none(),
                lock_previous: p.config("lock").is_some(),
                lock_next: p.config("lock_next").is_some(),
                visible: p.config("hidden").is_none(),
            })
        }))
    }

    fn data() -> InstallData {
        let mut data = InstallData::new(info());
        data.rules
            .add(
                "advanced",
                Condition::Variable {
                    name: "MODE".to_string(),
                    value: "advanced".to_string(),
                },
            )
            .unwrap();
        data
    }

    #[test]
    fn test_skips_hidden_panels() {
        let mut options = panel("options");
        options.condition = Some("advanced".to_string());
        let mut other_os = panel("other");
        other_os.os_constraints = vec![OsConstraint::family("no-such-os")];
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![panel("hello"), options, other_os, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        assert!(nav.start(&mut data, &mut ui).unwrap());
        assert_eq!(nav.state(), NavigationState { next: true, previous: false, quit: true });
        assert!(nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(3));
        assert_eq!(nav.state(), NavigationState { next: false, previous: true, quit: true });
        assert!(!nav.next(&mut data, &mut ui).unwrap());

        data.variables.set("MODE", "advanced");
        assert!(nav.previous(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(1));
        assert_eq!(*log.borrow(), vec!["hello", "finish", "options"]);
    }

    #[test]
    fn test_validation_blocks_next() {
        let mut license = panel("license");
        license.configuration.insert("invalid".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![license, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(!nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(0));
    }

    #[test]
    fn test_validator_and_requirements_block_next() {
        let mut target = panel("target");
        target.validators = vec!["VariableNotEmptyValidator".to_string()];
        target.configuration.insert("variables".to_string(), "DB_HOST".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![target, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(!nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(ui.errors.len(), 1);

        data.variables.set("DB_HOST", "localhost");
        data.dynamic_installer_requirements = vec![crate::metadata::InstallerRequirement {
            condition: "advanced".to_string(),
            message: "advanced mode only".to_string(),
        }];
        assert!(!nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(ui.errors.last().map(String::as_str), Some("advanced mode only"));

        data.variables.set("MODE", "advanced");
        assert!(nav.next(&mut data, &mut ui).unwrap());
    }

    #[test]
    fn test_rejected_activation_restores_index() {
        let mut broken = panel("broken");
        broken.configuration.insert("reject".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![panel("hello"), broken], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(!nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(0));
    }

    /// `secret` is only shown once `hello` set GREETED after validating.
    fn greeting_panels(data: &mut InstallData) -> Vec<Panel> {
        let mut hello = panel("hello");
        hello.actions.post_validation.push(PanelActionConfig {
            class_name: "com.izforge.SetVariableAction".to_string(),
            params: [("name", "GREETED"), ("value", "true")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        let mut secret = panel("secret");
        secret.condition = Some("greeted".to_string());
        data.rules
            .add(
                "greeted",
                Condition::Variable {
                    name: "GREETED".to_string(),
                    value: "true".to_string(),
                },
            )
            .unwrap();
        vec![hello, secret]
    }

    #[test]
    fn test_actions_run_around_transitions() {
        let mut data = data();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(greeting_panels(&mut data), &log);
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(!nav.state().next);
        assert!(nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().current().map(|p| p.display_id()), Some("secret"));
        assert_eq!(data.variables.get("GREETED"), Some("true"));
        assert_eq!(*log.borrow(), vec!["hello", "secret"]);
    }

    #[test]
    fn test_run_wizard_reaches_panels_enabled_by_actions() {
        let mut data = data();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(greeting_panels(&mut data), &log);
        let mut ui = RecordingUi::default();

        run_wizard(&mut nav, &mut data, &mut ui).unwrap();
        assert_eq!(*log.borrow(), vec!["hello", "secret"]);
    }

    #[test]
    fn test_hidden_panels_skipped_going_back() {
        let mut progress = panel("progress");
        progress.configuration.insert("hidden".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![panel("hello"), progress, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(1));
        assert!(nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().previous_index(2, &data), Some(0));
        assert!(nav.previous(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(0));
        assert_eq!(*log.borrow(), vec!["hello", "progress", "finish", "hello"]);
    }

    #[test]
    fn test_locked_next() {
        let mut install = panel("install");
        install.configuration.insert("lock_next".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![install, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        assert!(!nav.state().next);
        assert!(!nav.next(&mut data, &mut ui).unwrap());
        assert_eq!(nav.panels().index(), Some(0));
    }

    #[test]
    fn test_locked_previous() {
        let mut install = panel("install");
        install.configuration.insert("lock".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![panel("hello"), install, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        nav.start(&mut data, &mut ui).unwrap();
        nav.next(&mut data, &mut ui).unwrap();
        assert!(!nav.state().previous);
        assert!(!nav.previous(&mut data, &mut ui).unwrap());
        nav.next(&mut data, &mut ui).unwrap();
        assert!(nav.state().previous);
    }

    #[test]
    fn test_run_wizard_terminates() {
        let mut optional = panel("optional");
        optional.condition = Some("advanced".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![panel("hello"), optional, panel("target"), panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        let installed = run_wizard(&mut nav, &mut data, &mut ui).unwrap();
        assert!(!installed);
        assert_eq!(*log.borrow(), vec!["hello", "target", "finish"]);
    }

    #[test]
    fn test_run_wizard_fails_unattended_on_invalid_panel() {
        let mut license = panel("license");
        license.configuration.insert("invalid".to_string(), "yes".to_string());
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nav = navigator(vec![license, panel("finish")], &log);
        let mut data = data();
        let mut ui = RecordingUi::default();

        assert!(run_wizard(&mut nav, &mut data, &mut ui).is_err());
    }
}
