//! Console front-end
//!
//! Terminal versions of the standard panels, built on dialoguer prompts and
//! an indicatif progress bar. Panels without a console version print their
//! title and move on.

use anyhow::Result;
use dialoguer::{Confirm, Input, MultiSelect, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::runtime::Handle;
use tracing::warn;

use super::archive::InstallerArchive;
use super::data::InstallData;
use super::packs;
use super::panels::{Choice, NavigationState, PanelContext, PanelView};
use super::unpacker::{self, UnpackProgress};
use super::validation::{self, UiHandler};
use crate::metadata::{to_byte_units, Panel};

/// Prompts on the terminal.
pub struct ConsoleUi {
    next: String,
    previous: String,
    quit: String,
    /// Set once a prompt failed, e.g. without a terminal
    broken: bool,
}

impl ConsoleUi {
    pub fn new(data: &InstallData) -> Self {
        Self {
            next: data.message("installer.next").to_string(),
            previous: data.message("installer.prev").to_string(),
            quit: data.message("installer.quit").to_string(),
            broken: false,
        }
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> bool {
        match Confirm::new().with_prompt(prompt).default(default).interact() {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                self.broken = true;
                default
            }
        }
    }
}

impl UiHandler for ConsoleUi {
    fn emit_notification(&mut self, message: &str) {
        println!("ℹ️  {}", message);
    }

    fn emit_warning(&mut self, title: &str, message: &str) -> bool {
        println!("⚠️  {}: {}", title, message);
        self.confirm("Continue?", true)
    }

    fn emit_error(&mut self, title: &str, message: &str) {
        eprintln!("❌ {}: {}", title, message);
    }

    fn ask_question(&mut self, title: &str, question: &str, default: bool) -> bool {
        println!("{}", title);
        self.confirm(question, default)
    }

    fn ask_path(&mut self, title: &str, question: &str) -> Option<PathBuf> {
        println!("{}", question);
        let answer: Result<String, _> = Input::new().with_prompt(title).allow_empty(true).interact_text();
        match answer {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path.trim())),
            Ok(_) => None,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                self.broken = true;
                None
            }
        }
    }

    fn navigate(&mut self, state: NavigationState) -> Choice {
        if self.broken {
            return Choice::Quit;
        }
        let mut choices = Vec::new();
        if state.next {
            choices.push((Choice::Next, self.next.as_str()));
        }
        if state.previous {
            choices.push((Choice::Previous, self.previous.as_str()));
        }
        if state.quit || choices.is_empty() {
            choices.push((Choice::Quit, self.quit.as_str()));
        }
        let labels: Vec<&str> = choices.iter().map(|(_, label)| *label).collect();
        match Select::new().items(&labels).default(0).interact() {
            Ok(index) => choices[index].0,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                self.broken = true;
                Choice::Quit
            }
        }
    }

    fn is_interactive(&self) -> bool {
        !self.broken
    }
}

/// Keeps prompts from tearing through the progress bar.
struct SuspendingUi<'a> {
    inner: &'a mut dyn UiHandler,
    bar: &'a ProgressBar,
}

impl UiHandler for SuspendingUi<'_> {
    fn emit_notification(&mut self, message: &str) {
        let inner = &mut *self.inner;
        self.bar.suspend(|| inner.emit_notification(message))
    }

    fn emit_warning(&mut self, title: &str, message: &str) -> bool {
        let inner = &mut *self.inner;
        self.bar.suspend(|| inner.emit_warning(title, message))
    }

    fn emit_error(&mut self, title: &str, message: &str) {
        let inner = &mut *self.inner;
        self.bar.suspend(|| inner.emit_error(title, message))
    }

    fn ask_question(&mut self, title: &str, question: &str, default: bool) -> bool {
        let inner = &mut *self.inner;
        self.bar.suspend(|| inner.ask_question(title, question, default))
    }

    fn ask_path(&mut self, title: &str, question: &str) -> Option<PathBuf> {
        let inner = &mut *self.inner;
        self.bar.suspend(|| inner.ask_path(title, question))
    }

    fn is_interactive(&self) -> bool {
        self.inner.is_interactive()
    }
}

fn heading(text: &str) {
    println!();
    println!("━━ {} ━━", text);
}

/// Drop markup so HTML resources read as plain text.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Text resource of a panel: `<Class>.<suffix>_<id>` first, then
/// `<Class>.<suffix>`.
fn panel_text(archive: &mut InstallerArchive, panel: &Panel, class: &str, suffix: &str) -> Option<String> {
    let mut ids = Vec::new();
    if let Some(id) = &panel.id {
        ids.push(format!("{}.{}_{}", class, suffix, id));
    }
    ids.push(format!("{}.{}", class, suffix));
    for id in ids {
        match archive.resource(&id) {
            Ok(Some(bytes)) => {
                let text = String::from_utf8_lossy(&bytes).to_string();
                return Some(if class.starts_with("HTML") { strip_html(&text) } else { text });
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read resource {}: {}", id, e),
        }
    }
    None
}

struct HelloView;

impl PanelView for HelloView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        let data = &*ctx.data;
        heading(data.message("installer.title"));
        println!(
            "{} {} {}",
            data.message("HelloPanel.welcome1"),
            data.info.app_name,
            data.info.app_version
        );
        if !data.info.authors.is_empty() {
            println!("{}", data.message("HelloPanel.authors"));
            for author in &data.info.authors {
                if author.email.is_empty() {
                    println!("  - {}", author.name);
                } else {
                    println!("  - {} <{}>", author.name, author.email);
                }
            }
        }
        if let Some(url) = &data.info.app_url {
            println!("{} {}", data.message("HelloPanel.url"), url);
        }
        Ok(true)
    }
}

struct InfoView {
    text: Option<String>,
}

impl PanelView for InfoView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        heading(ctx.panel.display_id());
        match &self.text {
            Some(text) => println!("{}", ctx.data.substitute(text)),
            None => warn!("No text resource for panel {}", ctx.panel.display_id()),
        }
        Ok(true)
    }
}

struct LicenceView {
    text: Option<String>,
    accepted: bool,
}

impl PanelView for LicenceView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        heading(ctx.panel.display_id());
        if let Some(text) = &self.text {
            println!("{}", text);
        }
        let prompt = ctx.data.message("LicencePanel.agree").to_string();
        self.accepted = ctx.ui.ask_question(ctx.panel.display_id(), &prompt, false);
        Ok(true)
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        if !self.accepted {
            let message = ctx.data.message("LicencePanel.notagree").to_string();
            ctx.ui.emit_error(ctx.panel.display_id(), &message);
        }
        self.accepted
    }
}

struct TargetView;

impl PanelView for TargetView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        heading(ctx.data.message("TargetPanel.info"));
        let current = ctx.data.install_path().to_string_lossy().to_string();
        let answer: Result<String, _> = Input::new()
            .with_prompt(ctx.data.message("TargetPanel.info"))
            .default(current.clone())
            .interact_text();
        let path = match answer {
            Ok(path) => path,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                current
            }
        };
        ctx.data.set_install_path(&PathBuf::from(path.trim()));
        Ok(true)
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        super::check_target(ctx.data, ctx.ui)
    }
}

struct PacksView {
    valid: bool,
}

impl PanelView for PacksView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        heading(ctx.data.message("PacksPanel.info"));
        let required = ctx.data.message("PacksPanel.required").to_string();
        let visible: Vec<(String, String, bool)> = packs::visible_packs(ctx.data)
            .into_iter()
            .map(|p| {
                let mut label = format!("{} ({})", p.name, p.size_string());
                if p.required {
                    label.push_str(&format!(" [{}]", required));
                }
                if !p.description.is_empty() {
                    label.push_str(&format!(" - {}", p.description));
                }
                (p.name.clone(), label, ctx.data.is_selected(&p.name))
            })
            .collect();
        let labels: Vec<&str> = visible.iter().map(|(_, label, _)| label.as_str()).collect();
        let defaults: Vec<bool> = visible.iter().map(|(_, _, selected)| *selected).collect();

        let chosen = match MultiSelect::new().items(&labels).defaults(&defaults).interact() {
            Ok(chosen) => chosen,
            Err(e) => {
                warn!("Prompt failed: {}", e);
                (0..visible.len()).filter(|&i| defaults[i]).collect()
            }
        };

        // Hidden packs keep their current selection.
        let mut names: Vec<String> = ctx
            .data
            .selected_packs()
            .iter()
            .filter(|(_, p)| p.hidden)
            .map(|(_, p)| p.name.clone())
            .collect();
        names.extend(chosen.into_iter().map(|i| visible[i].0.clone()));

        self.valid = match packs::select_only(ctx.data, &names) {
            Ok(()) => true,
            Err(e) => {
                ctx.ui.emit_error(ctx.panel.display_id(), &format!("{:#}", e));
                false
            }
        };
        println!(
            "{} {}",
            ctx.data.message("PacksPanel.space"),
            to_byte_units(packs::required_bytes(ctx.data))
        );
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
        heading(ctx.data.message("InstallPanel.overall"));
        if ctx.data.install_success {
            println!("{}", ctx.data.message("InstallPanel.finished"));
            return Ok(true);
        }

        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        let mut ui = SuspendingUi {
            inner: &mut *ctx.ui,
            bar: &bar,
        };
        let mut on_progress = |progress: &UnpackProgress| {
            bar.set_length(progress.total_bytes);
            bar.set_position(progress.unpacked_bytes);
            bar.set_message(progress.current_file.clone());
        };
        let result = unpacker::install(ctx.data, &self.handle, &mut ui, &mut on_progress);
        match result {
            Ok(report) => {
                bar.finish_with_message(ctx.data.message("InstallPanel.finished").to_string());
                println!("✅ {} files installed", report.files_unpacked);
                Ok(true)
            }
            Err(e) => {
                bar.abandon();
                Err(e)
            }
        }
    }

    fn is_validated(&mut self, ctx: &mut PanelContext<'_>) -> bool {
        ctx.data.install_success
    }

    fn locks_previous(&self) -> bool {
        true
    }
}

struct FinishView;

impl PanelView for FinishView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        let data = &*ctx.data;
        heading(ctx.panel.display_id());
        if !data.install_success {
            println!("{}", data.message("installer.cancelled"));
            return Ok(true);
        }
        println!("✅ {}", data.message("FinishPanel.success"));
        println!("{} {}", data.message("FinishPanel.installed.on"), data.install_path().display());
        if let Some(dir) = &data.info.uninstaller_path {
            if data.condition_holds(data.info.uninstaller_condition.as_deref()) {
                println!("{} {}", data.message("FinishPanel.uninst.info"), data.substitute(dir));
            }
        }
        Ok(true)
    }
}

struct GenericView;

impl PanelView for GenericView {
    fn activate(&mut self, ctx: &mut PanelContext<'_>) -> Result<bool> {
        heading(ctx.panel.display_id());
        Ok(true)
    }
}

/// Console view for a panel, by simple class name.
pub fn create_view(panel: &Panel, archive: &mut InstallerArchive, handle: &Handle) -> Box<dyn PanelView> {
    let class = panel.class_name.rsplit('.').next().unwrap_or(&panel.class_name);
    match class {
        "HelloPanel" | "CheckedHelloPanel" => Box::new(HelloView),
        "InfoPanel" | "HTMLInfoPanel" | "ReadMePanel" => Box::new(InfoView {
            text: panel_text(archive, panel, class, "info"),
        }),
        "LicencePanel" | "HTMLLicencePanel" => Box::new(LicenceView {
            text: panel_text(archive, panel, class, "licence"),
            accepted: false,
        }),
        "TargetPanel" | "DefaultTargetPanel" => Box::new(TargetView),
        "PacksPanel" | "ImgPacksPanel" | "TreePacksPanel" => Box::new(PacksView { valid: true }),
        "InstallPanel" => Box::new(InstallView { handle: handle.clone() }),
        "FinishPanel" | "SimpleFinishPanel" => Box::new(FinishView),
        _ => Box::new(GenericView),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<p>Hello &amp; <b>welcome</b></p>"), "Hello & welcome");
    }
}
