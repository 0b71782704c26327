//! Installer Compiler
//!
//! Turns a parsed [`Descriptor`] into a [`PackagerBase`] (info, variables,
//! langpacks, resources, rules, panels and packs), validates the pack graph
//! and hands the result to the packager for the requested installer kind.

pub mod pack_info;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::descriptor::{self, flag, os_constraints, params_map, split_list, Descriptor, PackDef};
use crate::error::{CompilerError, CompilerResult};
use crate::langpack::{self, DEFAULT_ISO3};
use crate::metadata::{
    Author, ExecutableFile, ExecuteFailure, ExecuteStage, GuiPrefs, Info, InstallerKind, InstallerRequirement,
    Pack, Panel, PanelActionConfig, PanelActions, ParsableFile, UpdateCheck, METADATA_VERSION,
};
use crate::packager::{self, MultiVolumePackager, Packager, PackagerBase, PackagerListener, PackagerReport};
use crate::rules::RulesEngine;
use crate::variables::{names, DynamicValue, DynamicVariable, SubstitutionType, Variables};
use pack_info::{FileOptions, PackInfo};

/// Default uninstall data location
const DEFAULT_UNINSTALLER_PATH: &str = "$INSTALL_PATH/Uninstaller";

pub struct Compiler {
    descriptor: Descriptor,
    base_dir: PathBuf,
    kind: Option<InstallerKind>,
    runtime: Option<PathBuf>,
    listener: Option<Box<dyn PackagerListener>>,
}

impl Compiler {
    /// `base_dir` resolves every relative `src` in the descriptor.
    pub fn new(descriptor: Descriptor, base_dir: &Path) -> Self {
        Self {
            descriptor,
            base_dir: base_dir.to_path_buf(),
            kind: None,
            runtime: None,
            listener: None,
        }
    }

    /// Override the kind named by `<packaging>`.
    pub fn with_kind(mut self, kind: InstallerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Executable to prepend to the primary archive.
    pub fn with_runtime(mut self, runtime: PathBuf) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn PackagerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Kind from the override, else from the `<packager class>` name.
    pub fn installer_kind(&self) -> InstallerKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        match self.descriptor.packager_class() {
            Some(class) if class.contains("MultiVolumePackager") => InstallerKind::MultiVolume,
            Some(class) if class.contains("WebPackager") => InstallerKind::Web,
            _ => InstallerKind::Standard,
        }
    }

    /// Assemble and validate everything without writing an installer.
    pub fn build(&self) -> Result<PackagerBase> {
        let kind = self.installer_kind();
        let info = self.build_info(kind);
        let mut base = PackagerBase::new(info);

        let variables = self.build_variables(&mut base);
        base.gui_prefs = self.build_gui_prefs();
        self.add_langpacks(&mut base)?;
        self.add_resources(&mut base, &variables)?;
        self.add_rules(&mut base)?;
        self.add_dynamic_variables(&mut base)?;
        base.installer_requirements = requirements(self.descriptor.installerrequirements.as_ref());
        base.dynamic_installer_requirements = requirements(self.descriptor.dynamicinstallerrequirements.as_ref());
        self.add_panels(&mut base)?;

        for def in &self.descriptor.packs.items {
            let pack = self.build_pack(def).with_context(|| format!("Failed to assemble pack '{}'", def.name))?;
            base.add_pack(pack);
        }

        let mut packs: Vec<Pack> = base.packs.iter().map(|p| p.pack.clone()).collect();
        check_packs(&packs)?;
        check_conditions(&base)?;
        compute_dependants(&mut packs);
        for (info, pack) in base.packs.iter_mut().zip(packs) {
            info.pack.dependants = pack.dependants;
        }

        if let Some(runtime) = &self.runtime {
            let bytes = std::fs::read(runtime).with_context(|| format!("Failed to read runtime {:?}", runtime))?;
            base.runtime = Some(bytes);
        }

        info!(
            "Compiled {} pack(s), {} panel(s), {} condition(s)",
            base.packs.len(),
            base.panels.len(),
            base.rules.len()
        );
        Ok(base)
    }

    /// Build and write the installer to `output`.
    pub fn compile(mut self, output: &Path) -> Result<PackagerReport> {
        let kind = self.installer_kind();
        let mut base = self.build()?;
        if let Some(listener) = self.listener.take() {
            base.set_listener(listener);
        }

        let mut packager: Box<dyn Packager> = match kind {
            InstallerKind::MultiVolume => {
                let mut multi_volume = MultiVolumePackager::new(base);
                if let Some(options) = self.descriptor.packager_options() {
                    multi_volume.configure(options.volumesize.as_deref(), options.firstvolumefreespace.as_deref())?;
                }
                Box::new(multi_volume)
            }
            other => packager::create(other, base),
        };
        packager.create_installer(output)
    }

    fn resolve(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn read_source(&self, src: &str) -> Result<Vec<u8>> {
        let path = self.resolve(src);
        std::fs::read(&path).with_context(|| format!("Failed to read {:?}", path))
    }

    fn build_info(&self, kind: InstallerKind) -> Info {
        let def = &self.descriptor.info;
        let text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        let uninstaller = def.uninstaller.as_ref();
        let uninstaller_path = match uninstaller {
            Some(u) if !flag(&u.write, true) => None,
            Some(u) => Some(text(&u.path).unwrap_or_else(|| DEFAULT_UNINSTALLER_PATH.to_string())),
            None => Some(DEFAULT_UNINSTALLER_PATH.to_string()),
        };

        Info {
            format_version: METADATA_VERSION,
            app_name: text(&def.appname).unwrap_or_default(),
            app_version: text(&def.appversion).unwrap_or_default(),
            app_url: text(&def.url),
            authors: def
                .authors
                .as_ref()
                .map(|a| {
                    a.items
                        .iter()
                        .map(|a| Author {
                            name: a.name.clone(),
                            email: a.email.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            app_subpath: text(&def.appsubpath),
            web_dir_url: text(&def.webdir),
            installer_kind: kind,
            installer_base: String::new(),
            uninstaller_path,
            uninstaller_condition: uninstaller.and_then(|u| text(&u.condition)),
            write_installation_information: flag(&def.writeinstallationinformation, true),
        }
    }

    /// Built-in and `<variables>` values; returns them for compile-time
    /// substitution of parsed resources.
    fn build_variables(&self, base: &mut PackagerBase) -> Variables {
        let info = &base.info;
        let mut variables = Variables::new();
        variables.set(names::APP_NAME, info.app_name.clone());
        variables.set(names::APP_VER, info.app_version.clone());
        if let Some(url) = &info.app_url {
            variables.set(names::APP_URL, url.clone());
        }
        for v in self.descriptor.variables.iter().flat_map(|v| &v.items) {
            variables.set(v.name.clone(), v.value.clone());
        }
        for (name, value) in variables.as_map() {
            base.set_variable(name.clone(), value.clone());
        }
        variables
    }

    fn build_gui_prefs(&self) -> GuiPrefs {
        match &self.descriptor.guiprefs {
            Some(def) => GuiPrefs {
                width: def.width.unwrap_or(800),
                height: def.height.unwrap_or(600),
                resizable: flag(&def.resizable, true),
                modifiers: def.modifiers.iter().map(|m| (m.key.clone(), m.value.clone())).collect(),
            },
            None => GuiPrefs {
                width: 800,
                height: 600,
                resizable: true,
                modifiers: BTreeMap::new(),
            },
        }
    }

    fn add_langpacks(&self, base: &mut PackagerBase) -> Result<()> {
        let defs = self.descriptor.locale.as_ref().map(|l| l.langpacks.as_slice()).unwrap_or_default();
        if defs.is_empty() {
            base.add_langpack(DEFAULT_ISO3, langpack::BUILTIN_ENG.as_bytes().to_vec());
            return Ok(());
        }
        for def in defs {
            let iso3 = def.iso3.trim().to_ascii_lowercase();
            let bytes = match &def.src {
                Some(src) => self.read_source(src)?,
                None => langpack::builtin(&iso3)
                    .map(|xml| xml.as_bytes().to_vec())
                    .ok_or_else(|| CompilerError::InvalidValue {
                        what: "langpack (no built-in langpack; give src)".to_string(),
                        value: iso3.clone(),
                    })?,
            };
            langpack::Messages::from_bytes(&bytes).with_context(|| format!("Invalid langpack '{}'", iso3))?;
            base.add_langpack(iso3, bytes);
        }
        Ok(())
    }

    fn add_resources(&self, base: &mut PackagerBase, variables: &Variables) -> Result<()> {
        for res in self.descriptor.resources.iter().flat_map(|r| &r.items) {
            let mut bytes = self.read_source(&res.src)?;
            if flag(&res.parse, false) {
                let kind: SubstitutionType = res.kind.as_deref().unwrap_or("plain").parse()?;
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("Resource '{}' is parsed but not valid UTF-8", res.id))?;
                bytes = variables.substitute_as(&text, kind).into_bytes();
            }
            debug!("Resource {} ({} bytes)", res.id, bytes.len());
            base.add_resource(res.id.clone(), bytes);
        }
        Ok(())
    }

    fn add_rules(&self, base: &mut PackagerBase) -> Result<()> {
        for def in self.descriptor.conditions.iter().flat_map(|c| &c.items) {
            let id = def
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .ok_or(CompilerError::MissingAttribute { element: "condition", attribute: "id" })?;
            let condition = def.to_condition().with_context(|| format!("Invalid condition '{}'", id))?;
            base.rules.add(id, condition)?;
        }
        Ok(())
    }

    fn add_dynamic_variables(&self, base: &mut PackagerBase) -> Result<()> {
        for def in self.descriptor.dynamicvariables.iter().flat_map(|d| &d.items) {
            let source = if let Some(env) = &def.environment {
                DynamicValue::Environment(env.clone())
            } else if let Some(value) = def.value.clone().or_else(|| def.value_element.clone()) {
                DynamicValue::Value(value)
            } else {
                return Err(CompilerError::MissingAttribute { element: "variable", attribute: "value" })
                    .with_context(|| format!("Dynamic variable '{}' has no value", def.name));
            };
            base.dynamic_variables.push(DynamicVariable {
                name: def.name.clone(),
                source,
                condition: def.condition.clone(),
                check_once: flag(&def.checkonce, false),
                ignore_failure: flag(&def.ignorefailure, true),
            });
        }
        Ok(())
    }

    fn add_panels(&self, base: &mut PackagerBase) -> Result<()> {
        for def in &self.descriptor.panels.items {
            let mut panel = Panel::new(def.classname.trim());
            panel.id = def.id.clone();
            panel.condition = def.condition.clone();
            panel.os_constraints = os_constraints(&def.os, &None)?;
            panel.validators = def.validators.iter().map(|v| v.classname.clone()).collect();
            panel.configuration = def.configuration.as_ref().map(|c| params_map(&c.params)).unwrap_or_default();

            let mut actions = PanelActions::default();
            for action in def.actions.iter().flat_map(|a| &a.items) {
                let config = PanelActionConfig {
                    class_name: action.classname.clone(),
                    params: params_map(&action.params),
                };
                match action.stage.trim().to_ascii_lowercase().as_str() {
                    "preconstruct" | "preconstruction" => actions.pre_construction.push(config),
                    "preactivate" | "preactivation" => actions.pre_activation.push(config),
                    "prevalidate" | "prevalidation" => actions.pre_validation.push(config),
                    "postvalidate" | "postvalidation" => actions.post_validation.push(config),
                    other => {
                        return Err(CompilerError::InvalidValue {
                            what: "panel action stage".to_string(),
                            value: other.to_string(),
                        }
                        .into())
                    }
                }
            }
            panel.actions = actions;

            for help in &def.help {
                let iso3 = help.iso3.trim().to_ascii_lowercase();
                let id = format!("{}.help_{}", panel.display_id(), iso3);
                let bytes = self.read_source(&help.src)?;
                base.add_resource(id.clone(), bytes);
                panel.help.insert(iso3, id);
            }
            base.add_panel(panel);
        }
        Ok(())
    }

    fn build_pack(&self, def: &PackDef) -> Result<PackInfo> {
        let exclude_group = def.exclude_group.clone().filter(|g| !g.trim().is_empty());
        let required = flag(&def.required, false);

        let mut pack = Pack::new(def.name.trim());
        pack.id = def.id.clone();
        pack.description = def.description.as_deref().map(str::trim).unwrap_or_default().to_string();
        pack.group = def.group.clone();
        pack.install_groups = split_list(&def.install_groups);
        pack.os_constraints = os_constraints(&def.os, &None)?;
        pack.dependencies = def.depends.iter().map(|d| d.packname.trim().to_string()).collect();
        pack.required = required;
        pack.preselected = required || flag(&def.preselected, exclude_group.is_none());
        pack.loose = flag(&def.loose, false);
        pack.hidden = flag(&def.hidden, false);
        pack.uninstall = flag(&def.uninstall, true);
        pack.size = def.size.unwrap_or(0);
        pack.exclude_group = exclude_group;
        pack.condition = def.condition.clone();
        pack.parent = def.parent.clone();
        pack.validators = def.validators.iter().map(|v| v.trim().to_string()).collect();

        let mut info = PackInfo::new(pack, &self.base_dir);

        for file in &def.files {
            let options = file_options(&file.override_policy, &file.condition, &file.os, &file.os_family)?;
            info.add_file(&file.src, &file.targetdir, &options)?;
        }
        for file in &def.singlefiles {
            let options = file_options(&file.override_policy, &file.condition, &file.os, &file.os_family)?;
            info.add_single_file(&file.src, &file.target, &options)?;
        }
        for set in &def.filesets {
            let options = file_options(&set.override_policy, &set.condition, &set.os, &set.os_family)?;
            let mut includes = split_list(&set.includes);
            includes.extend(set.include.iter().map(|p| p.name.clone()));
            let mut excludes = split_list(&set.excludes);
            excludes.extend(set.exclude.iter().map(|p| p.name.clone()));
            info.add_file_set(
                &set.dir,
                &set.targetdir,
                &includes,
                &excludes,
                flag(&set.casesensitive, true),
                &options,
            )?;
        }

        for parsable in &def.parsables {
            info.add_parsable(ParsableFile {
                path: parsable.targetfile.clone(),
                kind: parsable.kind.as_deref().unwrap_or("plain").parse()?,
                os_constraints: os_constraints(&parsable.os, &parsable.os_family)?,
                condition: parsable.condition.clone(),
            });
        }
        for executable in &def.executables {
            info.add_executable(ExecutableFile {
                path: executable.targetfile.clone(),
                stage: match executable.stage.as_deref().map(str::trim) {
                    None | Some("never") => ExecuteStage::Never,
                    Some("postinstall") => ExecuteStage::PostInstall,
                    Some(other) => return Err(invalid("executable stage", other).into()),
                },
                on_failure: match executable.failure.as_deref().map(str::trim) {
                    None | Some("warn") => ExecuteFailure::Warn,
                    Some("abort") => ExecuteFailure::Abort,
                    Some("ignore") => ExecuteFailure::Ignore,
                    Some(other) => return Err(invalid("executable failure", other).into()),
                },
                args: executable
                    .args
                    .iter()
                    .flat_map(|a| &a.items)
                    .map(|a| a.value.clone())
                    .collect(),
                os_constraints: os_constraints(&executable.os, &executable.os_family)?,
                condition: executable.condition.clone(),
            });
        }
        for check in &def.updatechecks {
            info.add_update_check(UpdateCheck {
                includes: check.include.iter().map(|p| p.name.clone()).collect(),
                excludes: check.exclude.iter().map(|p| p.name.clone()).collect(),
                case_sensitive: flag(&check.casesensitive, true),
            });
        }

        debug!("Pack {}: {} file(s), {} bytes", info.name(), info.files.len(), info.file_bytes());
        Ok(info)
    }
}

fn invalid(what: &str, value: &str) -> CompilerError {
    CompilerError::InvalidValue {
        what: what.to_string(),
        value: value.to_string(),
    }
}

fn file_options(
    override_policy: &Option<String>,
    condition: &Option<String>,
    os: &[descriptor::OsDef],
    os_family: &Option<String>,
) -> CompilerResult<FileOptions> {
    let override_policy = match override_policy {
        Some(value) => value.parse().map_err(|_| invalid("override", value))?,
        None => Default::default(),
    };
    Ok(FileOptions {
        override_policy,
        condition: condition.clone(),
        os_constraints: os_constraints(os, os_family)?,
    })
}

fn requirements(def: Option<&descriptor::RequirementsDef>) -> Vec<InstallerRequirement> {
    def.map(|d| {
        d.items
            .iter()
            .map(|r| InstallerRequirement {
                condition: r.condition.clone(),
                message: r.message.clone(),
            })
            .collect()
    })
    .unwrap_or_default()
}

/// Validate the pack graph: unique names, known and acyclic dependencies,
/// and consistent exclude groups.
pub fn check_packs(packs: &[Pack]) -> CompilerResult<()> {
    let mut names = HashSet::new();
    for pack in packs {
        if !names.insert(pack.name.as_str()) {
            return Err(CompilerError::DuplicatePack(pack.name.clone()));
        }
    }

    for pack in packs {
        for dependency in &pack.dependencies {
            if !names.contains(dependency.as_str()) {
                return Err(CompilerError::UnknownDependency {
                    pack: pack.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    check_cycles(packs)?;

    let mut preselected_in_group: HashMap<&str, &str> = HashMap::new();
    for pack in packs {
        let group = match pack.exclude_group.as_deref() {
            Some(group) => group,
            None => continue,
        };
        if pack.required {
            return Err(CompilerError::RequiredInExcludeGroup(pack.name.clone()));
        }
        if pack.preselected {
            if let Some(first) = preselected_in_group.insert(group, &pack.name) {
                return Err(CompilerError::PreselectedExcludeConflict {
                    group: group.to_string(),
                    first: first.to_string(),
                    second: pack.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

fn check_cycles(packs: &[Pack]) -> CompilerResult<()> {
    let index: HashMap<&str, usize> = packs.iter().enumerate().map(|(i, p)| (p.name.as_str(), i)).collect();
    let mut marks = vec![Mark::Unvisited; packs.len()];
    let mut path = Vec::new();

    fn visit<'a>(
        i: usize,
        packs: &'a [Pack],
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        path: &mut Vec<&'a str>,
    ) -> CompilerResult<()> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|n| *n == packs[i].name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(packs[i].name.clone());
                return Err(CompilerError::DependencyCycle(cycle));
            }
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InProgress;
        path.push(&packs[i].name);
        for dependency in &packs[i].dependencies {
            if let Some(&j) = index.get(dependency.as_str()) {
                visit(j, packs, index, marks, path)?;
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        Ok(())
    }

    for i in 0..packs.len() {
        visit(i, packs, &index, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Every condition reference must name a defined or built-in condition.
fn check_conditions(base: &PackagerBase) -> CompilerResult<()> {
    let packs: Vec<String> = base.packs.iter().map(|p| p.pack.name.clone()).collect();
    let rules: &RulesEngine = &base.rules;
    rules.check_references(&packs)?;

    let mut expressions: Vec<&str> = Vec::new();
    expressions.extend(base.panels.iter().filter_map(|p| p.condition.as_deref()));
    expressions.extend(base.dynamic_variables.iter().filter_map(|v| v.condition.as_deref()));
    expressions.extend(base.installer_requirements.iter().map(|r| r.condition.as_str()));
    expressions.extend(base.dynamic_installer_requirements.iter().map(|r| r.condition.as_str()));
    expressions.extend(base.info.uninstaller_condition.as_deref());
    for pack in &base.packs {
        expressions.extend(pack.pack.condition.as_deref());
        expressions.extend(pack.files.iter().filter_map(|f| f.file.condition.as_deref()));
        expressions.extend(pack.parsables.iter().filter_map(|p| p.condition.as_deref()));
        expressions.extend(pack.executables.iter().filter_map(|e| e.condition.as_deref()));
    }
    for expr in expressions {
        rules.check_expression(expr, &packs)?;
    }
    Ok(())
}

/// Fill `dependants` from the dependency lists.
fn compute_dependants(packs: &mut [Pack]) {
    let mut dependants: HashMap<String, Vec<String>> = HashMap::new();
    for pack in packs.iter() {
        for dependency in &pack.dependencies {
            dependants.entry(dependency.clone()).or_default().push(pack.name.clone());
        }
    }
    for pack in packs.iter_mut() {
        pack.dependants = dependants.remove(&pack.name).unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(name: &str, deps: &[&str]) -> Pack {
        let mut pack = Pack::new(name);
        pack.dependencies = deps.iter().map(|d| d.to_string()).collect();
        pack
    }

    #[test]
    fn test_duplicate_pack_names_fail() {
        let err = check_packs(&[pack("Core", &[]), pack("Core", &[])]).unwrap_err();
        assert!(matches!(err, CompilerError::DuplicatePack(name) if name == "Core"));
    }

    #[test]
    fn test_unknown_dependency_fails() {
        let err = check_packs(&[pack("Docs", &["Core"])]).unwrap_err();
        assert!(matches!(err, CompilerError::UnknownDependency { .. }));
    }

    #[test]
    fn test_dependency_cycle_reports_path() {
        let packs = [pack("A", &["B"]), pack("B", &["C"]), pack("C", &["A"]), pack("D", &[])];
        match check_packs(&packs).unwrap_err() {
            CompilerError::DependencyCycle(cycle) => assert_eq!(cycle, vec!["A", "B", "C", "A"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let packs = [pack("App", &["Left", "Right"]), pack("Left", &["Base"]), pack("Right", &["Base"]), pack("Base", &[])];
        assert!(check_packs(&packs).is_ok());
    }

    #[test]
    fn test_exclude_group_rules() {
        let mut a = pack("Gnome", &[]);
        a.exclude_group = Some("desktop".to_string());
        let mut b = pack("Kde", &[]);
        b.exclude_group = Some("desktop".to_string());
        let err = check_packs(&[a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, CompilerError::PreselectedExcludeConflict { .. }));

        b.preselected = false;
        assert!(check_packs(&[a.clone(), b.clone()]).is_ok());

        a.required = true;
        let err = check_packs(&[a, b]).unwrap_err();
        assert!(matches!(err, CompilerError::RequiredInExcludeGroup(_)));
    }

    #[test]
    fn test_dependants_are_computed() {
        let mut packs = vec![pack("Base", &[]), pack("App", &["Base"]), pack("Docs", &["Base"])];
        compute_dependants(&mut packs);
        assert_eq!(packs[0].dependants, vec!["App", "Docs"]);
        assert!(packs[1].dependants.is_empty());
    }

    #[test]
    fn test_build_from_descriptor() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "Welcome to $APP_NAME").unwrap();
        std::fs::write(dir.path().join("licence.txt"), "Terms for $APP_NAME $APP_VER").unwrap();

        let xml = r#"<installation version="1.0">
    <info>
        <appname>Demo</appname>
        <appversion>1.2</appversion>
    </info>
    <resources>
        <res id="LicencePanel.licence" src="licence.txt" parse="yes"/>
    </resources>
    <conditions>
        <condition type="packselection" id="docsSelected"><packid>Docs</packid></condition>
    </conditions>
    <panels>
        <panel classname="HelloPanel"/>
        <panel classname="LicencePanel" condition="!docsSelected"/>
    </panels>
    <packs>
        <pack name="Core" required="yes">
            <description>Core files</description>
            <file src="readme.txt" targetdir="$INSTALL_PATH"/>
        </pack>
        <pack name="Docs" required="no" condition="izpack.selected.Core">
            <description>Documentation</description>
            <depends packname="Core"/>
            <singlefile src="readme.txt" target="$INSTALL_PATH/doc/README"/>
        </pack>
    </packs>
</installation>"#;
        let descriptor = Descriptor::from_str(xml).unwrap();
        let compiler = Compiler::new(descriptor, dir.path());
        let base = compiler.build().unwrap();

        assert_eq!(compiler.installer_kind(), InstallerKind::Standard);
        assert_eq!(base.info.uninstaller_path.as_deref(), Some("$INSTALL_PATH/Uninstaller"));
        assert_eq!(base.variables.get("APP_NAME").map(String::as_str), Some("Demo"));
        assert_eq!(base.resources["LicencePanel.licence"], b"Terms for Demo 1.2".to_vec());
        assert_eq!(base.langpacks[0].0, "eng");
        assert_eq!(base.panels.len(), 2);
        assert_eq!(base.packs[0].pack.dependants, vec!["Docs"]);
        assert!(base.packs[1].pack.preselected);
    }

    #[test]
    fn test_undefined_condition_reference_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let xml = r#"<installation version="1.0">
    <info><appname>Demo</appname><appversion>1.0</appversion></info>
    <panels><panel classname="HelloPanel" condition="missing"/></panels>
    <packs><pack name="Core" required="yes"><description>Core</description></pack></packs>
</installation>"#;
        let compiler = Compiler::new(Descriptor::from_str(xml).unwrap(), dir.path());
        let err = compiler.build().err().unwrap();
        assert!(format!("{:#}", err).contains("missing"));
    }
}
