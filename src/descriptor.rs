//! Installation Descriptor Parser
//!
//! Parses `installation.xml` into a typed model. Attribute names follow the
//! XML (`@name`), child elements map onto nested structs, and yes/no flags
//! stay strings until the compiler interprets them with [`flag`].

use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::CompilerError;
use crate::platform::OsConstraint;
use crate::rules::{Condition, Operator};
use crate::variables::Variables;

/// Root `<installation>` element.
#[derive(Debug, Deserialize, Default)]
pub struct Descriptor {
    #[serde(rename = "@version", default)]
    pub version: Option<String>,
    #[serde(default)]
    pub properties: Option<PropertiesDef>,
    pub info: InfoDef,
    #[serde(default)]
    pub guiprefs: Option<GuiPrefsDef>,
    #[serde(default)]
    pub locale: Option<LocaleDef>,
    #[serde(default)]
    pub resources: Option<ResourcesDef>,
    #[serde(default)]
    pub variables: Option<VariablesDef>,
    #[serde(default)]
    pub dynamicvariables: Option<DynamicVariablesDef>,
    #[serde(default)]
    pub conditions: Option<ConditionsDef>,
    #[serde(default)]
    pub installerrequirements: Option<RequirementsDef>,
    #[serde(default)]
    pub dynamicinstallerrequirements: Option<RequirementsDef>,
    #[serde(default)]
    pub panels: PanelsDef,
    #[serde(default)]
    pub packs: PacksDef,
    #[serde(default)]
    pub packaging: Option<PackagingDef>,
}

/// Compile-time properties, substituted into the descriptor text as `${name}`.
#[derive(Debug, Deserialize, Default)]
pub struct PropertiesDef {
    #[serde(default, rename = "property")]
    pub items: Vec<PropertyDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PropertyDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct InfoDef {
    #[serde(default)]
    pub appname: Option<String>,
    #[serde(default)]
    pub appversion: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub authors: Option<AuthorsDef>,
    #[serde(default)]
    pub appsubpath: Option<String>,
    #[serde(default)]
    pub webdir: Option<String>,
    #[serde(default)]
    pub uninstaller: Option<UninstallerDef>,
    #[serde(default)]
    pub writeinstallationinformation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthorsDef {
    #[serde(default, rename = "author")]
    pub items: Vec<AuthorDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AuthorDef {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@email", default)]
    pub email: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UninstallerDef {
    #[serde(rename = "@path", default)]
    pub path: Option<String>,
    #[serde(rename = "@write", default)]
    pub write: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GuiPrefsDef {
    #[serde(rename = "@width", default)]
    pub width: Option<u32>,
    #[serde(rename = "@height", default)]
    pub height: Option<u32>,
    #[serde(rename = "@resizable", default)]
    pub resizable: Option<String>,
    #[serde(default, rename = "modifier")]
    pub modifiers: Vec<ModifierDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ModifierDef {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LocaleDef {
    #[serde(default, rename = "langpack")]
    pub langpacks: Vec<LangpackDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LangpackDef {
    #[serde(rename = "@iso3")]
    pub iso3: String,
    /// Custom langpack file; built-in langpacks need none
    #[serde(rename = "@src", default)]
    pub src: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResourcesDef {
    #[serde(default, rename = "res")]
    pub items: Vec<ResourceDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResourceDef {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@src")]
    pub src: String,
    #[serde(rename = "@parse", default)]
    pub parse: Option<String>,
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VariablesDef {
    #[serde(default, rename = "variable")]
    pub items: Vec<VariableDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VariableDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct DynamicVariablesDef {
    #[serde(default, rename = "variable")]
    pub items: Vec<DynamicVariableDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DynamicVariableDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
    /// Nested `<value>` form for long values
    #[serde(rename = "value", default)]
    pub value_element: Option<String>,
    #[serde(rename = "@environment", default)]
    pub environment: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@checkonce", default)]
    pub checkonce: Option<String>,
    #[serde(rename = "@ignorefailure", default)]
    pub ignorefailure: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConditionsDef {
    #[serde(default, rename = "condition")]
    pub items: Vec<ConditionDef>,
}

/// A `<condition>` element. Which children matter depends on `type`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConditionDef {
    #[serde(rename = "@type")]
    pub kind: String,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@refid", default)]
    pub refid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub packid: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub arg1: Option<String>,
    #[serde(default)]
    pub arg2: Option<String>,
    #[serde(default, rename = "condition")]
    pub children: Vec<ConditionDef>,
}

impl ConditionDef {
    /// Convert into an evaluable condition.
    pub fn to_condition(&self) -> Result<Condition, CompilerError> {
        let required = |value: &Option<String>, child: &'static str| {
            value.clone().ok_or(CompilerError::MissingElement { element: "condition", child })
        };
        let children = || -> Result<Vec<Condition>, CompilerError> {
            self.children.iter().map(ConditionDef::to_condition).collect()
        };

        let condition = match self.kind.to_ascii_lowercase().as_str() {
            "variable" => Condition::Variable {
                name: required(&self.name, "name")?,
                value: self.value.clone().unwrap_or_default(),
            },
            "and" => Condition::And(children()?),
            "or" => Condition::Or(children()?),
            "xor" => Condition::Xor(children()?),
            "not" => {
                let mut nested = children()?;
                if nested.len() != 1 {
                    return Err(CompilerError::MissingElement { element: "condition type=\"not\"", child: "condition" });
                }
                Condition::Not(Box::new(nested.remove(0)))
            }
            "ref" => Condition::Ref(self.refid.clone().ok_or(CompilerError::MissingAttribute {
                element: "condition type=\"ref\"",
                attribute: "refid",
            })?),
            "exists" => {
                if self.variable.is_none() && self.file.is_none() {
                    return Err(CompilerError::MissingElement { element: "condition type=\"exists\"", child: "variable" });
                }
                Condition::Exists {
                    variable: self.variable.clone(),
                    file: self.file.clone(),
                }
            }
            "empty" => Condition::Empty {
                variable: self.variable.clone(),
                file: self.file.clone(),
                dir: self.dir.clone(),
            },
            "comparenumerics" => Condition::CompareNumerics {
                variable: required(&self.variable, "variable")?,
                value: required(&self.value, "value")?,
                operator: Operator::parse(self.operator.as_deref().unwrap_or("eq"))?,
            },
            "compareversions" => Condition::CompareVersions {
                arg1: required(&self.arg1, "arg1")?,
                arg2: required(&self.arg2, "arg2")?,
                operator: Operator::parse(self.operator.as_deref().unwrap_or("eq"))?,
            },
            "packselection" => Condition::PackSelection(required(&self.packid, "packid")?),
            other => return Err(CompilerError::UnknownConditionType(other.to_string())),
        };
        Ok(condition)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RequirementsDef {
    #[serde(default, rename = "installerrequirement")]
    pub items: Vec<RequirementDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RequirementDef {
    #[serde(rename = "@condition")]
    pub condition: String,
    #[serde(rename = "@message", default)]
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct OsDef {
    #[serde(rename = "@family", default)]
    pub family: Option<String>,
    #[serde(rename = "@name", default)]
    pub name: Option<String>,
    #[serde(rename = "@version", default)]
    pub version: Option<String>,
    #[serde(rename = "@arch", default)]
    pub arch: Option<String>,
}

impl OsDef {
    pub fn to_constraint(&self) -> Result<OsConstraint, CompilerError> {
        let constraint = OsConstraint {
            family: self.family.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            arch: self.arch.clone(),
        };
        if constraint.is_empty() {
            return Err(CompilerError::MissingAttribute { element: "os", attribute: "family" });
        }
        Ok(constraint)
    }
}

/// Collect `<os>` children plus the shorthand `os="family"` attribute.
pub fn os_constraints(children: &[OsDef], shorthand: &Option<String>) -> Result<Vec<OsConstraint>, CompilerError> {
    let mut constraints = children.iter().map(OsDef::to_constraint).collect::<Result<Vec<_>, _>>()?;
    if let Some(family) = shorthand.as_deref().filter(|s| !s.trim().is_empty()) {
        constraints.push(OsConstraint::family(family.trim()));
    }
    Ok(constraints)
}

#[derive(Debug, Deserialize, Default)]
pub struct PanelsDef {
    #[serde(default, rename = "panel")]
    pub items: Vec<PanelDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PanelDef {
    #[serde(rename = "@classname")]
    pub classname: String,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(default, rename = "validator")]
    pub validators: Vec<ClassRefDef>,
    #[serde(default)]
    pub actions: Option<ActionsDef>,
    #[serde(default)]
    pub configuration: Option<ConfigurationDef>,
    #[serde(default, rename = "help")]
    pub help: Vec<HelpDef>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ClassRefDef {
    #[serde(rename = "@classname")]
    pub classname: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ActionsDef {
    #[serde(default, rename = "action")]
    pub items: Vec<ActionDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ActionDef {
    #[serde(rename = "@stage")]
    pub stage: String,
    #[serde(rename = "@classname")]
    pub classname: String,
    #[serde(default, rename = "param")]
    pub params: Vec<ParamDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigurationDef {
    #[serde(default, rename = "param")]
    pub params: Vec<ParamDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ParamDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

pub fn params_map(params: &[ParamDef]) -> BTreeMap<String, String> {
    params.iter().map(|p| (p.name.clone(), p.value.clone())).collect()
}

#[derive(Debug, Deserialize, Default)]
pub struct HelpDef {
    #[serde(rename = "@iso3")]
    pub iso3: String,
    #[serde(rename = "@src")]
    pub src: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct PacksDef {
    #[serde(default, rename = "pack")]
    pub items: Vec<PackDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PackDef {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@required", default)]
    pub required: Option<String>,
    #[serde(rename = "@preselected", default)]
    pub preselected: Option<String>,
    #[serde(rename = "@loose", default)]
    pub loose: Option<String>,
    #[serde(rename = "@hidden", default)]
    pub hidden: Option<String>,
    #[serde(rename = "@uninstall", default)]
    pub uninstall: Option<String>,
    #[serde(rename = "@group", default)]
    pub group: Option<String>,
    #[serde(rename = "@installGroups", default)]
    pub install_groups: Option<String>,
    #[serde(rename = "@excludeGroup", default)]
    pub exclude_group: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@parent", default)]
    pub parent: Option<String>,
    #[serde(rename = "@size", default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "file")]
    pub files: Vec<FileDef>,
    #[serde(default, rename = "singlefile")]
    pub singlefiles: Vec<SingleFileDef>,
    #[serde(default, rename = "fileset")]
    pub filesets: Vec<FileSetDef>,
    #[serde(default, rename = "parsable")]
    pub parsables: Vec<ParsableDef>,
    #[serde(default, rename = "executable")]
    pub executables: Vec<ExecutableDef>,
    #[serde(default, rename = "updatecheck")]
    pub updatechecks: Vec<UpdateCheckDef>,
    #[serde(default, rename = "depends")]
    pub depends: Vec<DependsDef>,
    #[serde(default, rename = "validator")]
    pub validators: Vec<String>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDef {
    #[serde(rename = "@src")]
    pub src: String,
    #[serde(rename = "@targetdir")]
    pub targetdir: String,
    #[serde(rename = "@override", default)]
    pub override_policy: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@os", default)]
    pub os_family: Option<String>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SingleFileDef {
    #[serde(rename = "@src")]
    pub src: String,
    #[serde(rename = "@target")]
    pub target: String,
    #[serde(rename = "@override", default)]
    pub override_policy: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@os", default)]
    pub os_family: Option<String>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSetDef {
    #[serde(rename = "@dir")]
    pub dir: String,
    #[serde(rename = "@targetdir")]
    pub targetdir: String,
    #[serde(rename = "@includes", default)]
    pub includes: Option<String>,
    #[serde(rename = "@excludes", default)]
    pub excludes: Option<String>,
    #[serde(rename = "@casesensitive", default)]
    pub casesensitive: Option<String>,
    #[serde(rename = "@override", default)]
    pub override_policy: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@os", default)]
    pub os_family: Option<String>,
    #[serde(default, rename = "include")]
    pub include: Vec<PatternDef>,
    #[serde(default, rename = "exclude")]
    pub exclude: Vec<PatternDef>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PatternDef {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ParsableDef {
    #[serde(rename = "@targetfile")]
    pub targetfile: String,
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@os", default)]
    pub os_family: Option<String>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExecutableDef {
    #[serde(rename = "@targetfile")]
    pub targetfile: String,
    #[serde(rename = "@stage", default)]
    pub stage: Option<String>,
    #[serde(rename = "@failure", default)]
    pub failure: Option<String>,
    #[serde(rename = "@condition", default)]
    pub condition: Option<String>,
    #[serde(rename = "@os", default)]
    pub os_family: Option<String>,
    #[serde(default, rename = "os")]
    pub os: Vec<OsDef>,
    #[serde(default)]
    pub args: Option<ArgsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ArgsDef {
    #[serde(default, rename = "arg")]
    pub items: Vec<ArgDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ArgDef {
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateCheckDef {
    #[serde(rename = "@casesensitive", default)]
    pub casesensitive: Option<String>,
    #[serde(default, rename = "include")]
    pub include: Vec<PatternDef>,
    #[serde(default, rename = "exclude")]
    pub exclude: Vec<PatternDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DependsDef {
    #[serde(rename = "@packname")]
    pub packname: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct PackagingDef {
    #[serde(default)]
    pub packager: Option<PackagerDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PackagerDef {
    #[serde(rename = "@class", default)]
    pub class: Option<String>,
    #[serde(default)]
    pub options: Option<PackagerOptionsDef>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PackagerOptionsDef {
    #[serde(rename = "@volumesize", default)]
    pub volumesize: Option<String>,
    #[serde(rename = "@firstvolumefreespace", default)]
    pub firstvolumefreespace: Option<String>,
}

/// Interpret a yes/no style attribute.
pub fn flag(value: &Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "yes" || v == "true" || v == "on" => true,
        Some(v) if v == "no" || v == "false" || v == "off" => false,
        _ => default,
    }
}

/// Split a comma or space separated list attribute.
pub fn split_list(value: &Option<String>) -> Vec<String> {
    value
        .as_deref()
        .map(|v| {
            v.split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Descriptor {
    /// Load a descriptor from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read installation descriptor: {}", path.display()))?;

        Self::from_str(&contents)
    }

    /// Parse a descriptor, substituting compile-time `<properties>` first
    pub fn from_str(xml: &str) -> Result<Self> {
        let properties = Self::properties(xml)?;
        let xml = if properties.as_map().is_empty() {
            xml.to_string()
        } else {
            properties.substitute_as(xml, crate::variables::SubstitutionType::Xml)
        };

        let descriptor: Descriptor = from_str(&xml)
            .map_err(CompilerError::from)
            .context("Failed to parse installation descriptor")?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn properties(xml: &str) -> Result<Variables> {
        #[derive(Deserialize, Default)]
        struct PropertiesOnly {
            #[serde(default)]
            properties: Option<PropertiesDef>,
        }

        let only: PropertiesOnly = from_str(xml)
            .map_err(CompilerError::from)
            .context("Failed to parse installation descriptor")?;
        let mut variables = Variables::new();
        for p in only.properties.map(|p| p.items).unwrap_or_default() {
            variables.set(p.name, p.value);
        }
        Ok(variables)
    }

    /// Structural checks that do not need the file system
    pub fn validate(&self) -> Result<(), CompilerError> {
        if self.info.appname.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(CompilerError::MissingElement { element: "info", child: "appname" });
        }
        if self.info.appversion.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(CompilerError::MissingElement { element: "info", child: "appversion" });
        }
        if self.packs.items.is_empty() {
            return Err(CompilerError::MissingElement { element: "packs", child: "pack" });
        }
        for pack in &self.packs.items {
            if pack.name.trim().is_empty() {
                return Err(CompilerError::MissingAttribute { element: "pack", attribute: "name" });
            }
            if pack.description.is_none() {
                return Err(CompilerError::MissingElement { element: "pack", child: "description" });
            }
        }
        for panel in &self.panels.items {
            if panel.classname.trim().is_empty() {
                return Err(CompilerError::MissingAttribute { element: "panel", attribute: "classname" });
            }
        }
        Ok(())
    }

    /// Packager class named in `<packaging>`, if any
    pub fn packager_class(&self) -> Option<&str> {
        self.packaging.as_ref()?.packager.as_ref()?.class.as_deref()
    }

    pub fn packager_options(&self) -> Option<&PackagerOptionsDef> {
        self.packaging.as_ref()?.packager.as_ref()?.options.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<installation version="1.0">
    <properties>
        <property name="product.version" value="2.1.0"/>
    </properties>
    <info>
        <appname>Demo</appname>
        <appversion>${product.version}</appversion>
        <authors>
            <author name="Jane Doe" email="jane@example.org"/>
        </authors>
        <uninstaller write="yes"/>
    </info>
    <guiprefs width="640" height="480" resizable="no"/>
    <locale>
        <langpack iso3="eng"/>
    </locale>
    <variables>
        <variable name="DESKTOP_SHORTCUT" value="true"/>
    </variables>
    <dynamicvariables>
        <variable name="LAUNCHER" value="$INSTALL_PATH/bin/demo" condition="isFull" checkonce="true"/>
        <variable name="HOMEDIR" environment="HOME"/>
    </dynamicvariables>
    <conditions>
        <condition type="variable" id="isFull">
            <name>SETUP_TYPE</name>
            <value>full</value>
        </condition>
        <condition type="and" id="fullAndDocs">
            <condition type="ref" refid="isFull"/>
            <condition type="packselection" id="docsSel">
                <packid>Docs</packid>
            </condition>
        </condition>
    </conditions>
    <panels>
        <panel classname="HelloPanel" id="hello"/>
        <panel classname="TargetPanel">
            <validator classname="TargetDirValidator"/>
            <configuration>
                <param name="ShowCreateDirectoryMessage" value="false"/>
            </configuration>
        </panel>
        <panel classname="InstallPanel" condition="isFull">
            <actions>
                <action stage="preactivate" classname="SetVariableAction">
                    <param name="variable" value="STARTED"/>
                </action>
            </actions>
            <os family="unix"/>
        </panel>
    </panels>
    <packs>
        <pack name="Core" required="yes">
            <description>Core files</description>
            <file src="bin/demo" targetdir="$INSTALL_PATH/bin"/>
            <fileset dir="lib" targetdir="$INSTALL_PATH/lib">
                <include name="**/*.so"/>
            </fileset>
            <file src="README" targetdir="$INSTALL_PATH"/>
            <parsable targetfile="$INSTALL_PATH/bin/demo" type="shell"/>
            <executable targetfile="$INSTALL_PATH/bin/demo" stage="never"/>
        </pack>
        <pack name="Docs" required="no" preselected="no" excludeGroup="extras">
            <description>Documentation</description>
            <singlefile src="doc/manual.txt" target="$INSTALL_PATH/doc/manual.txt"/>
            <depends packname="Core"/>
            <validator>DocsValidator</validator>
        </pack>
    </packs>
    <packaging>
        <packager class="com.izforge.izpack.compiler.packager.impl.MultiVolumePackager">
            <options volumesize="1048576" firstvolumefreespace="0"/>
        </packager>
    </packaging>
</installation>"#;

    #[test]
    fn test_parse_sample_descriptor() {
        let d = Descriptor::from_str(SAMPLE).unwrap();

        assert_eq!(d.info.appname.as_deref(), Some("Demo"));
        assert_eq!(d.info.appversion.as_deref(), Some("2.1.0"));
        assert_eq!(d.info.authors.as_ref().unwrap().items[0].email, "jane@example.org");
        assert_eq!(d.guiprefs.as_ref().unwrap().width, Some(640));
        assert_eq!(d.locale.as_ref().unwrap().langpacks[0].iso3, "eng");

        let dynvars = &d.dynamicvariables.as_ref().unwrap().items;
        assert_eq!(dynvars.len(), 2);
        assert_eq!(dynvars[0].condition.as_deref(), Some("isFull"));
        assert!(flag(&dynvars[0].checkonce, false));
        assert_eq!(dynvars[1].environment.as_deref(), Some("HOME"));

        assert_eq!(d.panels.items.len(), 3);
        assert_eq!(d.panels.items[1].validators[0].classname, "TargetDirValidator");
        assert_eq!(d.panels.items[2].os[0].family.as_deref(), Some("unix"));
        assert_eq!(d.panels.items[2].actions.as_ref().unwrap().items[0].stage, "preactivate");
    }

    #[test]
    fn test_parse_packs_with_interleaved_children() {
        let d = Descriptor::from_str(SAMPLE).unwrap();
        let core = &d.packs.items[0];
        assert!(flag(&core.required, false));
        assert_eq!(core.files.len(), 2);
        assert_eq!(core.filesets[0].include[0].name, "**/*.so");
        assert_eq!(core.parsables[0].kind.as_deref(), Some("shell"));

        let docs = &d.packs.items[1];
        assert!(!flag(&docs.preselected, true));
        assert_eq!(docs.exclude_group.as_deref(), Some("extras"));
        assert_eq!(docs.depends[0].packname, "Core");
        assert_eq!(docs.validators, vec!["DocsValidator".to_string()]);
    }

    #[test]
    fn test_conditions_convert() {
        let d = Descriptor::from_str(SAMPLE).unwrap();
        let conditions = &d.conditions.as_ref().unwrap().items;
        assert_eq!(
            conditions[0].to_condition().unwrap(),
            Condition::Variable { name: "SETUP_TYPE".to_string(), value: "full".to_string() }
        );
        match conditions[1].to_condition().unwrap() {
            Condition::And(children) => {
                assert_eq!(children[0], Condition::Ref("isFull".to_string()));
                assert_eq!(children[1], Condition::PackSelection("Docs".to_string()));
            }
            other => panic!("Expected and condition, got {:?}", other),
        }
    }

    #[test]
    fn test_packaging_options() {
        let d = Descriptor::from_str(SAMPLE).unwrap();
        assert!(d.packager_class().unwrap().ends_with("MultiVolumePackager"));
        assert_eq!(d.packager_options().unwrap().volumesize.as_deref(), Some("1048576"));
    }

    #[test]
    fn test_missing_description_rejected() {
        let xml = r#"<installation>
            <info><appname>A</appname><appversion>1</appversion></info>
            <packs><pack name="Core" required="yes"></pack></packs>
        </installation>"#;
        let err = Descriptor::from_str(xml).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_unknown_condition_type() {
        let def = ConditionDef {
            kind: "java".to_string(),
            ..Default::default()
        };
        assert!(matches!(def.to_condition(), Err(CompilerError::UnknownConditionType(_))));
    }

    #[test]
    fn test_flags_and_lists() {
        assert!(flag(&Some("Yes".to_string()), false));
        assert!(!flag(&Some("no".to_string()), true));
        assert!(flag(&None, true));
        assert_eq!(split_list(&Some("a, b c".to_string())), vec!["a", "b", "c"]);
    }
}
