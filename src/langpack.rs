//! Langpacks: message bundles keyed by id.
//!
//! A langpack is a small XML file of `<str id="..." txt="..."/>` entries.
//! English ships built in; other languages come from `<langpack src>`.

use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::CompilerError;

/// ISO3 code of the built-in langpack
pub const DEFAULT_ISO3: &str = "eng";

pub const BUILTIN_ENG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<langpack>
    <str id="installer.title" txt="Installation of"/>
    <str id="installer.next" txt="Next"/>
    <str id="installer.prev" txt="Previous"/>
    <str id="installer.quit" txt="Quit"/>
    <str id="installer.quit.message" txt="Are you sure you want to cancel the installation?"/>
    <str id="installer.quit.title" txt="Quit installation"/>
    <str id="installer.error" txt="Error"/>
    <str id="installer.error.variable.empty" txt="A required value has not been entered."/>
    <str id="installer.error.condition" txt="The entered values are not valid."/>
    <str id="installer.error.uninstall" txt="The uninstall data could not be written:"/>
    <str id="installer.warning" txt="Warning"/>
    <str id="installer.madewith" txt="Made with IzPack"/>
    <str id="HelloPanel.welcome1" txt="Welcome to the installation of"/>
    <str id="HelloPanel.authors" txt="The authors of this software are:"/>
    <str id="HelloPanel.url" txt="The homepage is at:"/>
    <str id="LicencePanel.agree" txt="I accept the terms of this license agreement."/>
    <str id="LicencePanel.notagree" txt="I do not accept the terms of this license agreement."/>
    <str id="TargetPanel.info" txt="Select the installation path:"/>
    <str id="TargetPanel.warn" txt="The directory already exists! Are you sure you want to install here and possibly overwrite existing files?"/>
    <str id="TargetPanel.empty_target" txt="You have not specified a target location!"/>
    <str id="TargetPanel.upgrade" txt="An older version is installed in this location. Upgrade it?"/>
    <str id="TargetPanel.downgrade" txt="A newer version is already installed in this location. Install the older version anyway?"/>
    <str id="PacksPanel.info" txt="Select the packs you want to install:"/>
    <str id="PacksPanel.space" txt="Total space required:"/>
    <str id="PacksPanel.required" txt="required"/>
    <str id="InstallPanel.info" txt="Press Next to start the installation."/>
    <str id="InstallPanel.finished" txt="[Finished]"/>
    <str id="InstallPanel.overall" txt="Overall installation progress:"/>
    <str id="FinishPanel.success" txt="Installation has completed successfully."/>
    <str id="FinishPanel.installed.on" txt="The application has been installed to:"/>
    <str id="FinishPanel.uninst.info" txt="An uninstall record was written to:"/>
    <str id="installer.overwrite" txt="The file already exists. Overwrite it?"/>
    <str id="installer.media" txt="Please insert the medium containing"/>
    <str id="installer.media.path" txt="Directory holding the volume (empty to abort)"/>
    <str id="installer.cancelled" txt="Installation cancelled"/>
</langpack>
"#;

#[derive(Debug, Deserialize, Default)]
struct LangpackDoc {
    #[serde(default, rename = "str")]
    strings: Vec<StrDef>,
}

#[derive(Debug, Deserialize)]
struct StrDef {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@txt", default)]
    txt: String,
}

/// Parsed message bundle.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    strings: HashMap<String, String>,
}

impl Messages {
    pub fn parse(xml: &str) -> Result<Self, CompilerError> {
        let doc: LangpackDoc = from_str(xml)?;
        Ok(Self {
            strings: doc.strings.into_iter().map(|s| (s.id, s.txt)).collect(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let xml = std::str::from_utf8(bytes).context("Langpack is not valid UTF-8")?;
        Self::parse(xml).context("Failed to parse langpack")
    }

    pub fn builtin() -> Self {
        Self::parse(BUILTIN_ENG).unwrap_or_default()
    }

    /// Message for `id`, or the id itself when missing.
    pub fn get<'a>(&'a self, id: &'a str) -> &'a str {
        self.strings.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Layer `other` on top of this bundle.
    pub fn merge(&mut self, other: Messages) {
        self.strings.extend(other.strings);
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Built-in langpack bytes for an ISO3 code.
pub fn builtin(iso3: &str) -> Option<&'static str> {
    (iso3 == DEFAULT_ISO3).then_some(BUILTIN_ENG)
}
