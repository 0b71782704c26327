//! Installer variables and `$VAR` substitution
//!
//! Variables are a flat name→string map. Dynamic variables are re-evaluated
//! on every panel switch: each one may carry a condition (skipped while it is
//! false) and may be flagged `checkonce` (evaluated the first time only).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::CompilerError;

/// Well-known variable names.
pub mod names {
    pub const INSTALL_PATH: &str = "INSTALL_PATH";
    pub const APP_NAME: &str = "APP_NAME";
    pub const APP_VER: &str = "APP_VER";
    pub const APP_URL: &str = "APP_URL";
    pub const ISO3_LANG: &str = "ISO3_LANG";
    pub const USER_HOME: &str = "USER_HOME";
    pub const USER_NAME: &str = "USER_NAME";
    pub const FILE_SEPARATOR: &str = "FILE_SEPARATOR";
    pub const INSTALLER_KIND: &str = "izpack.installer.kind";
}

/// How substituted values are escaped for the target file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionType {
    #[default]
    Plain,
    JavaProperties,
    Xml,
    /// `%VAR` markers; carriage returns are stripped from values
    Shell,
    /// `@VAR` markers
    At,
}

impl SubstitutionType {
    fn marker(self) -> char {
        match self {
            SubstitutionType::Shell => '%',
            SubstitutionType::At => '@',
            _ => '$',
        }
    }

    fn escape(self, value: &str) -> String {
        match self {
            SubstitutionType::Plain | SubstitutionType::At => value.to_string(),
            SubstitutionType::Shell => value.replace('\r', ""),
            SubstitutionType::Xml => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        '&' => out.push_str("&amp;"),
                        '\'' => out.push_str("&apos;"),
                        '"' => out.push_str("&quot;"),
                        c => out.push(c),
                    }
                }
                out
            }
            SubstitutionType::JavaProperties => {
                let mut out = String::with_capacity(value.len());
                for c in value.chars() {
                    match c {
                        '\t' => out.push_str("\\t"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\\' | '"' | '\'' | ' ' => {
                            out.push('\\');
                            out.push(c);
                        }
                        c => out.push(c),
                    }
                }
                out
            }
        }
    }
}

impl FromStr for SubstitutionType {
    type Err = CompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "plain" => Ok(Self::Plain),
            "javaprop" | "javaproperties" => Ok(Self::JavaProperties),
            "xml" => Ok(Self::Xml),
            "shell" => Ok(Self::Shell),
            "at" => Ok(Self::At),
            other => Err(CompilerError::InvalidValue {
                what: "parsable type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Where a dynamic variable takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicValue {
    /// Literal text, itself subject to substitution
    Value(String),
    /// Process environment variable
    Environment(String),
}

/// A variable re-evaluated on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicVariable {
    pub name: String,
    pub source: DynamicValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub check_once: bool,
    #[serde(default = "default_true")]
    pub ignore_failure: bool,
}

fn default_true() -> bool {
    true
}

impl DynamicVariable {
    /// Compute the value against the current variables. `Ok(None)` means
    /// the source produced nothing and the failure is ignored.
    pub fn evaluate(&self, variables: &Variables) -> Result<Option<String>> {
        let value = match &self.source {
            DynamicValue::Value(text) => Ok(variables.substitute(text)),
            DynamicValue::Environment(key) => std::env::var(key)
                .map_err(|_| anyhow!("environment variable '{}' is not set", key)),
        };
        match value {
            Ok(v) => Ok(Some(v)),
            Err(e) if self.ignore_failure => {
                debug!("Dynamic variable {} unresolved: {}", self.name, e);
                Ok(None)
            }
            Err(e) => Err(e.context(format!("failed to evaluate dynamic variable '{}'", self.name))),
        }
    }
}

/// Name→value store shared by the compiler and the installer.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
    dynamic: Vec<DynamicVariable>,
    /// Cached results of `checkonce` variables, by index into `dynamic`
    checked: HashMap<usize, Option<String>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Boolean view of a variable: `true`/`yes`/`on`/`1`, case-insensitive.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "on" | "1"))
            .unwrap_or(false)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn add_dynamic(&mut self, variable: DynamicVariable) {
        self.dynamic.push(variable);
    }

    pub fn dynamic(&self) -> &[DynamicVariable] {
        &self.dynamic
    }

    /// Substitute `$NAME`, `${NAME}` and `${ENV[NAME]}` without escaping.
    pub fn substitute(&self, text: &str) -> String {
        self.substitute_as(text, SubstitutionType::Plain)
    }

    /// Substitute variable references in `text`. Unknown names are left
    /// untouched, marker and braces included.
    pub fn substitute_as(&self, text: &str, kind: SubstitutionType) -> String {
        let marker = kind.marker();
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if c != marker {
                out.push(c);
                continue;
            }

            let braces = chars.peek() == Some(&'{');
            if braces {
                chars.next();
            }

            let mut name = String::new();
            let mut closed = false;
            while let Some(&n) = chars.peek() {
                if braces {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                } else if !(n.is_ascii_alphabetic()
                    || (!name.is_empty() && (n.is_ascii_digit() || matches!(n, '_' | '.' | '-'))))
                {
                    break;
                }
                name.push(n);
                chars.next();
            }

            let value = if (!braces || closed) && !name.is_empty() {
                self.resolve(&name, braces)
            } else {
                None
            };

            match value {
                Some(v) => {
                    out.push_str(&kind.escape(&v));
                    if braces {
                        chars.next();
                    }
                }
                None => {
                    out.push(marker);
                    if braces {
                        out.push('{');
                    }
                    out.push_str(&name);
                }
            }
        }
        out
    }

    fn resolve(&self, name: &str, braces: bool) -> Option<String> {
        if braces {
            if let Some(env) = name.strip_prefix("ENV[").and_then(|n| n.strip_suffix(']')) {
                return Some(std::env::var(env).unwrap_or_default());
            }
        }
        self.values.get(name).cloned()
    }

    /// Re-evaluate dynamic variables in declaration order. `condition_true`
    /// decides conditions against the variables as updated so far.
    pub fn refresh<F>(&mut self, condition_true: F) -> Result<()>
    where
        F: Fn(&str, &Variables) -> bool,
    {
        for index in 0..self.dynamic.len() {
            let variable = &self.dynamic[index];
            if let Some(condition) = &variable.condition {
                if !condition_true(condition, self) {
                    continue;
                }
            }

            let value = if variable.check_once {
                match self.checked.get(&index) {
                    Some(cached) => cached.clone(),
                    None => {
                        let value = variable.evaluate(self)?;
                        self.checked.insert(index, value.clone());
                        value
                    }
                }
            } else {
                variable.evaluate(self)?
            };

            match value {
                Some(value) => {
                    let name = self.dynamic[index].name.clone();
                    if self.values.get(&name) != Some(&value) {
                        debug!("Dynamic variable {} = {}", name, value);
                    }
                    self.values.insert(name, value);
                }
                None => warn!("Dynamic variable {} produced no value", self.dynamic[index].name),
            }
        }
        Ok(())
    }
}
