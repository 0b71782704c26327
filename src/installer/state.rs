//! Installation State
//!
//! Classifies an install directory by the `.installationinformation` record
//! a previous run left there, so the wizard can preselect installed packs
//! and warn before a downgrade.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::paths::INSTALLATION_INFORMATION;
use crate::rules::compare_versions;

/// What an earlier installer recorded about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationInformation {
    pub app_name: String,
    pub app_version: String,
    #[serde(default)]
    pub installed_packs: Vec<String>,
}

impl InstallationInformation {
    pub fn path(install_path: &Path) -> PathBuf {
        install_path.join(INSTALLATION_INFORMATION)
    }

    /// `Ok(None)` when there is no record.
    pub fn read(install_path: &Path) -> Result<Option<Self>> {
        let path = Self::path(install_path);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let info = serde_json::from_str(&content).with_context(|| format!("Invalid installation record {:?}", path))?;
        Ok(Some(info))
    }

    pub fn write(&self, install_path: &Path) -> Result<()> {
        let path = Self::path(install_path);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))
    }

    /// Add the packs of this run to an existing record; the version is
    /// replaced.
    pub fn merge(&mut self, newer: InstallationInformation) {
        self.app_name = newer.app_name;
        self.app_version = newer.app_version;
        for pack in newer.installed_packs {
            if !self.installed_packs.contains(&pack) {
                self.installed_packs.push(pack);
            }
        }
    }
}

/// State of the target directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing installed there
    Fresh,

    /// Same version installed
    Installed { version: String, packs: Vec<String> },

    /// Older version installed
    Upgradeable {
        old_version: String,
        new_version: String,
        packs: Vec<String>,
    },

    /// Newer version installed
    Downgrade {
        installed_version: String,
        package_version: String,
        packs: Vec<String>,
    },

    /// A record exists but cannot be read
    Corrupted,
}

impl InstallState {
    /// Packs an earlier run installed.
    pub fn installed_packs(&self) -> &[String] {
        match self {
            InstallState::Installed { packs, .. }
            | InstallState::Upgradeable { packs, .. }
            | InstallState::Downgrade { packs, .. } => packs,
            InstallState::Fresh | InstallState::Corrupted => &[],
        }
    }
}

/// Detect the installation state of `install_path` for `version`.
pub fn detect_install_state(install_path: &Path, version: &str) -> InstallState {
    let record = match InstallationInformation::read(install_path) {
        Ok(Some(record)) => record,
        Ok(None) => return InstallState::Fresh,
        Err(e) => {
            warn!("{:#}", e);
            return InstallState::Corrupted;
        }
    };
    debug!(
        "Found {} {} in {:?}",
        record.app_name, record.app_version, install_path
    );

    let packs = record.installed_packs;
    match compare_versions(&record.app_version, version) {
        Ordering::Equal => InstallState::Installed {
            version: record.app_version,
            packs,
        },
        Ordering::Less => InstallState::Upgradeable {
            old_version: record.app_version,
            new_version: version.to_string(),
            packs,
        },
        Ordering::Greater => InstallState::Downgrade {
            installed_version: record.app_version,
            package_version: version.to_string(),
            packs,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(version: &str) -> InstallationInformation {
        InstallationInformation {
            app_name: "Demo".to_string(),
            app_version: version.to_string(),
            installed_packs: vec!["Base".to_string()],
        }
    }

    #[test]
    fn test_fresh_and_corrupted() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_install_state(dir.path(), "1.0"), InstallState::Fresh);

        std::fs::write(dir.path().join(INSTALLATION_INFORMATION), "not json").unwrap();
        assert_eq!(detect_install_state(dir.path(), "1.0"), InstallState::Corrupted);
    }

    #[test]
    fn test_version_comparison() {
        let dir = TempDir::new().unwrap();
        record("1.2").write(dir.path()).unwrap();

        assert!(matches!(detect_install_state(dir.path(), "1.2"), InstallState::Installed { .. }));
        assert!(matches!(detect_install_state(dir.path(), "1.10"), InstallState::Upgradeable { .. }));
        let state = detect_install_state(dir.path(), "1.1");
        assert!(matches!(state, InstallState::Downgrade { .. }));
        assert_eq!(state.installed_packs(), ["Base".to_string()]);
    }

    #[test]
    fn test_merge_keeps_earlier_packs() {
        let mut old = record("1.0");
        let mut newer = record("2.0");
        newer.installed_packs = vec!["Base".to_string(), "Docs".to_string()];
        old.merge(newer);
        assert_eq!(old.app_version, "2.0");
        assert_eq!(old.installed_packs, vec!["Base", "Docs"]);
    }
}
