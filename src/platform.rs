//! Platform detection and OS constraints
//!
//! Packs, pack files and panels may be restricted to particular operating
//! systems. A constraint matches when every attribute it sets matches the
//! running platform; a list of constraints matches when it is empty or when
//! any one of them matches.

use serde::{Deserialize, Serialize};

/// Description of the machine the installer runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system name as reported by `std::env::consts::OS`
    pub name: String,
    /// Processor architecture as reported by `std::env::consts::ARCH`
    pub arch: String,
    /// Kernel / OS release, empty when unknown
    pub version: String,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        Self {
            name: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: os_release(),
        }
    }

    pub fn is_windows(&self) -> bool {
        self.name == "windows"
    }

    pub fn is_mac(&self) -> bool {
        self.name == "macos"
    }

    pub fn is_linux(&self) -> bool {
        self.name == "linux"
    }

    /// Every non-Windows platform counts as Unix.
    pub fn is_unix(&self) -> bool {
        !self.is_windows()
    }

    /// Whether the platform belongs to the named OS family.
    pub fn in_family(&self, family: &str) -> bool {
        match family.to_ascii_lowercase().as_str() {
            "windows" => self.is_windows(),
            "mac" | "osx" => self.is_mac(),
            "unix" => self.is_unix(),
            "linux" => self.is_linux(),
            _ => false,
        }
    }
}

#[cfg(target_os = "linux")]
fn os_release() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn os_release() -> String {
    String::new()
}

/// Restriction of an item to a set of platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl OsConstraint {
    pub fn family(family: &str) -> Self {
        Self {
            family: Some(family.to_string()),
            ..Default::default()
        }
    }

    /// A constraint with no attribute set restricts nothing and is rejected
    /// at compile time.
    pub fn is_empty(&self) -> bool {
        self.family.is_none() && self.name.is_none() && self.version.is_none() && self.arch.is_none()
    }

    /// Whether this constraint matches the given platform.
    pub fn matches(&self, platform: &Platform) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(arch) = non_blank(&self.arch) {
            if normalize_arch(arch) != normalize_arch(&platform.arch) {
                return false;
            }
        }
        if let Some(version) = non_blank(&self.version) {
            if version != platform.version {
                return false;
            }
        }
        if let Some(name) = non_blank(&self.name) {
            if !name.eq_ignore_ascii_case(&platform.name) {
                return false;
            }
        }
        if let Some(family) = non_blank(&self.family) {
            if !platform.in_family(family) {
                return false;
            }
        }
        true
    }
}

/// An empty list places no restriction; otherwise one match is enough.
pub fn one_matches(constraints: &[OsConstraint], platform: &Platform) -> bool {
    constraints.is_empty() || constraints.iter().any(|c| c.matches(platform))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "amd64" | "x86_64" | "x64" => "x86_64".to_string(),
        "x86" | "i386" | "i486" | "i586" | "i686" => "x86".to_string(),
        "arm64" | "aarch64" => "aarch64".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> Platform {
        Platform {
            name: "linux".to_string(),
            arch: "x86_64".to_string(),
            version: "6.1.0".to_string(),
        }
    }

    #[test]
    fn test_family_matching() {
        let p = linux();
        assert!(OsConstraint::family("unix").matches(&p));
        assert!(!OsConstraint::family("windows").matches(&p));
        assert!(!OsConstraint::family("mac").matches(&p));
        assert!(!OsConstraint::family("beos").matches(&p));
    }

    #[test]
    fn test_arch_aliases() {
        let c = OsConstraint {
            arch: Some("amd64".to_string()),
            ..Default::default()
        };
        assert!(c.matches(&linux()));
    }

    #[test]
    fn test_all_attributes_must_match() {
        let c = OsConstraint {
            family: Some("unix".to_string()),
            version: Some("5.0".to_string()),
            ..Default::default()
        };
        assert!(!c.matches(&linux()));
    }

    #[test]
    fn test_empty_constraint_never_matches() {
        assert!(!OsConstraint::default().matches(&linux()));
    }

    #[test]
    fn test_one_matches() {
        let p = linux();
        assert!(one_matches(&[], &p));
        assert!(one_matches(
            &[OsConstraint::family("windows"), OsConstraint::family("unix")],
            &p
        ));
        assert!(!one_matches(&[OsConstraint::family("windows")], &p));
    }
}
