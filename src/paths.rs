//! Centralized Path Definitions
//!
//! Default install locations and the well-known file names the installer
//! writes below the install path.

use std::path::{Path, PathBuf};

/// Installed-packs record kept in the install directory
pub const INSTALLATION_INFORMATION: &str = ".installationinformation";

/// Default uninstall data directory, relative to the install path
pub const UNINSTALLER_DIR: &str = "Uninstaller";

/// Files log written into the uninstall directory
pub const INSTALL_LOG: &str = "install.log";

/// System-wide installation paths
pub mod system {
    use std::path::PathBuf;

    /// Base directory for installs run as root on Unix
    pub const BASE_DIR: &str = "/usr/local";

    pub fn base_dir() -> PathBuf {
        PathBuf::from(BASE_DIR)
    }
}

/// User-local installation paths (no privileges required)
pub mod user {
    use std::path::PathBuf;

    /// User's home directory
    pub fn home_dir() -> Option<PathBuf> {
        dirs::home_dir()
    }

    /// Login name, from the environment
    pub fn name() -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default()
    }
}

/// Whether the process runs with root privileges.
#[cfg(unix)]
pub fn is_root() -> bool {
    std::env::var("USER").map(|u| u == "root").unwrap_or(false)
        || dirs::home_dir().map(|h| h == Path::new("/root")).unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Default `INSTALL_PATH`: `<base>/<subpath or app name>`, where base is
/// `/usr/local` for root and the home directory otherwise.
pub fn default_install_path(app_name: &str, app_subpath: Option<&str>) -> PathBuf {
    let base = if is_root() {
        system::base_dir()
    } else {
        user::home_dir().unwrap_or_else(|| PathBuf::from("."))
    };
    let leaf = app_subpath
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(app_name);
    base.join(leaf)
}

/// Normalize a target path produced by variable substitution: collapses
/// doubled separators left by empty variables.
pub fn clean_target(path: &str) -> PathBuf {
    let mut cleaned = String::with_capacity(path.len());
    let mut previous_sep = false;
    for c in path.chars() {
        let is_sep = c == '/' || c == '\\';
        if is_sep {
            if !previous_sep {
                cleaned.push(std::path::MAIN_SEPARATOR);
            }
        } else {
            cleaned.push(c);
        }
        previous_sep = is_sep;
    }
    PathBuf::from(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_install_path_uses_subpath() {
        let p = default_install_path("Demo", Some("acme/demo"));
        assert!(p.ends_with("acme/demo"));
        let p = default_install_path("Demo", None);
        assert!(p.ends_with("Demo"));
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_target() {
        assert_eq!(clean_target("/opt//app/bin"), PathBuf::from("/opt/app/bin"));
        assert_eq!(clean_target("/opt/app/"), PathBuf::from("/opt/app/"));
    }
}
