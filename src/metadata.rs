//! Installer Metadata
//!
//! Value objects the compiler writes into the installer archive and the
//! runtime reads back. Every object is stored as a JSON entry; the entry
//! names below are the contract between the two sides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::platform::OsConstraint;
use crate::variables::SubstitutionType;

/// Current metadata format version, bumped on incompatible changes.
pub const METADATA_VERSION: u8 = 1;

/// Entry names inside the primary archive.
pub mod entries {
    pub const INFO: &str = "resources/info";
    pub const VARS: &str = "resources/vars";
    pub const GUI_PREFS: &str = "resources/GUIPrefs";
    pub const PANELS_ORDER: &str = "resources/panelsOrder";
    pub const PACKS_INFO: &str = "resources/packs.info";
    pub const LANGPACKS_INFO: &str = "resources/langpacks.info";
    pub const VOLUMES_INFO: &str = "resources/volumes.info";
    pub const RULES: &str = "resources/rules";
    pub const DYN_VARIABLES: &str = "resources/dynvariables";
    pub const INSTALLER_REQUIREMENTS: &str = "resources/installerrequirements";
    pub const DYN_INSTALLER_REQUIREMENTS: &str = "resources/dyninstallerrequirements";

    /// JSON manifest of pack `index`
    pub fn pack_manifest(index: usize) -> String {
        format!("resources/packs/pack-{}", index)
    }

    /// Raw file bytes of pack `index` (standard and web installers)
    pub fn pack_data(index: usize) -> String {
        format!("resources/packs/pack-{}.data", index)
    }

    /// File name of web pack `index`, next to the installer `installer_base`
    pub fn web_pack(installer_base: &str, index: usize) -> String {
        let stem = installer_base
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(installer_base);
        format!("{}.pack-{}.jar", stem, index)
    }

    pub fn resource(id: &str) -> String {
        format!("resources/res/{}", id)
    }

    pub fn langpack(iso3: &str) -> String {
        format!("resources/langpacks/{}.xml", iso3)
    }
}

/// Kind of installer the packager produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallerKind {
    #[default]
    Standard,
    Web,
    MultiVolume,
}

impl InstallerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallerKind::Standard => "standard",
            InstallerKind::Web => "web",
            InstallerKind::MultiVolume => "multi-volume",
        }
    }
}

impl std::str::FromStr for InstallerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "web" => Ok(Self::Web),
            "multi-volume" | "multivolume" => Ok(Self::MultiVolume),
            other => Err(format!("unknown installer kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// General information about the application being installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub format_version: u8,
    pub app_name: String,
    pub app_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    /// Sub-path appended to the default install location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_subpath: Option<String>,
    /// Base URL web packs are fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_dir_url: Option<String>,
    pub installer_kind: InstallerKind,
    /// File name of the primary installer archive
    pub installer_base: String,
    /// Uninstall data directory, may contain variables; `None` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstaller_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstaller_condition: Option<String>,
    #[serde(default = "default_true")]
    pub write_installation_information: bool,
}

fn default_true() -> bool {
    true
}

/// Front-end preferences. The console front-end only honours the
/// modifiers it understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuiPrefs {
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    #[serde(default)]
    pub modifiers: BTreeMap<String, String>,
}

/// What to do when a target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverridePolicy {
    #[default]
    Update,
    True,
    False,
    AskTrue,
    AskFalse,
}

impl std::str::FromStr for OverridePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Self::True),
            "false" => Ok(Self::False),
            "asktrue" => Ok(Self::AskTrue),
            "askfalse" => Ok(Self::AskFalse),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown override policy '{}'", other)),
        }
    }
}

/// One installable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub install_groups: Vec<String>,
    #[serde(default)]
    pub os_constraints: Vec<OsConstraint>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Packs that depend on this one, filled in at compile time
    #[serde(default)]
    pub dependants: Vec<String>,
    pub required: bool,
    pub preselected: bool,
    #[serde(default)]
    pub loose: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub uninstall: bool,
    /// Declared or computed installed size in bytes
    pub size: u64,
    /// Sum of file lengths, back-referenced files included
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub validators: Vec<String>,
}

impl Pack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            description: String::new(),
            group: None,
            install_groups: Vec::new(),
            os_constraints: Vec::new(),
            dependencies: Vec::new(),
            dependants: Vec::new(),
            required: false,
            preselected: true,
            loose: false,
            hidden: false,
            uninstall: true,
            size: 0,
            file_size: 0,
            exclude_group: None,
            condition: None,
            parent: None,
            validators: Vec::new(),
        }
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Human readable size using 1024-based units.
    pub fn size_string(&self) -> String {
        to_byte_units(self.size)
    }
}

/// Format a byte count with 1024-based units.
pub fn to_byte_units(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} bytes", bytes)
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else {
        format!("{:.2} GB", b / (KB * KB * KB))
    }
}

/// One file entry of a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackFile {
    /// Source path relative to the installer directory; only meaningful
    /// for loose packs
    pub source: String,
    /// Target path, may contain variables
    pub target: String,
    pub length: u64,
    /// Modification time, seconds since the epoch
    #[serde(default)]
    pub mtime: u64,
    #[serde(default)]
    pub os_constraints: Vec<OsConstraint>,
    #[serde(default)]
    pub override_policy: OverridePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub executable: bool,
    /// Hex SHA-256 of the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Location of bytes already written for an earlier pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackReference {
    pub pack: usize,
    pub offset: u64,
}

/// A pack file plus where its bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPackFile {
    #[serde(flatten)]
    pub file: PackFile,
    /// Offset of the bytes in this pack's data stream
    pub archive_position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_reference: Option<BackReference>,
}

impl XPackFile {
    pub fn new(file: PackFile) -> Self {
        Self {
            file,
            archive_position: 0,
            back_reference: None,
        }
    }

    pub fn is_back_reference(&self) -> bool {
        self.back_reference.is_some()
    }
}

impl PartialOrd for XPackFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XPackFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.file.target.cmp(&other.file.target)
    }
}

/// A file whose `$VAR` references are substituted after install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsableFile {
    pub path: String,
    #[serde(default)]
    pub kind: SubstitutionType,
    #[serde(default)]
    pub os_constraints: Vec<OsConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// When an executable is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteStage {
    /// Only mark executable
    #[default]
    Never,
    PostInstall,
}

/// What a failing post-install executable does to the install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteFailure {
    Abort,
    #[default]
    Warn,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableFile {
    pub path: String,
    #[serde(default)]
    pub stage: ExecuteStage,
    #[serde(default)]
    pub on_failure: ExecuteFailure,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub os_constraints: Vec<OsConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Removes stale files below the install path that this install did not write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

/// Per-pack manifest: everything the unpacker needs besides the bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackManifest {
    pub files: Vec<XPackFile>,
    #[serde(default)]
    pub parsables: Vec<ParsableFile>,
    #[serde(default)]
    pub executables: Vec<ExecutableFile>,
    #[serde(default)]
    pub update_checks: Vec<UpdateCheck>,
}

/// Action run at a fixed point of a panel's life cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelActionConfig {
    pub class_name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelActions {
    #[serde(default)]
    pub pre_construction: Vec<PanelActionConfig>,
    #[serde(default)]
    pub pre_activation: Vec<PanelActionConfig>,
    #[serde(default)]
    pub pre_validation: Vec<PanelActionConfig>,
    #[serde(default)]
    pub post_validation: Vec<PanelActionConfig>,
}

/// Metadata for one wizard step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub os_constraints: Vec<OsConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub validators: Vec<String>,
    #[serde(default)]
    pub actions: PanelActions,
    /// Help resource per ISO3 language code
    #[serde(default)]
    pub help: BTreeMap<String, String>,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

impl Panel {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            id: None,
            os_constraints: Vec::new(),
            condition: None,
            validators: Vec::new(),
            actions: PanelActions::default(),
            help: BTreeMap::new(),
            configuration: BTreeMap::new(),
        }
    }

    /// Id when set, class name otherwise.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.class_name)
    }

    pub fn config(&self, name: &str) -> Option<&str> {
        self.configuration.get(name).map(String::as_str)
    }
}

/// Condition that must hold, and the message shown when it does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerRequirement {
    pub condition: String,
    pub message: String,
}

/// Where the spanned pack data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumesInfo {
    pub volume_count: usize,
    /// File name of the first volume; later volumes append `.1`, `.2`, ...
    pub volume_name: String,
    pub volume_size: u64,
    pub first_volume_free_space: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_units() {
        assert_eq!(to_byte_units(512), "512 bytes");
        assert_eq!(to_byte_units(2048), "2.00 KB");
        assert_eq!(to_byte_units(3 * 1024 * 1024 + 512 * 1024), "3.50 MB");
        assert_eq!(to_byte_units(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_pack_serialization() {
        let mut pack = Pack::new("Core");
        pack.required = true;
        pack.dependencies.push("Base".to_string());

        let json = serde_json::to_string(&pack).unwrap();
        let parsed: Pack = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.name, "Core");
        assert!(parsed.required);
        assert!(parsed.has_dependencies());
        assert!(parsed.uninstall);
    }

    #[test]
    fn test_xpackfile_orders_by_target() {
        let file = |target: &str| {
            XPackFile::new(PackFile {
                source: String::new(),
                target: target.to_string(),
                length: 0,
                mtime: 0,
                os_constraints: Vec::new(),
                override_policy: OverridePolicy::Update,
                condition: None,
                is_directory: false,
                executable: false,
                checksum: None,
            })
        };
        let mut files = vec![file("$INSTALL_PATH/z"), file("$INSTALL_PATH/a")];
        files.sort();
        assert_eq!(files[0].file.target, "$INSTALL_PATH/a");
    }

    #[test]
    fn test_web_pack_names() {
        assert_eq!(entries::web_pack("install.jar", 2), "install.pack-2.jar");
        assert_eq!(entries::web_pack("setup", 0), "setup.pack-0.jar");
    }

    #[test]
    fn test_installer_kind_parse() {
        assert_eq!("multivolume".parse::<InstallerKind>().unwrap(), InstallerKind::MultiVolume);
        assert_eq!("Web".parse::<InstallerKind>().unwrap(), InstallerKind::Web);
        assert!("bogus".parse::<InstallerKind>().is_err());
    }
}
