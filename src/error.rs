//! Typed errors for the compiler and the installer runtime.
//!
//! Orchestration code (the binaries, the packagers' top level) works with
//! `anyhow::Result`; these enums are what the library raises when a caller
//! may want to match on the failure.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading and validating an installation descriptor.
#[derive(Debug, Error)]
pub enum CompilerError {
    // ── Descriptor ──────────────────────────────────────
    #[error("failed to parse installation descriptor: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("<{element}> requires attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("<{element}> requires a <{child}> element")]
    MissingElement {
        element: &'static str,
        child: &'static str,
    },

    #[error("invalid value '{value}' for {what}")]
    InvalidValue { what: String, value: String },

    // ── Packs ───────────────────────────────────────────
    #[error("duplicate pack name '{0}'")]
    DuplicatePack(String),

    #[error("pack '{pack}' depends on unknown pack '{dependency}'")]
    UnknownDependency { pack: String, dependency: String },

    #[error("circular dependency between packs: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("pack '{0}' is required and therefore cannot belong to an exclude group")]
    RequiredInExcludeGroup(String),

    #[error("packs '{first}' and '{second}' are both preselected but share exclude group '{group}'")]
    PreselectedExcludeConflict {
        group: String,
        first: String,
        second: String,
    },

    #[error("pack '{pack}' installs '{target}' more than once")]
    DuplicateTarget { pack: String, target: String },

    #[error("pack '{pack}': {path:?} not found")]
    SourceNotFound { pack: String, path: PathBuf },

    #[error("invalid fileset pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    // ── Conditions ──────────────────────────────────────
    #[error("condition '{0}' is referenced but never defined")]
    UndefinedCondition(String),

    #[error("duplicate condition id '{0}'")]
    DuplicateCondition(String),

    #[error("unknown condition type '{0}'")]
    UnknownConditionType(String),
}

/// Errors raised by the installer runtime.
#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("installer archive is missing entry '{0}'")]
    MissingEntry(String),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("corrupt installer metadata '{entry}': {source}")]
    Metadata {
        entry: String,
        source: serde_json::Error,
    },

    #[error("volume {path:?} is corrupt: magic number does not match")]
    CorruptVolume { path: PathBuf },

    #[error("invalid volume layout: {0}")]
    VolumeLayout(String),

    #[error("volume {index} ({name}) could not be located")]
    VolumeNotFound { index: usize, name: String },

    #[error("checksum mismatch for {target}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        target: String,
        expected: String,
        actual: String,
    },

    #[error("pack file {target} is truncated: expected {expected} bytes, read {actual}")]
    Truncated {
        target: String,
        expected: u64,
        actual: u64,
    },

    #[error("installation aborted by user")]
    Aborted,

    #[error("web pack download failed for {url}: {reason}")]
    Download { url: String, reason: String },
}

/// Convenience alias for compiler-side results.
pub type CompilerResult<T> = Result<T, CompilerError>;
