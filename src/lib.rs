//! IzPack - installer compiler and runtime
//!
//! This library provides:
//! - Descriptor parsing and compilation into installer archives
//! - Standard, web and multi-volume packagers
//! - Variables, conditions and langpacks shared by both sides
//! - The installer runtime: panel navigation, pack selection, unpacking

pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod installer;
pub mod langpack;
pub mod metadata;
pub mod packager;
pub mod paths;
pub mod platform;
pub mod rules;
pub mod spanning;
pub mod variables;
