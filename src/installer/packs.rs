//! Pack selection rules
//!
//! Required packs are always selected. Selecting a pack pulls in its
//! dependencies; deselecting one drops its dependants. An exclude group
//! holds at most one selected pack. Packs whose condition or OS
//! constraints fail cannot be installed at all.

use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::debug;

use super::data::InstallData;
use crate::metadata::Pack;

/// Whether the pack can be installed on this machine in the current state.
pub fn is_installable(data: &InstallData, pack: &Pack) -> bool {
    data.os_matches(&pack.os_constraints) && data.condition_holds(pack.condition.as_deref())
}

/// Packs offered to the user.
pub fn visible_packs(data: &InstallData) -> Vec<&Pack> {
    data.packs
        .iter()
        .filter(|p| !p.hidden && is_installable(data, p))
        .collect()
}

/// Preselected and required packs, plus packs installed by an earlier run.
pub fn initial_selection(data: &mut InstallData, previously_installed: &[String]) {
    let names: Vec<String> = data
        .packs
        .iter()
        .filter(|p| is_installable(data, p))
        .filter(|p| p.required || p.preselected || previously_installed.contains(&p.name))
        .map(|p| p.name.clone())
        .collect();
    for name in names {
        // Conflicts were rejected at compile time; a failure here only
        // means a dependency is not installable, so the pack stays out.
        if let Err(e) = select(data, &name) {
            debug!("Pack {} not preselected: {:#}", name, e);
        }
    }
}

/// Select a pack and, transitively, its dependencies. Other packs in the
/// same exclude group are deselected.
pub fn select(data: &mut InstallData, name: &str) -> Result<()> {
    let mut closure = Vec::new();
    collect_dependencies(data, name, &mut HashSet::new(), &mut closure)?;

    for pack_name in &closure {
        let group = data.pack(pack_name).and_then(|p| p.exclude_group.clone());
        if let Some(group) = group {
            let others: Vec<String> = data
                .packs
                .iter()
                .filter(|p| p.name != *pack_name && p.exclude_group.as_deref() == Some(group.as_str()))
                .map(|p| p.name.clone())
                .collect();
            for other in others {
                if closure.contains(&other) {
                    bail!("Packs '{}' and '{}' exclude each other", pack_name, other);
                }
                deselect_unchecked(data, &other);
            }
        }
        data.set_selected(pack_name, true);
    }
    Ok(())
}

fn collect_dependencies(
    data: &InstallData,
    name: &str,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) -> Result<()> {
    if !seen.insert(name.to_string()) {
        return Ok(());
    }
    let pack = match data.pack(name) {
        Some(pack) => pack,
        None => bail!("Unknown pack '{}'", name),
    };
    if !is_installable(data, pack) {
        bail!("Pack '{}' cannot be installed on this system", name);
    }
    for dependency in &pack.dependencies {
        collect_dependencies(data, dependency, seen, out)?;
    }
    out.push(name.to_string());
    Ok(())
}

/// Deselect a pack and everything that depends on it. Required packs
/// cannot be deselected.
pub fn deselect(data: &mut InstallData, name: &str) -> Result<()> {
    if let Some(pack) = data.pack(name) {
        if pack.required {
            bail!("Pack '{}' is required", name);
        }
    }
    let mut dependants = Vec::new();
    collect_dependants(data, name, &mut HashSet::new(), &mut dependants);
    if let Some(required) = dependants.iter().find(|d| data.pack(d).map(|p| p.required).unwrap_or(false)) {
        bail!("Pack '{}' is needed by required pack '{}'", name, required);
    }
    for pack in dependants {
        data.set_selected(&pack, false);
    }
    Ok(())
}

fn deselect_unchecked(data: &mut InstallData, name: &str) {
    let mut dependants = Vec::new();
    collect_dependants(data, name, &mut HashSet::new(), &mut dependants);
    for pack in dependants {
        data.set_selected(&pack, false);
    }
}

fn collect_dependants(data: &InstallData, name: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    if !seen.insert(name.to_string()) {
        return;
    }
    out.push(name.to_string());
    if let Some(pack) = data.pack(name) {
        for dependant in &pack.dependants {
            collect_dependants(data, dependant, seen, out);
        }
    }
}

/// Replace the selection with exactly `names` plus required packs and
/// dependencies.
pub fn select_only(data: &mut InstallData, names: &[String]) -> Result<()> {
    let all: Vec<String> = data.packs.iter().map(|p| p.name.clone()).collect();
    for name in &all {
        data.set_selected(name, false);
    }
    let required: Vec<String> = data
        .packs
        .iter()
        .filter(|p| p.required && is_installable(data, p))
        .map(|p| p.name.clone())
        .collect();
    for name in required.iter().chain(names) {
        select(data, name)?;
    }
    Ok(())
}

/// Bytes needed by the selected packs.
pub fn required_bytes(data: &InstallData) -> u64 {
    data.selected_packs().iter().map(|(_, p)| p.size).sum()
}
