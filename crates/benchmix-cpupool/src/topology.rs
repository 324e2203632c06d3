//! CPU topology discovery from sysfs.
//!
//! Pinning groups are assembled from SMT sibling pairs that share a
//! `core_id`. On a multi-socket machine the same `core_id` appears once
//! per package, so a group of four logical CPUs holds the two sibling
//! pairs of one core number across two packages. Each group maps to one
//! benchmark process, keeping that process off the SMT siblings of
//! every other running process.
//!
//! Discovery is strict: any CPU that deviates from two-way SMT, or a
//! core that cannot supply a full group, fails the whole scan so the
//! caller can fall back to [`fallback_partition`]. A half-trusted
//! topology would silently overlap groups.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use benchmix_error::{BenchmixError, Result};

/// Default sysfs location of the CPU topology tree.
pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Parses a sysfs CPU list such as `0,36` or `0-3,8,10-11`.
///
/// # Errors
///
/// Returns [`BenchmixError::Topology`] for empty input, non-numeric
/// fields, or a descending range.
pub fn parse_cpu_list(text: &str) -> Result<Vec<u32>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(BenchmixError::Topology("empty cpu list".to_owned()));
    }
    let mut cpus = Vec::new();
    for field in text.split(',') {
        match field.split_once('-') {
            None => cpus.push(parse_cpu_id(field)?),
            Some((start, end)) => {
                let start = parse_cpu_id(start)?;
                let end = parse_cpu_id(end)?;
                if end < start {
                    return Err(BenchmixError::Topology(format!(
                        "descending cpu range `{field}`"
                    )));
                }
                cpus.extend(start..=end);
            }
        }
    }
    Ok(cpus)
}

fn parse_cpu_id(field: &str) -> Result<u32> {
    field.trim().parse().map_err(|_| {
        BenchmixError::Topology(format!("cpu id `{field}` is not a number"))
    })
}

/// Scans `sysfs_root` and builds disjoint pinning groups of
/// `cpus_per_task` logical CPUs.
///
/// # Errors
///
/// Returns [`BenchmixError::Topology`] when the tree is missing, a
/// sibling list is not a two-way SMT pair, a core cannot fill a group,
/// or no group can be formed at all.
pub fn discover_groups(sysfs_root: &Path, cpus_per_task: usize) -> Result<Vec<Vec<u32>>> {
    let mut cpu_ids = Vec::new();
    let entries = fs::read_dir(sysfs_root).map_err(|error| {
        BenchmixError::Topology(format!("cannot read {}: {error}", sysfs_root.display()))
    })?;
    for entry in entries {
        let entry = entry.map_err(|error| {
            BenchmixError::Topology(format!("cannot scan {}: {error}", sysfs_root.display()))
        })?;
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(|name| name.strip_prefix("cpu")) else {
            continue;
        };
        if let Ok(id) = id.parse::<u32>() {
            cpu_ids.push(id);
        }
    }
    cpu_ids.sort_unstable();

    // Sibling pairs keyed by core_id. The same core_id repeats across
    // packages, which is what lets a group grow past one pair.
    let mut core_map: BTreeMap<u32, Vec<Vec<u32>>> = BTreeMap::new();
    for id in cpu_ids {
        let topology = sysfs_root.join(format!("cpu{id}")).join("topology");
        let Ok(siblings_text) = fs::read_to_string(topology.join("thread_siblings_list"))
        else {
            continue;
        };
        let mut siblings = parse_cpu_list(&siblings_text)?;
        siblings.sort_unstable();
        if siblings.len() != 2 {
            return Err(BenchmixError::Topology(format!(
                "cpu{id} has {} thread siblings, expected a two-way SMT pair",
                siblings.len()
            )));
        }
        let core_id_text = fs::read_to_string(topology.join("core_id")).map_err(|error| {
            BenchmixError::Topology(format!("cannot read core_id of cpu{id}: {error}"))
        })?;
        let core_id: u32 = core_id_text.trim().parse().map_err(|_| {
            BenchmixError::Topology(format!(
                "core_id of cpu{id} is not a number: `{}`",
                core_id_text.trim()
            ))
        })?;
        let pairs = core_map.entry(core_id).or_default();
        if !pairs.contains(&siblings) {
            pairs.push(siblings);
        }
    }

    let mut groups = Vec::new();
    for (core_id, pairs) in core_map {
        let mut flat: Vec<u32> = pairs.into_iter().flatten().collect();
        if flat.len() < cpus_per_task {
            return Err(BenchmixError::Topology(format!(
                "core {core_id} supplies {} logical cpus, need {cpus_per_task}",
                flat.len()
            )));
        }
        flat.truncate(cpus_per_task);
        groups.push(flat);
    }
    if groups.is_empty() {
        return Err(BenchmixError::Topology(
            "no cpu topology information found".to_owned(),
        ));
    }
    Ok(groups)
}

/// Sequential partition of `0..cpu_count` used when discovery fails.
///
/// The trailing group may be short rather than padded with ids the
/// machine does not have.
#[must_use]
pub fn fallback_partition(cpu_count: usize, cpus_per_task: usize) -> Vec<Vec<u32>> {
    let ids: Vec<u32> = (0..cpu_count).map(|id| u32::try_from(id).unwrap_or(u32::MAX)).collect();
    ids.chunks(cpus_per_task.max(1)).map(<[u32]>::to_vec).collect()
}
