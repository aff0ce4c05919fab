//! LLC alignment: do a container's CPUs share one last-level cache?
//!
//! CPUs split across LLC groups trade cache lines over the interconnect.
//! When a container straddles groups, the minority-group CPUs are reported
//! so remediation can move the smallest number of pins.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::alignment::Alignment;
use crate::containers::ContainerRecord;
use crate::cpuset::CpuSet;
use crate::topology::LlcTopology;

/// LLC verdict for one isolated container.
#[derive(Debug, Clone, Serialize)]
pub struct LlcAlignmentResult {
    pub container: String,
    pub container_id: String,
    pub cpus: String,
    /// Groups spanned by the container's CPUs, ascending.
    pub groups: Vec<usize>,
    pub verdict: Alignment,
    /// CPUs outside the majority group, empty unless misaligned.
    pub minority_cpus: CpuSet,
    /// CPUs whose LLC group could not be determined.
    pub unknown_cpus: CpuSet,
    pub notes: Vec<String>,
}

/// Evaluate every isolated container against the LLC map.
pub fn check_llc_alignment(
    topology: &LlcTopology,
    records: &[ContainerRecord],
) -> Vec<LlcAlignmentResult> {
    records
        .iter()
        .filter(|record| record.is_isolated)
        .map(|record| check_container(topology, record))
        .collect()
}

fn check_container(topology: &LlcTopology, record: &ContainerRecord) -> LlcAlignmentResult {
    let mut result = LlcAlignmentResult {
        container: record.name.clone(),
        container_id: record.short_id.clone(),
        cpus: record.cpus_raw.clone(),
        groups: Vec::new(),
        verdict: Alignment::Error,
        minority_cpus: CpuSet::new(),
        unknown_cpus: CpuSet::new(),
        notes: Vec::new(),
    };

    let Some(cpus) = record.cpus.as_ref() else {
        result.notes.push("no pinned CPU set".to_string());
        return result;
    };

    if topology.is_empty() {
        result
            .notes
            .push("host LLC topology unresolved".to_string());
        return result;
    }

    // CPUs per group among this container's CPUs.
    let mut group_members: BTreeMap<usize, CpuSet> = BTreeMap::new();
    for cpu in cpus.iter() {
        match topology.group_for_cpu(cpu) {
            Some(group) => group_members.entry(group).or_default().insert(cpu),
            None => result.unknown_cpus.insert(cpu),
        }
    }
    result.groups = group_members.keys().copied().collect();
    if !result.unknown_cpus.is_empty() {
        result
            .notes
            .push(format!("no LLC group for CPUs {}", result.unknown_cpus));
    }

    result.verdict = match group_members.len() {
        0 => Alignment::Error,
        1 => Alignment::Aligned,
        _ => {
            // Majority group holds the most container CPUs; ties go to the
            // lowest group id, which BTreeMap iteration order provides.
            let majority = group_members
                .iter()
                .max_by_key(|(group, members)| (members.len(), std::cmp::Reverse(**group)))
                .map(|(group, _)| *group)
                .unwrap_or(0);
            result.minority_cpus = group_members
                .iter()
                .filter(|(group, _)| **group != majority)
                .fold(CpuSet::new(), |acc, (_, members)| acc.union(members));
            Alignment::Misaligned
        }
    };
    debug!(
        "container {}: LLC {} (groups {:?})",
        record.short_id, result.verdict, result.groups
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SnapshotSource;
    use std::fs;

    fn record(cpus: Option<&str>) -> ContainerRecord {
        ContainerRecord {
            id: "c0ffee".to_string(),
            short_id: "c0ffee".to_string(),
            name: "dpdk-app".to_string(),
            is_isolated: true,
            cpus: cpus.map(|c| CpuSet::parse(c).unwrap()),
            cpus_raw: cpus.unwrap_or("").to_string(),
            pci_devices: Vec::new(),
            network_namespace: None,
        }
    }

    fn llc_topology(siblings: &[(usize, &str)], host_cpu_count: usize) -> LlcTopology {
        let dir = tempfile::tempdir().unwrap();
        for (cpu, list) in siblings {
            let path = dir
                .path()
                .join(format!("sys/devices/system/cpu/cpu{}/cache/index3", cpu));
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("shared_cpu_list"), *list).unwrap();
        }
        let source = SnapshotSource::new(dir.path());
        LlcTopology::resolve(&source, host_cpu_count).unwrap()
    }

    #[test]
    fn single_group_aligns() {
        let topology = llc_topology(&[(0, "0-3"), (1, "0-3"), (2, "0-3"), (3, "0-3")], 4);
        let results = check_llc_alignment(&topology, &[record(Some("0-3"))]);
        assert_eq!(results[0].verdict, Alignment::Aligned);
        assert!(results[0].minority_cpus.is_empty());
    }

    #[test]
    fn spanning_groups_misaligns_with_minority_reported() {
        // Groups: 0 -> 0-33, 1 -> 34-89; container puts 4 CPUs in group 0
        // and 4 in group 1. The tie breaks to the lowest group id, so the
        // group-1 CPUs are the minority.
        let mut siblings: Vec<(usize, String)> = Vec::new();
        for cpu in 30..=33 {
            siblings.push((cpu, "0-33".to_string()));
        }
        for cpu in 86..=89 {
            siblings.push((cpu, "34-89".to_string()));
        }
        let sibling_refs: Vec<(usize, &str)> =
            siblings.iter().map(|(cpu, s)| (*cpu, s.as_str())).collect();
        let topology = llc_topology(&sibling_refs, 90);

        let results = check_llc_alignment(&topology, &[record(Some("30-33,86-89"))]);
        assert_eq!(results[0].verdict, Alignment::Misaligned);
        assert_eq!(results[0].groups, vec![0, 1]);
        assert_eq!(results[0].minority_cpus.to_vec(), vec![86, 87, 88, 89]);
    }

    #[test]
    fn true_minority_is_reported() {
        let topology = llc_topology(
            &[(0, "0-2"), (1, "0-2"), (2, "0-2"), (5, "5-7")],
            8,
        );
        let results = check_llc_alignment(&topology, &[record(Some("0-2,5"))]);
        assert_eq!(results[0].verdict, Alignment::Misaligned);
        assert_eq!(results[0].minority_cpus.to_vec(), vec![5]);
    }

    #[test]
    fn all_unknown_cpus_error() {
        let topology = llc_topology(&[(0, "0-1"), (1, "0-1")], 8);
        let results = check_llc_alignment(&topology, &[record(Some("4-7"))]);
        assert_eq!(results[0].verdict, Alignment::Error);
        assert_eq!(results[0].unknown_cpus.to_vec(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn partially_unknown_cpus_still_get_a_verdict() {
        let topology = llc_topology(&[(0, "0-1"), (1, "0-1")], 8);
        let results = check_llc_alignment(&topology, &[record(Some("0-1,4"))]);
        assert_eq!(results[0].verdict, Alignment::Aligned);
        assert_eq!(results[0].unknown_cpus.to_vec(), vec![4]);
    }

    #[test]
    fn missing_cpuset_is_error() {
        let topology = llc_topology(&[(0, "0-1"), (1, "0-1")], 2);
        let results = check_llc_alignment(&topology, &[record(None)]);
        assert_eq!(results[0].verdict, Alignment::Error);
    }
}
