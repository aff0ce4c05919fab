//! NUMA alignment: do a container's CPUs and its PCI devices sit on the
//! same single NUMA node?
//!
//! A container spanning nodes, or whose devices live on a different node
//! than its CPUs, pays remote-memory latency on every DMA and interrupt.
//! The verdict requires both the CPU node set and the device node set to be
//! the same singleton; anything unresolved degrades to an explicit error.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::alignment::Alignment;
use crate::constants::paths;
use crate::containers::ContainerRecord;
use crate::source::DataSource;
use crate::topology::{device_numa_node, NumaTopology};

/// One PCI device's NUMA placement relative to its container.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceNuma {
    pub address: String,
    /// `None` when neither sysfs nor the device listing knew the node.
    pub node: Option<usize>,
    /// Whether the device's node is among the container's CPU nodes.
    pub aligned: bool,
    /// Whether the device is visible inside the container's network
    /// namespace. Auxiliary annotation; never affects the verdict.
    pub visible_in_netns: Option<bool>,
}

/// NUMA verdict for one isolated container.
#[derive(Debug, Clone, Serialize)]
pub struct NumaAlignmentResult {
    pub container: String,
    pub container_id: String,
    pub cpus: String,
    /// Nodes spanned by the container's CPUs, ascending.
    pub cpu_nodes: Vec<usize>,
    pub devices: Vec<DeviceNuma>,
    pub verdict: Alignment,
    /// Whether this container participates in the aligned/misaligned
    /// tallies (it has at least one PCI device and a pinned CPU set).
    pub counted: bool,
    pub notes: Vec<String>,
}

/// Evaluate every isolated container. `topology` is `None` when NUMA
/// resolution failed for the host; every verdict is then an error.
pub fn check_numa_alignment(
    source: &dyn DataSource,
    topology: Option<&NumaTopology>,
    records: &[ContainerRecord],
) -> Vec<NumaAlignmentResult> {
    records
        .iter()
        .filter(|record| record.is_isolated)
        .map(|record| check_container(source, topology, record))
        .collect()
}

fn check_container(
    source: &dyn DataSource,
    topology: Option<&NumaTopology>,
    record: &ContainerRecord,
) -> NumaAlignmentResult {
    let mut result = NumaAlignmentResult {
        container: record.name.clone(),
        container_id: record.short_id.clone(),
        cpus: record.cpus_raw.clone(),
        cpu_nodes: Vec::new(),
        devices: Vec::new(),
        verdict: Alignment::Error,
        counted: false,
        notes: Vec::new(),
    };

    let Some(cpus) = record.cpus.as_ref() else {
        result.notes.push("no pinned CPU set".to_string());
        return result;
    };

    if record.pci_devices.is_empty() {
        result.notes.push("no PCI devices attached".to_string());
        return result;
    }

    let Some(topology) = topology else {
        result
            .notes
            .push("host NUMA topology unresolved".to_string());
        return result;
    };

    let cpu_nodes = topology.nodes_for_cpus(cpus);
    result.cpu_nodes = cpu_nodes.iter().copied().collect();

    let mut device_nodes: BTreeSet<usize> = BTreeSet::new();
    for address in &record.pci_devices {
        let node = match device_numa_node(source, address) {
            Ok(node) => {
                device_nodes.insert(node);
                Some(node)
            }
            Err(e) => {
                result.notes.push(e.to_string());
                None
            }
        };
        result.devices.push(DeviceNuma {
            address: address.clone(),
            node,
            aligned: node.is_some_and(|n| cpu_nodes.contains(&n)),
            visible_in_netns: netns_visible(source, record.network_namespace.as_deref(), address),
        });
    }

    result.counted = true;
    result.verdict = if cpu_nodes.is_empty() || device_nodes.is_empty() {
        Alignment::Error
    } else if cpu_nodes.len() == 1 && device_nodes.len() == 1 && cpu_nodes == device_nodes {
        Alignment::Aligned
    } else {
        Alignment::Misaligned
    };
    debug!(
        "container {}: NUMA {} (cpu nodes {:?}, device nodes {:?})",
        record.short_id, result.verdict, result.cpu_nodes, device_nodes
    );
    result
}

/// Check the captured in-namespace address listing for the device. `None`
/// when the namespace or its capture is unknown.
fn netns_visible(
    source: &dyn DataSource,
    namespace: Option<&str>,
    address: &str,
) -> Option<bool> {
    let namespace = namespace?;
    let path = format!(
        "{}/{}/ip_netns_exec_{}_ip_-d_address_show",
        paths::NETNS_DIR,
        namespace,
        namespace
    );
    let content = source.read_to_string(&path).ok()??;
    Some(content.contains(&format!("parentdev {}", address)))
}
