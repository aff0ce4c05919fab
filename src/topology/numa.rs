//! CPU to NUMA node mapping.
//!
//! Primary source: per-node `cpulist` files under `sys/devices/system/node`.
//! Fallback: the `physical id` field of each `proc/cpuinfo` block, which
//! tracks the socket and, on the multi-socket systems this tool targets,
//! the NUMA node. Resolution fails unless every CPU in
//! `[0, host_cpu_count)` lands in exactly one node; callers must treat an
//! unresolved topology as "alignment unknown", never as aligned.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::constants::paths;
use crate::cpuset::CpuSet;
use crate::error::{AnalysisError, Result};
use crate::source::DataSource;

/// CPU membership per NUMA node, covering every host CPU.
#[derive(Debug, Clone)]
pub struct NumaTopology {
    nodes: BTreeMap<usize, CpuSet>,
}

impl NumaTopology {
    /// Resolve the host's NUMA layout.
    pub fn resolve(source: &dyn DataSource, host_cpu_count: usize) -> Result<Self> {
        let mut nodes = Self::from_node_cpulists(source)?;
        if nodes.is_empty() {
            debug!("no per-node cpulist files, falling back to CPU inventory");
            nodes = Self::from_cpuinfo(source)?;
        }

        let topology = Self { nodes };
        topology.check_coverage(host_cpu_count)?;
        Ok(topology)
    }

    fn from_node_cpulists(source: &dyn DataSource) -> Result<BTreeMap<usize, CpuSet>> {
        let mut nodes = BTreeMap::new();
        for entry in source.list_dir(paths::SYS_NODE)? {
            let Some(node_id) = entry
                .strip_prefix("node")
                .and_then(|suffix| suffix.parse::<usize>().ok())
            else {
                continue;
            };
            let path = format!("{}/{}/cpulist", paths::SYS_NODE, entry);
            let Some(cpulist) = source.read_to_string(&path)? else {
                continue;
            };
            match CpuSet::parse(&cpulist) {
                Ok(cpus) if !cpus.is_empty() => {
                    nodes.insert(node_id, cpus);
                }
                Ok(_) => {}
                Err(e) => warn!("node{}: unparseable cpulist: {}", node_id, e),
            }
        }
        Ok(nodes)
    }

    /// Fallback: walk `proc/cpuinfo` blocks, keyed by the `processor` field,
    /// taking `physical id` as the node.
    fn from_cpuinfo(source: &dyn DataSource) -> Result<BTreeMap<usize, CpuSet>> {
        let Some(content) = source.read_to_string(paths::PROC_CPUINFO)? else {
            return Ok(BTreeMap::new());
        };

        let mut nodes: BTreeMap<usize, CpuSet> = BTreeMap::new();
        let mut current_cpu: Option<usize> = None;
        let mut current_node: Option<usize> = None;

        for line in content.lines() {
            let line = line.trim();
            if let Some(value) = field_value(line, "processor") {
                current_cpu = value.parse().ok();
            } else if let Some(value) = field_value(line, "physical id") {
                current_node = value.parse().ok();
            } else if line.is_empty() {
                if let (Some(cpu), Some(node)) = (current_cpu, current_node) {
                    nodes.entry(node).or_default().insert(cpu);
                }
                current_cpu = None;
                current_node = None;
            }
        }
        // Final block may not end with a blank line.
        if let (Some(cpu), Some(node)) = (current_cpu, current_node) {
            nodes.entry(node).or_default().insert(cpu);
        }
        Ok(nodes)
    }

    fn check_coverage(&self, host_cpu_count: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(AnalysisError::UnresolvedTopology {
                kind: "NUMA",
                reason: "no node cpulist files and no physical id data".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for cpus in self.nodes.values() {
            for cpu in cpus.iter() {
                if !seen.insert(cpu) {
                    return Err(AnalysisError::UnresolvedTopology {
                        kind: "NUMA",
                        reason: format!("CPU {} claimed by more than one node", cpu),
                    });
                }
            }
        }

        let missing: Vec<usize> = (0..host_cpu_count).filter(|cpu| !seen.contains(cpu)).collect();
        if !missing.is_empty() {
            return Err(AnalysisError::UnresolvedTopology {
                kind: "NUMA",
                reason: format!(
                    "{} of {} CPUs unmapped (first: {})",
                    missing.len(),
                    host_cpu_count,
                    missing[0]
                ),
            });
        }
        Ok(())
    }

    /// The node a CPU belongs to.
    pub fn node_for_cpu(&self, cpu: usize) -> Option<usize> {
        self.nodes
            .iter()
            .find(|(_, cpus)| cpus.contains(cpu))
            .map(|(node, _)| *node)
    }

    /// Nodes spanned by a CPU set, ascending.
    pub fn nodes_for_cpus(&self, cpus: &CpuSet) -> BTreeSet<usize> {
        self.nodes
            .iter()
            .filter(|(_, members)| members.intersects(cpus))
            .map(|(node, _)| *node)
            .collect()
    }

    /// Iterate `(node, members)` ascending by node id.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CpuSet)> {
        self.nodes.iter().map(|(node, cpus)| (*node, cpus))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.trim_start();
    let value = rest.strip_prefix(':')?;
    Some(value.trim())
}
