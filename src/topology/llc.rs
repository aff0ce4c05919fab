//! CPU to last-level-cache group mapping.
//!
//! Reads each CPU's `cache/index3/shared_cpu_list` sibling list; CPUs whose
//! sibling sets are identical share an LLC. Group ids are assigned in order
//! of first appearance while walking CPUs ascending and carry no meaning
//! beyond distinguishing groups. A CPU whose cache file is absent from the
//! source has no group; resolution itself never fails, so callers must
//! check for unknown CPUs rather than assume coverage.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::constants::paths;
use crate::cpuset::CpuSet;
use crate::error::Result;
use crate::source::DataSource;

/// LLC groups and the CPU membership map.
#[derive(Debug, Clone)]
pub struct LlcTopology {
    /// Sibling sets, indexed by group id.
    groups: Vec<CpuSet>,
    cpu_to_group: HashMap<usize, usize>,
}

impl LlcTopology {
    /// Resolve LLC groups for every CPU in `[0, host_cpu_count)`.
    pub fn resolve(source: &dyn DataSource, host_cpu_count: usize) -> Result<Self> {
        let mut groups: Vec<CpuSet> = Vec::new();
        let mut signatures: HashMap<String, usize> = HashMap::new();
        let mut cpu_to_group = HashMap::new();

        for cpu in 0..host_cpu_count {
            let path = format!(
                "{}/cpu{}/cache/index3/shared_cpu_list",
                paths::SYS_CPU,
                cpu
            );
            let Some(sibling_list) = source.read_to_string(&path)? else {
                continue;
            };
            let signature = sibling_list.trim().to_string();

            let group = match signatures.get(&signature) {
                Some(group) => *group,
                None => {
                    let members = match CpuSet::parse(&signature) {
                        Ok(members) => members,
                        Err(e) => {
                            warn!("cpu{}: unparseable sibling list '{}': {}", cpu, signature, e);
                            continue;
                        }
                    };
                    let group = groups.len();
                    groups.push(members);
                    signatures.insert(signature, group);
                    group
                }
            };
            cpu_to_group.insert(cpu, group);
        }

        debug!(
            "LLC resolution: {} groups, {} of {} CPUs mapped",
            groups.len(),
            cpu_to_group.len(),
            host_cpu_count
        );
        Ok(Self { groups, cpu_to_group })
    }

    /// The group a CPU belongs to, `None` when its cache data was absent.
    pub fn group_for_cpu(&self, cpu: usize) -> Option<usize> {
        self.cpu_to_group.get(&cpu).copied()
    }

    /// Iterate `(group_id, members)` ascending.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CpuSet)> {
        self.groups.iter().enumerate()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether any CPU resolved at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
