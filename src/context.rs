//! Per-invocation analysis context.
//!
//! One context is constructed per run and handed by reference to every
//! component. It owns the data source, the host CPU count (the single input
//! without which nothing can be computed), and lazily-resolved container and
//! topology snapshots behind one-time initialization cells: the first caller
//! pays the load, later callers read the same immutable data. Nothing
//! outlives the invocation.

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::constants::paths;
use crate::containers::{self, ContainerRecord};
use crate::cpuset::CpuSet;
use crate::error::{AnalysisError, Result};
use crate::source::{DataSource, LiveSource, SnapshotSource};
use crate::topology::{LlcTopology, NumaTopology};

pub struct AnalysisContext {
    source: Box<dyn DataSource>,
    host_cpu_count: usize,
    containers: OnceCell<Vec<ContainerRecord>>,
    numa: OnceCell<Option<NumaTopology>>,
    llc: OnceCell<LlcTopology>,
}

impl AnalysisContext {
    /// Context over a captured sosreport tree.
    pub fn for_snapshot(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::with_source(Box::new(SnapshotSource::new(root)), false)
    }

    /// Context over the live host.
    pub fn live() -> Result<Self> {
        Self::with_source(Box::new(LiveSource), true)
    }

    /// Build over an arbitrary source. `local_probe` permits falling back to
    /// the process's own CPU count, which is only meaningful when the source
    /// is the machine we are running on.
    pub fn with_source(source: Box<dyn DataSource>, local_probe: bool) -> Result<Self> {
        let host_cpu_count = resolve_host_cpu_count(source.as_ref(), local_probe)?;
        info!(
            "analysis context: {} with {} CPUs",
            source.describe(),
            host_cpu_count
        );
        Ok(Self {
            source,
            host_cpu_count,
            containers: OnceCell::new(),
            numa: OnceCell::new(),
            llc: OnceCell::new(),
        })
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn host_cpu_count(&self) -> usize {
        self.host_cpu_count
    }

    /// All container records, loaded once.
    pub fn containers(&self) -> Result<&[ContainerRecord]> {
        self.containers
            .get_or_try_init(|| containers::load_containers(self.source.as_ref()))
            .map(Vec::as_slice)
    }

    /// The excluded CPU set: union of isolated containers' pins.
    pub fn excluded_cpus(&self) -> Result<CpuSet> {
        Ok(containers::isolated_cpus(self.containers()?))
    }

    /// NUMA topology, `None` when the host data could not be resolved;
    /// the failure is logged once and alignment degrades explicitly.
    pub fn numa_topology(&self) -> Result<Option<&NumaTopology>> {
        let cell = self.numa.get_or_try_init(|| {
            match NumaTopology::resolve(self.source.as_ref(), self.host_cpu_count) {
                Ok(topology) => Ok(Some(topology)),
                Err(e @ AnalysisError::UnresolvedTopology { .. }) => {
                    warn!("{}", e);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;
        Ok(cell.as_ref())
    }

    /// LLC topology; may be empty when no cache data is available.
    pub fn llc_topology(&self) -> Result<&LlcTopology> {
        self.llc
            .get_or_try_init(|| LlcTopology::resolve(self.source.as_ref(), self.host_cpu_count))
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("source", &self.source.describe())
            .field("host_cpu_count", &self.host_cpu_count)
            .finish()
    }
}

/// The host CPU count is required by every downstream computation; failure
/// to determine it aborts the analysis.
fn resolve_host_cpu_count(source: &dyn DataSource, local_probe: bool) -> Result<usize> {
    let cpu_dirs = source
        .list_dir(paths::SYS_CPU)?
        .into_iter()
        .filter(|entry| {
            entry
                .strip_prefix("cpu")
                .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        })
        .count();
    if cpu_dirs > 0 {
        debug!("host CPU count {} from {}", cpu_dirs, paths::SYS_CPU);
        return Ok(cpu_dirs);
    }

    if let Some(cpuinfo) = source.read_to_string(paths::PROC_CPUINFO)? {
        let processors = cpuinfo
            .lines()
            .filter(|line| line.trim_start().starts_with("processor"))
            .count();
        if processors > 0 {
            debug!("host CPU count {} from {}", processors, paths::PROC_CPUINFO);
            return Ok(processors);
        }
    }

    if local_probe {
        let count = num_cpus::get();
        if count > 0 {
            debug!("host CPU count {} from local probe", count);
            return Ok(count);
        }
    }

    Err(AnalysisError::MissingRequiredInput(
        "host CPU count (no CPU inventory in source)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cpu_dirs(dir: &tempfile::TempDir, count: usize) {
        for cpu in 0..count {
            fs::create_dir_all(
                dir.path()
                    .join(format!("sys/devices/system/cpu/cpu{}", cpu)),
            )
            .unwrap();
        }
        // Non-CPU siblings that must not be counted.
        fs::create_dir_all(dir.path().join("sys/devices/system/cpu/cpufreq")).unwrap();
        fs::create_dir_all(dir.path().join("sys/devices/system/cpu/cpuidle")).unwrap();
    }

    #[test]
    fn cpu_count_from_sysfs_listing() {
        let dir = tempfile::tempdir().unwrap();
        cpu_dirs(&dir, 16);
        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        assert_eq!(ctx.host_cpu_count(), 16);
    }

    #[test]
    fn cpu_count_falls_back_to_cpuinfo() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(
            dir.path().join("proc/cpuinfo"),
            "processor\t: 0\n\nprocessor\t: 1\n\n",
        )
        .unwrap();
        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        assert_eq!(ctx.host_cpu_count(), 2);
    }

    #[test]
    fn missing_cpu_inventory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisContext::for_snapshot(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingRequiredInput(_)));
    }

    #[test]
    fn containers_load_once_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        cpu_dirs(&dir, 4);
        let containers = dir.path().join("sos_commands/crio/containers");
        fs::create_dir_all(&containers).unwrap();
        fs::write(
            containers.join("aaaa"),
            r#"{"status": {"id": "aaaa", "metadata": {"name": "c"},
                "resources": {"linux": {"cpusetCpus": "1-2"}}},
                "info": {"runtimeSpec": {"annotations": {
                  "irq-load-balancing.crio.io": "disable",
                  "cpu-quota.crio.io": "disable"}}}}"#,
        )
        .unwrap();

        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        let first = ctx.containers().unwrap().as_ptr();
        let second = ctx.containers().unwrap().as_ptr();
        assert_eq!(first, second);
        assert_eq!(ctx.excluded_cpus().unwrap().to_vec(), vec![1, 2]);
    }

    #[test]
    fn unresolved_numa_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        cpu_dirs(&dir, 4);
        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        assert!(ctx.numa_topology().unwrap().is_none());
    }
}
