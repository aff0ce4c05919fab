//! Whole-host analysis orchestration.
//!
//! Drives the extractor, resolvers, classifier, and alignment checks
//! through one [`AnalysisContext`] and assembles the structured report the
//! presentation layer renders. All reads complete here; the only mutation
//! this tool ever recommends (rewriting the persisted masks and restarting
//! the balancer) is left to the caller.

use serde::Serialize;
use tracing::{debug, info};

use crate::alignment::{
    check_llc_alignment, check_numa_alignment, AlignmentSummary, LlcAlignmentResult,
    NumaAlignmentResult,
};
use crate::constants::paths;
use crate::context::AnalysisContext;
use crate::cpuset::CpuSet;
use crate::error::Result;
use crate::irq::{classify_violations, ViolationReport};
use crate::mask::{balancer_mask, kernel_mask, masks_equivalent};

/// A CPU set in every notation the consumers need.
#[derive(Debug, Clone, Serialize)]
pub struct CpuSetView {
    pub cpus: CpuSet,
    /// Pattern-aware range form, e.g. `0-31` or `1-47:2 (odd)`.
    pub ranges: String,
    pub kernel_mask: String,
    pub balancer_mask: String,
}

impl CpuSetView {
    fn new(cpus: CpuSet, host_cpu_count: usize) -> Self {
        let ranges = cpus.format_pattern();
        let kernel = kernel_mask(&cpus, host_cpu_count);
        let balancer = balancer_mask(&cpus, host_cpu_count);
        Self {
            cpus,
            ranges,
            kernel_mask: kernel,
            balancer_mask: balancer,
        }
    }
}

/// Comparison of a persisted mask against the computed requirement.
#[derive(Debug, Clone, Serialize)]
pub struct MaskComparison {
    pub setting: &'static str,
    /// Value found on the host, `None` when the backing file or variable
    /// is absent.
    pub current: Option<String>,
    pub required: String,
    /// `None` means "could not be checked" — explicitly not a pass.
    pub matches: Option<bool>,
}

impl MaskComparison {
    fn evaluate(setting: &'static str, current: Option<String>, required: String) -> Self {
        let matches = current
            .as_deref()
            .map(|current| masks_equivalent(current, &required));
        Self {
            setting,
            current,
            required,
            matches,
        }
    }
}

/// Topology listing entry for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyGroup {
    pub id: usize,
    pub cpus: String,
}

/// Everything one invocation produces.
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub source: String,
    pub host_cpu_count: usize,
    pub total_containers: usize,
    pub isolated_containers: usize,
    pub excluded: CpuSetView,
    pub allowed: CpuSetView,
    pub violations: ViolationReport,
    /// `None` when NUMA topology was unresolved.
    pub numa_nodes: Option<Vec<TopologyGroup>>,
    pub numa_alignment: Vec<NumaAlignmentResult>,
    pub numa_summary: AlignmentSummary,
    pub llc_groups: Vec<TopologyGroup>,
    pub llc_alignment: Vec<LlcAlignmentResult>,
    pub llc_summary: AlignmentSummary,
    pub kernel_comparison: MaskComparison,
    pub balancer_comparison: MaskComparison,
}

/// Run the full read-only analysis.
pub fn run_analysis(ctx: &AnalysisContext) -> Result<AnalysisReport> {
    let host_cpu_count = ctx.host_cpu_count();
    let containers = ctx.containers()?;
    let total_containers = containers.len();
    let isolated_containers = containers.iter().filter(|c| c.is_isolated).count();
    info!(
        "{} containers, {} isolated",
        total_containers, isolated_containers
    );

    let excluded_cpus = ctx.excluded_cpus()?;
    let allowed_cpus = excluded_cpus.complement(host_cpu_count);
    let excluded = CpuSetView::new(excluded_cpus, host_cpu_count);
    let allowed = CpuSetView::new(allowed_cpus, host_cpu_count);

    let violations = classify_violations(ctx.source(), &excluded.cpus, containers)?;
    debug!(
        "{} violations across {} CPUs",
        violations.total_violations,
        violations.per_cpu.len()
    );

    let numa = ctx.numa_topology()?;
    let numa_nodes = numa.map(|topology| {
        topology
            .iter()
            .map(|(id, cpus)| TopologyGroup {
                id,
                cpus: cpus.format_pattern(),
            })
            .collect()
    });
    let numa_alignment = check_numa_alignment(ctx.source(), numa, containers);
    let numa_summary =
        AlignmentSummary::tally(numa_alignment.iter().map(|r| (&r.verdict, r.counted)));

    let llc = ctx.llc_topology()?;
    let llc_groups = llc
        .iter()
        .map(|(id, cpus)| TopologyGroup {
            id,
            cpus: cpus.format_pattern(),
        })
        .collect();
    let llc_alignment = check_llc_alignment(llc, containers);
    let llc_summary = AlignmentSummary::tally(llc_alignment.iter().map(|r| (&r.verdict, true)));

    // The default mask governs where new IRQs may land: the allowed set.
    // The balancer is configured the other way around, by the banned set.
    let current_kernel = ctx
        .source()
        .read_to_string(paths::DEFAULT_SMP_AFFINITY)?
        .map(|content| content.trim().to_string());
    let kernel_comparison = MaskComparison::evaluate(
        "default_smp_affinity",
        current_kernel,
        allowed.kernel_mask.clone(),
    );

    let current_banned = read_irqbalance_banned(ctx)?;
    let balancer_comparison = MaskComparison::evaluate(
        "IRQBALANCE_BANNED_CPUS",
        current_banned,
        excluded.balancer_mask.clone(),
    );

    Ok(AnalysisReport {
        source: ctx.source().describe(),
        host_cpu_count,
        total_containers,
        isolated_containers,
        excluded,
        allowed,
        violations,
        numa_nodes,
        numa_alignment,
        numa_summary,
        llc_groups,
        llc_alignment,
        llc_summary,
        kernel_comparison,
        balancer_comparison,
    })
}

/// Pull `IRQBALANCE_BANNED_CPUS` out of the balancer's sysconfig file.
fn read_irqbalance_banned(ctx: &AnalysisContext) -> Result<Option<String>> {
    let Some(content) = ctx.source().read_to_string(paths::IRQBALANCE_CONFIG)? else {
        return Ok(None);
    };
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some(value) = line.strip_prefix("IRQBALANCE_BANNED_CPUS=") {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Ok(Some(value.to_string()));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    /// A 16-CPU host: two NUMA nodes, two LLC groups, one isolated
    /// container pinned to 2,4,6-8 with one NIC on node 0, and an IRQ
    /// parked on CPU 2.
    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for cpu in 0..16 {
            let base = format!("sys/devices/system/cpu/cpu{}", cpu);
            fs::create_dir_all(root.join(&base)).unwrap();
            let siblings = if cpu < 8 { "0-7" } else { "8-15" };
            write(
                root,
                &format!("{}/cache/index3/shared_cpu_list", base),
                siblings,
            );
        }
        write(root, "sys/devices/system/node/node0/cpulist", "0-7");
        write(root, "sys/devices/system/node/node1/cpulist", "8-15");
        write(root, "sys/bus/pci/devices/0000:2f:00.2/numa_node", "0");

        write(
            root,
            "sos_commands/crio/containers/deadbeef",
            &format!(
                r#"{{"status": {{"id": "deadbeefdeadbeef", "metadata": {{"name": "latency-app"}},
                    "resources": {{"linux": {{"cpusetCpus": "2,4,6-8"}}}}}},
                    "info": {{"runtimeSpec": {{
                      "annotations": {{"irq-load-balancing.crio.io": "disable",
                                       "cpu-quota.crio.io": "disable"}},
                      "process": {{"env": ["PCIDEVICE_OPENSHIFT_NIC_INFO={}"]}}}}}}}}"#,
                r#"{\"r0\": {\"generic\": {\"deviceID\": \"0000:2f:00.2\"}}}"#
            ),
        );

        write(root, "proc/irq/77/smp_affinity_list", "2\n");
        write(root, "proc/uptime", "3600.0 7000.0\n");
        write(
            root,
            "proc/interrupts",
            "           CPU0  CPU1\n 77:       2000     0   IO-APIC  edge  enp3s0\n",
        );
        write(root, "proc/irq/default_smp_affinity", "ffff\n");
        write(
            root,
            "etc/sysconfig/irqbalance",
            "# irqbalance config\nIRQBALANCE_BANNED_CPUS=\"000001d4\"\n",
        );
        dir
    }

    #[test]
    fn full_run_over_snapshot() {
        let dir = fixture();
        let ctx = crate::context::AnalysisContext::for_snapshot(dir.path()).unwrap();
        let report = run_analysis(&ctx).unwrap();

        assert_eq!(report.host_cpu_count, 16);
        assert_eq!(report.isolated_containers, 1);
        assert_eq!(report.excluded.cpus.to_vec(), vec![2, 4, 6, 7, 8]);
        assert_eq!(report.excluded.kernel_mask, "1d4");
        assert_eq!(report.allowed.cpus.len(), 11);

        // Allowed = !0x1d4 within 16 bits = 0xfe2b.
        assert_eq!(report.allowed.kernel_mask, "fe2b");

        // IRQ 77 sits on excluded CPU 2 at 2000/hr.
        assert_eq!(report.violations.total_violations, 1);
        assert_eq!(report.violations.per_cpu[0].cpu, 2);
        assert_eq!(
            report.violations.per_cpu[0].containers,
            vec!["latency-app (deadbeefdead)"]
        );

        // Container spans both nodes (2-8) -> NUMA misaligned; spans LLC
        // groups 0 and 1 -> LLC misaligned with CPU 8 in the minority.
        assert_eq!(report.numa_summary.misaligned, 1);
        assert_eq!(report.llc_summary.misaligned, 1);
        assert_eq!(report.llc_alignment[0].minority_cpus.to_vec(), vec![8]);

        // Persisted config: kernel mask ffff still allows the isolated
        // CPUs; the balancer ban already matches.
        assert_eq!(report.kernel_comparison.matches, Some(false));
        assert_eq!(report.kernel_comparison.required, "fe2b");
        assert_eq!(report.balancer_comparison.matches, Some(true));
    }

    #[test]
    fn missing_persisted_config_is_unknown_not_pass() {
        let dir = fixture();
        fs::remove_file(dir.path().join("proc/irq/default_smp_affinity")).unwrap();
        fs::remove_file(dir.path().join("etc/sysconfig/irqbalance")).unwrap();

        let ctx = crate::context::AnalysisContext::for_snapshot(dir.path()).unwrap();
        let report = run_analysis(&ctx).unwrap();
        assert_eq!(report.kernel_comparison.matches, None);
        assert_eq!(report.balancer_comparison.matches, None);
    }

    #[test]
    fn allowed_and_excluded_partition_the_host() {
        let dir = fixture();
        let ctx = crate::context::AnalysisContext::for_snapshot(dir.path()).unwrap();
        let report = run_analysis(&ctx).unwrap();

        let union = report.excluded.cpus.union(&report.allowed.cpus);
        assert_eq!(union.to_vec(), (0..16).collect::<Vec<_>>());
        assert!(report.excluded.cpus.intersection(&report.allowed.cpus).is_empty());
    }
}
