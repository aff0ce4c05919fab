//! Report rendering.
//!
//! Presentation layer over [`AnalysisReport`]: a sectioned plain-text form
//! for operators and a JSON form for tooling. The engine's result
//! structures are the contract; nothing here feeds back into analysis.

use std::fmt::Write;

use crate::analysis::{AnalysisReport, MaskComparison};
use crate::config::Config;
use crate::error::Result;
use crate::irq::Severity;

/// Render the report as pretty-printed JSON.
pub fn render_json(report: &AnalysisReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render the report as sectioned text.
pub fn render_text(report: &AnalysisReport, config: &Config) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "CONTAINER IRQ AFFINITY ANALYSIS");
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Source: {}", report.source);
    let _ = writeln!(out, "Host CPUs: {}", report.host_cpu_count);
    let _ = writeln!(out);

    let _ = writeln!(out, "ISOLATION:");
    let _ = writeln!(
        out,
        "  Isolated containers: {} of {}",
        report.isolated_containers, report.total_containers
    );
    let _ = writeln!(out, "  Excluded CPUs: {}", display_or_none(&report.excluded.ranges));
    let _ = writeln!(out, "  Allowed CPUs:  {}", display_or_none(&report.allowed.ranges));
    let _ = writeln!(out, "  Kernel mask (allowed):   {}", report.allowed.kernel_mask);
    let _ = writeln!(out, "  Balancer ban (excluded): {}", report.excluded.balancer_mask);
    let _ = writeln!(out);

    let _ = writeln!(out, "PERSISTED CONFIGURATION:");
    write_comparison(&mut out, &report.kernel_comparison);
    write_comparison(&mut out, &report.balancer_comparison);
    let _ = writeln!(out);

    write_violations(&mut out, report, config);
    write_numa(&mut out, report);
    write_llc(&mut out, report);

    out
}

fn display_or_none(ranges: &str) -> &str {
    if ranges.is_empty() {
        "[none]"
    } else {
        ranges
    }
}

fn write_comparison(out: &mut String, comparison: &MaskComparison) {
    let verdict = match comparison.matches {
        Some(true) => "OK".to_string(),
        Some(false) => format!(
            "MISMATCH (current {}, required {})",
            comparison.current.as_deref().unwrap_or("?"),
            comparison.required
        ),
        None => format!("UNKNOWN (required {})", comparison.required),
    };
    let _ = writeln!(out, "  {}: {}", comparison.setting, verdict);
}

fn write_violations(out: &mut String, report: &AnalysisReport, config: &Config) {
    let violations = &report.violations;
    let _ = writeln!(
        out,
        "IRQ VIOLATIONS: {} across {} CPUs ({} IRQs scanned)",
        violations.total_violations,
        violations.per_cpu.len(),
        violations.total_irqs_scanned
    );
    if let Some(uptime) = violations.uptime_seconds {
        let _ = writeln!(out, "  Uptime: {:.2} hours", uptime / 3600.0);
    } else {
        let _ = writeln!(out, "  Uptime unknown; rates unavailable");
    }

    for cpu in &violations.per_cpu {
        let containers = if cpu.containers.is_empty() {
            "[none found]".to_string()
        } else {
            cpu.containers.join(", ")
        };
        let _ = writeln!(out, "  CPU {} ({} violations):", cpu.cpu, cpu.violations.len());
        let _ = writeln!(out, "    Containers: {}", containers);

        let limit = if config.full_report {
            cpu.violations.len()
        } else {
            config.max_irqs_per_cpu
        };
        for violation in cpu.violations.iter().take(limit) {
            let rate = match violation.rate_per_hour {
                Some(rate) => format!("{:.1}/hr", rate),
                None => "N/A".to_string(),
            };
            let _ = writeln!(
                out,
                "    IRQ {}: {} interrupts ({}) [{}] - {}",
                violation.irq,
                violation.interrupt_count,
                rate,
                severity_label(violation.severity),
                violation.device
            );
        }
        if cpu.violations.len() > limit {
            let _ = writeln!(out, "    ... and {} more IRQs", cpu.violations.len() - limit);
        }
    }
    let _ = writeln!(out);
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Quiet => "quiet",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

fn write_numa(out: &mut String, report: &AnalysisReport) {
    let _ = writeln!(out, "NUMA TOPOLOGY:");
    match &report.numa_nodes {
        Some(nodes) => {
            for node in nodes {
                let _ = writeln!(out, "  Node {}: CPUs {}", node.id, node.cpus);
            }
        }
        None => {
            let _ = writeln!(out, "  WARNING: NUMA topology not available");
            let _ = writeln!(out, "  Alignment below is reported as ERROR, not assumed aligned");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "NUMA ALIGNMENT: {} aligned, {} misaligned, {} errors",
        report.numa_summary.aligned, report.numa_summary.misaligned, report.numa_summary.errors
    );
    for result in &report.numa_alignment {
        let _ = writeln!(
            out,
            "  {} ({}): {}",
            result.container, result.container_id, result.verdict
        );
        let _ = writeln!(out, "    CPUs: {} (nodes {:?})", result.cpus, result.cpu_nodes);
        for device in &result.devices {
            let node = device
                .node
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let mark = if device.aligned { "aligned" } else { "misaligned" };
            let netns = match device.visible_in_netns {
                Some(true) => ", visible in netns",
                Some(false) => ", NOT visible in netns",
                None => "",
            };
            let _ = writeln!(
                out,
                "    PCI {}: node {} [{}{}]",
                device.address, node, mark, netns
            );
        }
        for note in &result.notes {
            let _ = writeln!(out, "    note: {}", note);
        }
    }
    let _ = writeln!(out);
}

fn write_llc(out: &mut String, report: &AnalysisReport) {
    let _ = writeln!(out, "LLC TOPOLOGY:");
    if report.llc_groups.is_empty() {
        let _ = writeln!(out, "  WARNING: LLC topology not available");
    }
    for group in &report.llc_groups {
        let _ = writeln!(out, "  Group {}: CPUs {}", group.id, group.cpus);
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "LLC ALIGNMENT: {} aligned, {} misaligned, {} errors",
        report.llc_summary.aligned, report.llc_summary.misaligned, report.llc_summary.errors
    );
    for result in &report.llc_alignment {
        let _ = writeln!(
            out,
            "  {} ({}): {}",
            result.container, result.container_id, result.verdict
        );
        let _ = writeln!(out, "    CPUs: {} (groups {:?})", result.cpus, result.groups);
        if !result.minority_cpus.is_empty() {
            let _ = writeln!(out, "    Minority CPUs: {}", result.minority_cpus.format_pattern());
        }
        for note in &result.notes {
            let _ = writeln!(out, "    note: {}", note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalysisContext;
    use std::fs;
    use std::path::Path;

    fn write_file(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn minimal_host() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for cpu in 0..4 {
            fs::create_dir_all(
                dir.path()
                    .join(format!("sys/devices/system/cpu/cpu{}", cpu)),
            )
            .unwrap();
        }
        write_file(dir.path(), "sys/devices/system/node/node0/cpulist", "0-3");
        dir
    }

    #[test]
    fn text_report_names_every_section() {
        let dir = minimal_host();
        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        let report = crate::analysis::run_analysis(&ctx).unwrap();
        let text = render_text(&report, &Config::default());

        for section in [
            "ISOLATION:",
            "PERSISTED CONFIGURATION:",
            "IRQ VIOLATIONS:",
            "NUMA TOPOLOGY:",
            "LLC ALIGNMENT:",
        ] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("Excluded CPUs: [none]"));
    }

    #[test]
    fn json_report_parses_back() {
        let dir = minimal_host();
        let ctx = AnalysisContext::for_snapshot(dir.path()).unwrap();
        let report = crate::analysis::run_analysis(&ctx).unwrap();
        let json = render_json(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["host_cpu_count"], 4);
        assert_eq!(value["excluded"]["kernel_mask"], "0");
    }
}
