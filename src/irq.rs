//! IRQ affinity scanning and the violation classifier.
//!
//! Walks the per-IRQ affinity lists, intersects each with the excluded CPU
//! set, and emits one violation per (excluded CPU, IRQ) pair found. Each
//! violation carries the IRQ's lifetime interrupt count and, when uptime is
//! known, its hourly rate; severity buckets on that rate. A zero-count IRQ
//! parked on an isolated CPU is still a violation — it will fire there
//! eventually — just the quietest kind.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{paths, severity};
use crate::containers::ContainerRecord;
use crate::cpuset::CpuSet;
use crate::error::Result;
use crate::source::DataSource;

/// Severity of a single violation, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No interrupts recorded yet.
    Quiet,
    /// Active below the critical rate, or rate unknown.
    Warning,
    /// At or above the critical rate.
    Critical,
}

impl Severity {
    /// Bucket by interrupt count and hourly rate. With uptime unavailable
    /// the rate is unknown and a nonzero count classifies as [`Warning`].
    ///
    /// [`Warning`]: Severity::Warning
    pub fn classify(interrupt_count: u64, rate_per_hour: Option<f64>) -> Self {
        if interrupt_count == 0 {
            return Severity::Quiet;
        }
        match rate_per_hour {
            Some(rate) if rate >= severity::CRITICAL_RATE_PER_HOUR => Severity::Critical,
            _ => Severity::Warning,
        }
    }
}

/// One currently-assigned IRQ as read from the host.
#[derive(Debug, Clone)]
pub struct IrqRecord {
    pub irq: u32,
    pub affinity: CpuSet,
    pub interrupt_count: u64,
    pub device: String,
}

/// An IRQ whose affinity includes a CPU that must be excluded.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub cpu: usize,
    pub irq: u32,
    pub interrupt_count: u64,
    /// Interrupts per hour; `None` when uptime is unavailable.
    pub rate_per_hour: Option<f64>,
    pub severity: Severity,
    pub device: String,
}

/// Violations grouped per excluded CPU, with the containers pinned there.
#[derive(Debug, Clone, Serialize)]
pub struct CpuViolations {
    pub cpu: usize,
    pub violations: Vec<Violation>,
    pub containers: Vec<String>,
}

/// Full classifier output.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationReport {
    /// Ordered by descending violation count per CPU.
    pub per_cpu: Vec<CpuViolations>,
    pub total_violations: usize,
    pub total_irqs_scanned: usize,
    pub uptime_seconds: Option<f64>,
}

/// Scan affinity lists and classify every violation against `excluded`.
pub fn classify_violations(
    source: &dyn DataSource,
    excluded: &CpuSet,
    containers: &[ContainerRecord],
) -> Result<ViolationReport> {
    let (irqs, total_irqs_scanned) = load_irq_records(source)?;
    let uptime_seconds = read_uptime(source);
    if uptime_seconds.is_none() {
        warn!("uptime unavailable, interrupt rates will be reported as unknown");
    }

    let mut per_cpu: BTreeMap<usize, Vec<Violation>> = BTreeMap::new();
    for record in &irqs {
        let overlap = record.affinity.intersection(excluded);
        for cpu in overlap.iter() {
            let rate_per_hour =
                uptime_seconds.map(|uptime| record.interrupt_count as f64 / (uptime / 3600.0));
            per_cpu.entry(cpu).or_default().push(Violation {
                cpu,
                irq: record.irq,
                interrupt_count: record.interrupt_count,
                rate_per_hour,
                severity: Severity::classify(record.interrupt_count, rate_per_hour),
                device: record.device.clone(),
            });
        }
    }

    let total_violations = per_cpu.values().map(Vec::len).sum();
    let mut grouped: Vec<CpuViolations> = per_cpu
        .into_iter()
        .map(|(cpu, mut violations)| {
            violations.sort_by(|a, b| {
                b.rate_per_hour
                    .unwrap_or(0.0)
                    .total_cmp(&a.rate_per_hour.unwrap_or(0.0))
                    .then(a.irq.cmp(&b.irq))
            });
            CpuViolations {
                cpu,
                violations,
                containers: containers_on_cpu(containers, cpu),
            }
        })
        .collect();
    grouped.sort_by(|a, b| {
        b.violations
            .len()
            .cmp(&a.violations.len())
            .then(a.cpu.cmp(&b.cpu))
    });

    Ok(ViolationReport {
        per_cpu: grouped,
        total_violations,
        total_irqs_scanned,
        uptime_seconds,
    })
}

fn containers_on_cpu(containers: &[ContainerRecord], cpu: usize) -> Vec<String> {
    containers
        .iter()
        .filter(|record| record.cpus.as_ref().is_some_and(|cpus| cpus.contains(cpu)))
        .map(ContainerRecord::display)
        .collect()
}

/// Read every `proc/irq/<n>/smp_affinity_list` plus interrupt counters.
/// Returns the records and the number of IRQ directories scanned.
fn load_irq_records(source: &dyn DataSource) -> Result<(Vec<IrqRecord>, usize)> {
    let (counts, devices) = match source.read_to_string(paths::PROC_INTERRUPTS)? {
        Some(content) => parse_interrupts(&content),
        None => {
            warn!("{} unavailable, counts default to zero", paths::PROC_INTERRUPTS);
            (HashMap::new(), HashMap::new())
        }
    };

    let mut records = Vec::new();
    let mut scanned = 0;
    for entry in source.list_dir(paths::PROC_IRQ)? {
        let Ok(irq) = entry.parse::<u32>() else {
            continue;
        };
        let path = format!("{}/{}/smp_affinity_list", paths::PROC_IRQ, entry);
        let Some(affinity_list) = source.read_to_string(&path)? else {
            continue;
        };
        scanned += 1;
        let affinity = match CpuSet::parse(&affinity_list) {
            Ok(affinity) if !affinity.is_empty() => affinity,
            Ok(_) => continue,
            Err(e) => {
                warn!("IRQ {}: unparseable affinity list: {}", irq, e);
                continue;
            }
        };
        records.push(IrqRecord {
            irq,
            affinity,
            interrupt_count: counts.get(&irq).copied().unwrap_or(0),
            device: devices
                .get(&irq)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
        });
    }
    debug!("scanned {} IRQs, {} with usable affinity", scanned, records.len());
    Ok((records, scanned))
}

/// Parse the interrupt table: per-IRQ counts summed across the CPU columns,
/// plus a coarse device description from the trailing field.
fn parse_interrupts(content: &str) -> (HashMap<u32, u64>, HashMap<u32, String>) {
    let mut counts = HashMap::new();
    let mut devices = HashMap::new();

    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return (counts, devices);
    };
    let cpu_count = header.split_whitespace().count();

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(irq) = parts
            .first()
            .and_then(|first| first.strip_suffix(':'))
            .and_then(|first| first.parse::<u32>().ok())
        else {
            continue;
        };

        let mut total: u64 = 0;
        for part in parts.iter().skip(1).take(cpu_count) {
            match part.parse::<u64>() {
                Ok(count) => total += count,
                Err(_) => break,
            }
        }
        counts.insert(irq, total);

        if let Some(name) = parts.get(1 + cpu_count..).and_then(<[&str]>::last) {
            devices.insert(irq, describe_device(name));
        }
    }
    (counts, devices)
}

/// Friendlier names for the common interrupt sources.
fn describe_device(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    let description = if name == "timer" {
        "timer"
    } else if name.contains("i8042") {
        "keyboard/mouse"
    } else if name.contains("rtc") {
        "real-time clock"
    } else if name.contains("acpi") {
        "ACPI"
    } else if ["ehci_hcd", "uhci_hcd", "ohci_hcd", "xhci_hcd"]
        .iter()
        .any(|hcd| name.contains(hcd))
    {
        "USB controller"
    } else if name.contains("enp") || name.contains("eth") || name.contains("eno") {
        "ethernet NIC"
    } else if name.contains("wlp") || name.contains("wlan") || name.contains("iwlwifi") {
        "wireless NIC"
    } else if name.contains("nvme") {
        "NVMe storage"
    } else if name.contains("ahci") || name.contains("ata") {
        "SATA controller"
    } else if name.contains("snd") || name.contains("audio") || name.contains("hda") {
        "audio device"
    } else if lowered.contains("usb") {
        "USB device"
    } else if lowered.contains("pci") {
        "PCI device"
    } else {
        name
    };
    description.to_string()
}

/// Host uptime in seconds: the live counter when present, otherwise the
/// captured `uptime` command output.
fn read_uptime(source: &dyn DataSource) -> Option<f64> {
    if let Ok(Some(content)) = source.read_to_string(paths::PROC_UPTIME) {
        if let Some(seconds) = content
            .split_whitespace()
            .next()
            .and_then(|field| field.parse::<f64>().ok())
        {
            return Some(seconds);
        }
    }
    let content = source.read_to_string(paths::UPTIME_DUMP).ok()??;
    parse_uptime_command(&content)
}

/// Parse `uptime` command output such as
/// ` 14:25:07 up 2 days,  3:14,  1 user,  load average: ...` or
/// ` 14:25:07 up 25 min,  1 user, ...`.
fn parse_uptime_command(output: &str) -> Option<f64> {
    let rest = output.split(" up ").nth(1)?;
    let user_pos = rest.find(" user")?;
    let time_part = rest[..user_pos].rsplit_once(',').map(|(t, _)| t)?;

    let mut total: u64 = 0;
    let mut pending_number: Option<u64> = None;
    for token in time_part.split([',', ' ']).filter(|t| !t.is_empty()) {
        if let Ok(number) = token.parse::<u64>() {
            pending_number = Some(number);
        } else if token.starts_with("day") {
            total += pending_number.take()? * 24 * 3600;
        } else if token.starts_with("min") {
            total += pending_number.take()? * 60;
        } else if let Some((hours, minutes)) = token.split_once(':') {
            let hours: u64 = hours.parse().ok()?;
            let minutes: u64 = minutes.parse().ok()?;
            total += hours * 3600 + minutes * 60;
        }
    }
    (total > 0).then_some(total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SnapshotSource;
    use std::fs;

    #[test]
    fn severity_buckets() {
        assert_eq!(Severity::classify(0, Some(0.0)), Severity::Quiet);
        assert_eq!(Severity::classify(0, None), Severity::Quiet);
        assert_eq!(Severity::classify(10, Some(999.9)), Severity::Warning);
        assert_eq!(Severity::classify(10, None), Severity::Warning);
        assert_eq!(Severity::classify(10, Some(1000.0)), Severity::Critical);
        assert_eq!(Severity::classify(10, Some(50_000.0)), Severity::Critical);
    }

    #[test]
    fn severity_is_monotonic_in_rate() {
        let rates = [0.1, 1.0, 500.0, 999.0, 1000.0, 10_000.0];
        for pair in rates.windows(2) {
            let low = Severity::classify(1, Some(pair[0]));
            let high = Severity::classify(1, Some(pair[1]));
            assert!(low <= high);
        }
    }

    #[test]
    fn uptime_command_formats() {
        let two_days =
            " 14:25:07 up 2 days,  3:14,  1 user,  load average: 0.00, 0.01, 0.05";
        assert_eq!(
            parse_uptime_command(two_days),
            Some((2 * 24 * 3600 + 3 * 3600 + 14 * 60) as f64)
        );

        let hours_only = " 14:25:07 up  3:14,  1 user,  load average: 0.00, 0.01, 0.05";
        assert_eq!(parse_uptime_command(hours_only), Some((3 * 3600 + 14 * 60) as f64));

        let minutes_only = " 14:25:07 up 25 min,  1 user,  load average: 0.00, 0.01, 0.05";
        assert_eq!(parse_uptime_command(minutes_only), Some(1500.0));

        assert_eq!(parse_uptime_command("garbage"), None);
    }

    #[test]
    fn interrupt_table_sums_cpu_columns() {
        let table = "\
           CPU0       CPU1       CPU2       CPU3\n\
  0:        100        200          0          0   IO-APIC    2-edge      timer\n\
 24:          5          0          7          0   PCI-MSI 524288-edge      enp3s0-rx-0\n\
 NMI:         1          1          1          1   Non-maskable interrupts\n";
        let (counts, devices) = parse_interrupts(table);
        assert_eq!(counts.get(&0), Some(&300));
        assert_eq!(counts.get(&24), Some(&12));
        assert!(counts.len() == 2);
        assert_eq!(devices.get(&0).map(String::as_str), Some("timer"));
        assert_eq!(devices.get(&24).map(String::as_str), Some("ethernet NIC"));
    }

    fn violation_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (irq, affinity) in [(40, "2"), (41, "2,4"), (42, "0-1"), (43, "4")] {
            let path = dir.path().join(format!("proc/irq/{}", irq));
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("smp_affinity_list"), format!("{}\n", affinity)).unwrap();
        }
        fs::write(dir.path().join("proc/uptime"), "7200.00 14000.00\n").unwrap();
        let table = "\
           CPU0       CPU1       CPU2       CPU3       CPU4\n\
 40:          0          0       4000          0          0   IO-APIC  edge  nvme0q1\n\
 41:          0          0        100          0        100   IO-APIC  edge  enp3s0\n\
 42:         50         50          0          0          0   IO-APIC  edge  timer\n\
 43:          0          0          0          0          0   IO-APIC  edge  acpi\n";
        fs::write(dir.path().join("proc/interrupts"), table).unwrap();
        dir
    }

    #[test]
    fn violations_are_per_cpu_irq_pairs() {
        let dir = violation_fixture();
        let source = SnapshotSource::new(dir.path());
        let excluded = CpuSet::parse("2,4").unwrap();
        let report = classify_violations(&source, &excluded, &[]).unwrap();

        // IRQ 41 spans both excluded CPUs: one violation each.
        assert_eq!(report.total_violations, 4);
        assert_eq!(report.total_irqs_scanned, 4);

        // CPU 2 has two violations, CPU 4 has two; ties order by CPU.
        assert_eq!(report.per_cpu[0].cpu, 2);
        assert_eq!(report.per_cpu[1].cpu, 4);
        // IRQ 42 never touches the excluded set.
        assert!(report
            .per_cpu
            .iter()
            .flat_map(|c| &c.violations)
            .all(|v| v.irq != 42));
    }

    #[test]
    fn zero_count_violation_is_reported_quiet() {
        let dir = violation_fixture();
        let source = SnapshotSource::new(dir.path());
        let excluded = CpuSet::parse("4").unwrap();
        let report = classify_violations(&source, &excluded, &[]).unwrap();

        let quiet: Vec<_> = report
            .per_cpu
            .iter()
            .flat_map(|c| &c.violations)
            .filter(|v| v.irq == 43)
            .collect();
        assert_eq!(quiet.len(), 1);
        assert_eq!(quiet[0].severity, Severity::Quiet);
        assert_eq!(quiet[0].interrupt_count, 0);
    }

    #[test]
    fn rates_use_uptime_hours() {
        let dir = violation_fixture();
        let source = SnapshotSource::new(dir.path());
        let excluded = CpuSet::parse("2").unwrap();
        let report = classify_violations(&source, &excluded, &[]).unwrap();

        // Uptime 7200 s = 2 h; IRQ 40 recorded 4000 interrupts.
        let v40 = report
            .per_cpu
            .iter()
            .flat_map(|c| &c.violations)
            .find(|v| v.irq == 40)
            .unwrap();
        assert_eq!(v40.rate_per_hour, Some(2000.0));
        assert_eq!(v40.severity, Severity::Critical);

        // Within a CPU, the hottest IRQ sorts first.
        assert_eq!(report.per_cpu[0].violations[0].irq, 40);
    }

    #[test]
    fn missing_uptime_classifies_by_count_alone() {
        let dir = violation_fixture();
        fs::remove_file(dir.path().join("proc/uptime")).unwrap();
        let source = SnapshotSource::new(dir.path());
        let excluded = CpuSet::parse("2").unwrap();
        let report = classify_violations(&source, &excluded, &[]).unwrap();

        assert_eq!(report.uptime_seconds, None);
        for violation in report.per_cpu.iter().flat_map(|c| &c.violations) {
            assert_eq!(violation.rate_per_hour, None);
            if violation.interrupt_count == 0 {
                assert_eq!(violation.severity, Severity::Quiet);
            } else {
                assert_eq!(violation.severity, Severity::Warning);
            }
        }
    }
}
