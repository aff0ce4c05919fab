//! Domain constants for the analyzer.
//!
//! This module contains compile-time constants used throughout the application.
//! These are separated from runtime configuration to provide clear distinction
//! between values that never change and those that can be configured.

/// Container runtime annotation keys and values.
pub mod annotations {
    /// Annotation that must be `disable` for a container's IRQ load
    /// balancing to be considered off.
    pub const IRQ_LOAD_BALANCING: &str = "irq-load-balancing.crio.io";

    /// Annotation that must be `disable` for a container's CPU quota to be
    /// considered off.
    pub const CPU_QUOTA: &str = "cpu-quota.crio.io";

    /// The literal value both annotations must carry for a container to
    /// count as isolated.
    pub const DISABLED: &str = "disable";

    /// Environment variable prefix carrying attached PCI device metadata.
    pub const PCI_DEVICE_ENV_PREFIX: &str = "PCIDEVICE_OPENSHIFT";

    /// Environment variable suffix marking the JSON device-info payload.
    pub const PCI_DEVICE_ENV_INFO: &str = "_INFO=";
}

/// Logical paths into the data source (live root or captured snapshot).
pub mod paths {
    /// Per-IRQ directories with `smp_affinity_list` files.
    pub const PROC_IRQ: &str = "proc/irq";

    /// Interrupt counters per IRQ line.
    pub const PROC_INTERRUPTS: &str = "proc/interrupts";

    /// Live uptime, first field in seconds.
    pub const PROC_UPTIME: &str = "proc/uptime";

    /// Per-CPU inventory dump, used as the NUMA fallback source.
    pub const PROC_CPUINFO: &str = "proc/cpuinfo";

    /// Per-node directories with `cpulist` files.
    pub const SYS_NODE: &str = "sys/devices/system/node";

    /// Per-CPU directories with cache topology files.
    pub const SYS_CPU: &str = "sys/devices/system/cpu";

    /// Per-device directories with `numa_node` files.
    pub const SYS_PCI_DEVICES: &str = "sys/bus/pci/devices";

    /// Default affinity mask applied to newly registered IRQs.
    pub const DEFAULT_SMP_AFFINITY: &str = "proc/irq/default_smp_affinity";

    /// irqbalance daemon configuration with the banned-CPU mask.
    pub const IRQBALANCE_CONFIG: &str = "etc/sysconfig/irqbalance";

    /// Captured container runtime records, one JSON file per container.
    pub const CONTAINERS_DIR: &str = "sos_commands/crio/containers";

    /// Captured verbose PCI listing, the fallback for device NUMA lookup.
    pub const LSPCI_DUMP: &str = "sos_commands/pci/lspci_-nnvv";

    /// Captured `uptime` command output.
    pub const UPTIME_DUMP: &str = "uptime";

    /// Captured per-namespace command outputs.
    pub const NETNS_DIR: &str = "sos_commands/networking/namespaces";
}

/// IRQ rate severity policy.
pub mod severity {
    /// Interrupts per hour at or above which a violation is critical.
    pub const CRITICAL_RATE_PER_HOUR: f64 = 1000.0;
}

/// Affinity mask layout.
pub mod mask {
    /// CPUs covered by one comma-separated hex group.
    pub const GROUP_BITS: usize = 32;

    /// Hex digits per fully padded group.
    pub const GROUP_HEX_DIGITS: usize = 8;
}
