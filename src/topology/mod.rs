//! Host topology resolution.
//!
//! Maps every CPU to its NUMA node and LLC group, and PCI devices to their
//! NUMA nodes. Each resolver has a primary sysfs source and a documented
//! fallback so that captured snapshots with partial `sys/` trees still
//! resolve where possible.

pub mod llc;
pub mod numa;
pub mod pci;

pub use llc::LlcTopology;
pub use numa::NumaTopology;
pub use pci::device_numa_node;
