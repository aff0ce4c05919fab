//! The `container_irq_analyzer` core library.
//!
//! This crate analyzes IRQ affinity and topology alignment on hosts that
//! isolate CPUs for latency-sensitive containers: which CPUs must be
//! excluded from interrupt servicing, the kernel and irqbalance mask
//! encodings for that exclusion, and whether each isolated container's
//! CPUs, PCI devices, and caches agree on placement.

pub mod alignment;
pub mod analysis;
pub mod config;
pub mod constants;
pub mod containers;
pub mod context;
pub mod cpuset;
pub mod error;
pub mod irq;
pub mod mask;
pub mod report;
pub mod source;
pub mod topology;
