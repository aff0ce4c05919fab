//! PCI device to NUMA node lookup.
//!
//! Primary source: the device's `numa_node` attribute under
//! `sys/bus/pci/devices`. The attribute reads `-1` on single-node systems
//! and on snapshots where firmware reported nothing, so a verbose `lspci`
//! capture serves as the fallback: the device's block is located by its
//! short-form address and scanned for a `NUMA node:` line. A device absent
//! from both sources resolves to [`AnalysisError::DeviceNumaUnknown`] and
//! degrades only that device.

use tracing::debug;

use crate::constants::paths;
use crate::error::{AnalysisError, Result};
use crate::source::DataSource;

/// Resolve the NUMA node of one PCI device by full address
/// (`0000:2f:00.7`).
pub fn device_numa_node(source: &dyn DataSource, address: &str) -> Result<usize> {
    if let Some(node) = from_sysfs(source, address)? {
        return Ok(node);
    }
    if let Some(node) = from_lspci_dump(source, address)? {
        debug!("PCI {}: NUMA node {} via lspci fallback", address, node);
        return Ok(node);
    }
    Err(AnalysisError::DeviceNumaUnknown {
        address: address.to_string(),
    })
}

fn from_sysfs(source: &dyn DataSource, address: &str) -> Result<Option<usize>> {
    let path = format!("{}/{}/numa_node", paths::SYS_PCI_DEVICES, address);
    let Some(content) = source.read_to_string(&path)? else {
        return Ok(None);
    };
    match content.trim().parse::<i64>() {
        Ok(node) if node >= 0 => Ok(Some(node as usize)),
        _ => Ok(None),
    }
}

/// Scan the captured `lspci -nnvv` output. Device headers are unindented
/// lines beginning with the short address (`2f:00.7`); attribute lines
/// within the block are indented.
fn from_lspci_dump(source: &dyn DataSource, address: &str) -> Result<Option<usize>> {
    let Some(content) = source.read_to_string(paths::LSPCI_DUMP)? else {
        return Ok(None);
    };

    let short = address.strip_prefix("0000:").unwrap_or(address);
    let mut in_device_block = false;

    for line in content.lines() {
        let indented = line.starts_with('\t') || line.starts_with(' ');
        if !indented {
            in_device_block = line.starts_with(short);
            continue;
        }
        if in_device_block {
            let line = line.trim();
            if line.starts_with("NUMA") {
                if let Some(node) = line
                    .rsplit(|c: char| c.is_whitespace())
                    .next()
                    .and_then(|token| token.parse::<i64>().ok())
                {
                    if node >= 0 {
                        return Ok(Some(node as usize));
                    }
                }
                return Ok(None);
            }
        }
    }
    Ok(None)
}
