//! Container runtime metadata and the isolation extractor.
//!
//! Each container is captured as one JSON inspection record. The shapes we
//! rely on are modeled as structs with explicit optional fields so a missing
//! annotation or CPU set is a checked branch, not a runtime key miss. A
//! container counts as isolated only when both the IRQ-load-balancing and
//! CPU-quota annotations carry the literal value `disable`; the union of the
//! isolated containers' CPU sets is the host's excluded set.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::{annotations, paths};
use crate::cpuset::CpuSet;
use crate::error::{AnalysisError, Result};
use crate::source::DataSource;

/// Parsed view of one container inspection record.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    /// Full runtime id.
    pub id: String,
    /// Truncated display id (first 12 characters).
    pub short_id: String,
    pub name: String,
    /// Both isolation annotations present and set to `disable`.
    pub is_isolated: bool,
    /// Pinned CPU set. `None` when the record carries no cpuset or the field
    /// failed to parse; such containers never contribute to the excluded set.
    pub cpus: Option<CpuSet>,
    /// The cpuset field as captured, for display.
    pub cpus_raw: String,
    /// PCI device addresses attached to the container.
    pub pci_devices: Vec<String>,
    /// Network namespace id, when one is recorded.
    pub network_namespace: Option<String>,
}

impl ContainerRecord {
    /// Short `name (id)` form used throughout reports.
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.short_id)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    #[serde(default)]
    status: RawStatus,
    #[serde(default)]
    info: RawInfo,
}

#[derive(Debug, Default, Deserialize)]
struct RawStatus {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    resources: Option<RawResources>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawResources {
    #[serde(default)]
    linux: Option<RawLinuxResources>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLinuxResources {
    #[serde(default)]
    cpuset_cpus: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInfo {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    config: Option<RawConfig>,
    #[serde(default)]
    runtime_spec: Option<RawRuntimeSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRuntimeSpec {
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(default)]
    process: Option<RawProcess>,
    #[serde(default)]
    linux: Option<RawLinuxSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProcess {
    #[serde(default)]
    env: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLinuxSpec {
    #[serde(default)]
    namespaces: Vec<RawNamespace>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNamespace {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PciEnvEntry {
    #[serde(default)]
    generic: Option<PciGeneric>,
}

#[derive(Debug, Deserialize)]
struct PciGeneric {
    #[serde(rename = "deviceID")]
    device_id: Option<String>,
}

/// Parse one inspection record. `fallback_id` (usually the file name) is used
/// when the record itself names no id.
pub fn parse_record(fallback_id: &str, json: &str) -> serde_json::Result<ContainerRecord> {
    let raw: RawRecord = serde_json::from_str(json)?;

    let name = raw
        .info
        .config
        .as_ref()
        .and_then(|c| c.metadata.as_ref())
        .and_then(|m| m.name.clone())
        .or_else(|| raw.status.metadata.as_ref().and_then(|m| m.name.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let id = raw
        .status
        .id
        .clone()
        .or_else(|| raw.info.id.clone())
        .unwrap_or_else(|| fallback_id.to_string());
    let short_id = if id.len() > 12 { id[..12].to_string() } else { id.clone() };

    let spec = raw.info.runtime_spec.unwrap_or_default();

    let is_isolated = spec.annotations.get(annotations::IRQ_LOAD_BALANCING).map(String::as_str)
        == Some(annotations::DISABLED)
        && spec.annotations.get(annotations::CPU_QUOTA).map(String::as_str)
            == Some(annotations::DISABLED);

    let cpus_raw = raw
        .status
        .resources
        .and_then(|r| r.linux)
        .and_then(|l| l.cpuset_cpus)
        .unwrap_or_default();

    let cpus = if cpus_raw.is_empty() {
        None
    } else {
        match CpuSet::parse(&cpus_raw) {
            Ok(set) if !set.is_empty() => Some(set),
            Ok(_) => None,
            Err(e) => {
                warn!("container {}: unparseable cpuset '{}': {}", short_id, cpus_raw, e);
                None
            }
        }
    };

    let env = spec.process.map(|p| p.env).unwrap_or_default();
    let pci_devices = extract_pci_devices(&env);

    let network_namespace = spec
        .linux
        .map(|l| l.namespaces)
        .unwrap_or_default()
        .into_iter()
        .find(|ns| ns.kind == "network")
        .and_then(|ns| ns.path)
        .and_then(|path| path.rsplit('/').next().map(str::to_string));

    Ok(ContainerRecord {
        id,
        short_id,
        name,
        is_isolated,
        cpus,
        cpus_raw,
        pci_devices,
        network_namespace,
    })
}

/// Pull PCI device addresses out of the injected device-info environment
/// entries. Malformed payloads skip only the entry that carried them.
fn extract_pci_devices(env: &[String]) -> Vec<String> {
    let mut devices = Vec::new();
    for var in env {
        if !var.starts_with(annotations::PCI_DEVICE_ENV_PREFIX)
            || !var.contains(annotations::PCI_DEVICE_ENV_INFO)
        {
            continue;
        }
        let Some((_, value)) = var.split_once('=') else {
            continue;
        };

        match serde_json::from_str::<BTreeMap<String, PciEnvEntry>>(value) {
            Ok(entries) => {
                for entry in entries.values() {
                    if let Some(address) =
                        entry.generic.as_ref().and_then(|g| g.device_id.clone())
                    {
                        devices.push(address);
                    }
                }
            }
            Err(e) => {
                debug!("skipping malformed PCI device payload: {}", e);
            }
        }
    }
    devices
}

/// Load every container record the source can list. A record that fails to
/// parse is skipped with a warning; the run continues.
pub fn load_containers(source: &dyn DataSource) -> Result<Vec<ContainerRecord>> {
    let entries = source.list_dir(paths::CONTAINERS_DIR)?;
    if entries.is_empty() {
        warn!("no container records under {}", paths::CONTAINERS_DIR);
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in entries {
        let path = format!("{}/{}", paths::CONTAINERS_DIR, entry);
        let Some(json) = source.read_to_string(&path)? else {
            continue;
        };
        match parse_record(&entry, &json) {
            Ok(record) => records.push(record),
            Err(e) => {
                let err = AnalysisError::ContainerRecord {
                    id: entry.clone(),
                    reason: e.to_string(),
                };
                warn!("skipping: {}", err);
            }
        }
    }
    debug!("loaded {} container records", records.len());
    Ok(records)
}

/// Union of the CPU sets pinned by isolated containers: the CPUs that must
/// be excluded from IRQ servicing.
pub fn isolated_cpus(records: &[ContainerRecord]) -> CpuSet {
    records
        .iter()
        .filter(|r| r.is_isolated)
        .filter_map(|r| r.cpus.as_ref())
        .fold(CpuSet::new(), |acc, cpus| acc.union(cpus))
}
