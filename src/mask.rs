//! Hexadecimal affinity mask codec.
//!
//! The kernel (`/proc/irq/*/smp_affinity`, `default_smp_affinity`) and the
//! irqbalance daemon (`IRQBALANCE_BANNED_CPUS`) both consume masks written as
//! comma-separated 32-bit hex groups, most-significant group first. Bit `b` of
//! group `i` maps to CPU `32i + b`. The two consumers parse the notation with
//! different code, and irqbalance has historically mis-read masks the kernel
//! accepts, so the two encodings are produced by separate functions over one
//! shared bit-packing primitive: a divergence, once observed, gets patched in
//! exactly one encoder.

use crate::constants::mask::{GROUP_BITS, GROUP_HEX_DIGITS};
use crate::cpuset::CpuSet;
use crate::error::{AnalysisError, Result};

/// Pack a set into 32-bit groups, least-significant group first. Always emits
/// enough groups to cover `host_cpu_count`, never fewer than one.
fn pack_groups(cpus: &CpuSet, host_cpu_count: usize) -> Vec<u32> {
    let group_count = host_cpu_count.max(1).div_ceil(GROUP_BITS);
    let mut groups = vec![0u32; group_count];
    for cpu in cpus.iter() {
        if cpu < host_cpu_count {
            groups[cpu / GROUP_BITS] |= 1 << (cpu % GROUP_BITS);
        }
    }
    groups
}

/// Encode a set as the kernel's mask notation.
///
/// Groups are emitted most-significant first; the leading group drops its
/// leading zero nibbles (`0` when the group is empty), every other group is
/// exactly eight hex digits.
pub fn kernel_mask(cpus: &CpuSet, host_cpu_count: usize) -> String {
    let groups = pack_groups(cpus, host_cpu_count);
    let mut out = String::new();
    for (idx, group) in groups.iter().rev().enumerate() {
        if idx == 0 {
            out.push_str(&format!("{:x}", group));
        } else {
            out.push_str(&format!(",{:08x}", group));
        }
    }
    out
}

/// Encode a set as the irqbalance banned-CPU mask.
///
/// Bit-identical to [`kernel_mask`] today. Kept as an independent encoder so
/// a confirmed irqbalance parser quirk can be compensated here without
/// touching what the kernel is fed.
pub fn balancer_mask(cpus: &CpuSet, host_cpu_count: usize) -> String {
    let groups = pack_groups(cpus, host_cpu_count);
    let mut out = String::new();
    for (idx, group) in groups.iter().rev().enumerate() {
        if idx == 0 {
            out.push_str(&format!("{:x}", group));
        } else {
            out.push_str(&format!(",{:08x}", group));
        }
    }
    out
}

/// Normalize a mask string for comparison: lowercase, every group
/// left-padded to eight digits. A stripped mask and a fully padded mask of
/// the same bit content normalize identically.
pub fn normalize_mask(mask: &str) -> String {
    mask.trim()
        .to_ascii_lowercase()
        .split(',')
        .map(|group| {
            let group = group.trim();
            format!("{:0>width$}", group, width = GROUP_HEX_DIGITS)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether two mask strings name the same CPUs, ignoring padding and case.
pub fn masks_equivalent(a: &str, b: &str) -> bool {
    normalize_mask(a) == normalize_mask(b)
}

/// Decode a mask string back into a [`CpuSet`] bounded by `host_cpu_count`.
pub fn parse_mask(mask: &str, host_cpu_count: usize) -> Result<CpuSet> {
    let trimmed = mask.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::InvalidRangeToken {
            token: String::new(),
            input: mask.to_string(),
        });
    }

    let groups: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    let mut cpus = CpuSet::new();
    // Groups arrive most-significant first; walk from the tail so group
    // index equals CPU block index.
    for (idx, group) in groups.iter().rev().enumerate() {
        let value = u32::from_str_radix(group, 16).map_err(|_| AnalysisError::InvalidRangeToken {
            token: (*group).to_string(),
            input: mask.to_string(),
        })?;
        for bit in 0..GROUP_BITS {
            if value & (1 << bit) != 0 {
                let cpu = idx * GROUP_BITS + bit;
                if cpu < host_cpu_count {
                    cpus.insert(cpu);
                }
            }
        }
    }
    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_group_mask() {
        // 2,4,6-8 -> bits 2,4,6,7,8 -> 0b1_1101_0100
        let cpus = CpuSet::parse("2,4,6-8").unwrap();
        assert_eq!(kernel_mask(&cpus, 16), "1d4");
    }

    #[test]
    fn zero_group_is_never_empty_string() {
        let cpus = CpuSet::new();
        assert_eq!(kernel_mask(&cpus, 16), "0");
        assert_eq!(kernel_mask(&cpus, 64), "0,00000000");
    }

    #[test]
    fn multi_group_layout_is_msb_first() {
        let cpus = CpuSet::from_iter([0, 32, 64, 95]);
        assert_eq!(kernel_mask(&cpus, 96), "80000001,00000001,00000001");
    }

    #[test]
    fn leading_group_strips_zero_nibbles_only() {
        let cpus = CpuSet::from_iter([0, 33]);
        assert_eq!(kernel_mask(&cpus, 64), "2,00000001");
    }

    #[test]
    fn kernel_and_balancer_agree_under_normalization() {
        for expr in ["2,4,6-8", "0-63", "0,32,64", "1-3,40-45,70"] {
            let cpus = CpuSet::parse(expr).unwrap();
            let kernel = kernel_mask(&cpus, 80);
            let balancer = balancer_mask(&cpus, 80);
            assert!(masks_equivalent(&kernel, &balancer));
        }
    }

    #[test]
    fn normalization_pads_and_lowercases() {
        assert_eq!(normalize_mask("1D4"), "000001d4");
        assert_eq!(normalize_mask("2,00000001"), "00000002,00000001");
        assert!(masks_equivalent("000001d4", "1d4"));
        assert!(masks_equivalent("0,00000001", "00000000,00000001"));
    }

    #[test]
    fn decode_round_trips_encode() {
        for expr in ["2,4,6-8", "0-15", "31", "0,31,32,63", "5-9,33-37"] {
            let cpus = CpuSet::parse(expr).unwrap();
            let mask = kernel_mask(&cpus, 64);
            assert_eq!(parse_mask(&mask, 64).unwrap(), cpus);
        }
    }

    #[test]
    fn decode_rejects_bad_hex() {
        assert!(parse_mask("zz", 16).is_err());
        assert!(parse_mask("", 16).is_err());
    }

    #[test]
    fn decode_ignores_bits_beyond_host() {
        let cpus = parse_mask("ffffffff", 4).unwrap();
        assert_eq!(cpus.to_vec(), vec![0, 1, 2, 3]);
    }
}
