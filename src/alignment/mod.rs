//! Per-container topology alignment checks.
//!
//! NUMA and LLC alignment are evaluated independently: a container can have
//! its CPUs and PCI devices on one NUMA node while its CPUs straddle two
//! last-level caches, and each misconfiguration costs differently.

pub mod llc;
pub mod numa;

use std::fmt;

use serde::Serialize;

pub use llc::{check_llc_alignment, LlcAlignmentResult};
pub use numa::{check_numa_alignment, DeviceNuma, NumaAlignmentResult};

/// Verdict for one container on one alignment axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Aligned,
    Misaligned,
    /// The inputs needed for a verdict could not be resolved. Never folded
    /// into `Aligned`.
    Error,
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Alignment::Aligned => "ALIGNED",
            Alignment::Misaligned => "MISALIGNED",
            Alignment::Error => "ERROR",
        };
        write!(f, "{}", text)
    }
}

/// Tallies over the counted results of one alignment axis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlignmentSummary {
    pub aligned: usize,
    pub misaligned: usize,
    pub errors: usize,
}

impl AlignmentSummary {
    pub fn tally<'a, I: IntoIterator<Item = (&'a Alignment, bool)>>(verdicts: I) -> Self {
        let mut summary = Self::default();
        for (verdict, counted) in verdicts {
            if !counted {
                continue;
            }
            match verdict {
                Alignment::Aligned => summary.aligned += 1,
                Alignment::Misaligned => summary.misaligned += 1,
                Alignment::Error => summary.errors += 1,
            }
        }
        summary
    }
}
