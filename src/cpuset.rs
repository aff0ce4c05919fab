//! Canonical CPU set representation and the range codec.
//!
//! A [`CpuSet`] is an ordered, duplicate-free set of CPU indices. The codec
//! converts between sets and the kernel's compact list notation
//! (`0-3,8-11,16`), and a topology-aware formatter additionally detects
//! strided patterns such as all-even or all-odd sibling layouts so that
//! interleaved hyperthreaded topologies read differently from
//! socket-contiguous ones. Pattern detection is a presentation aid only; it
//! never changes set semantics.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AnalysisError, Result};

/// An ordered set of CPU indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSet {
    cpus: BTreeSet<usize>,
}

impl CpuSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from any iterator of indices. Duplicates collapse.
    pub fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }

    /// Parse kernel list notation (`0-3,8-11,16`) into a set.
    ///
    /// The literal strings `null` and `empty` and the empty string parse to
    /// the empty set, matching what container runtimes emit for an unpinned
    /// cpuset. Any token that is neither a bare index nor `a-b` is a fatal
    /// parse error for this call.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "empty" {
            return Ok(Self::new());
        }

        let mut cpus = BTreeSet::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if let Some((start, end)) = token.split_once('-') {
                let start: usize = start
                    .trim()
                    .parse()
                    .map_err(|_| invalid_token(token, input))?;
                let end: usize = end.trim().parse().map_err(|_| invalid_token(token, input))?;
                if start > end {
                    return Err(invalid_token(token, input));
                }
                cpus.extend(start..=end);
            } else {
                let cpu: usize = token.parse().map_err(|_| invalid_token(token, input))?;
                cpus.insert(cpu);
            }
        }
        Ok(Self { cpus })
    }

    /// Number of CPUs in the set.
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.contains(&cpu)
    }

    /// Insert a single CPU.
    pub fn insert(&mut self, cpu: usize) {
        self.cpus.insert(cpu);
    }

    /// Ascending iterator over the indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpus.iter().copied()
    }

    /// The indices as a sorted vector.
    pub fn to_vec(&self) -> Vec<usize> {
        self.cpus.iter().copied().collect()
    }

    /// Union with another set.
    pub fn union(&self, other: &CpuSet) -> CpuSet {
        CpuSet {
            cpus: self.cpus.union(&other.cpus).copied().collect(),
        }
    }

    /// Intersection with another set.
    pub fn intersection(&self, other: &CpuSet) -> CpuSet {
        CpuSet {
            cpus: self.cpus.intersection(&other.cpus).copied().collect(),
        }
    }

    /// Whether any index is shared with `other`.
    pub fn intersects(&self, other: &CpuSet) -> bool {
        self.cpus.iter().any(|cpu| other.cpus.contains(cpu))
    }

    /// The complement of this set within `[0, host_cpu_count)`.
    pub fn complement(&self, host_cpu_count: usize) -> CpuSet {
        CpuSet {
            cpus: (0..host_cpu_count)
                .filter(|cpu| !self.cpus.contains(cpu))
                .collect(),
        }
    }

    /// Largest index in the set, if any.
    pub fn max(&self) -> Option<usize> {
        self.cpus.iter().next_back().copied()
    }

    /// Compact block notation: consecutive runs merge into `a-b`.
    pub fn format(&self) -> String {
        let cpus = self.to_vec();
        if cpus.is_empty() {
            return String::new();
        }

        let mut ranges = Vec::new();
        let mut i = 0;
        while i < cpus.len() {
            let start = cpus[i];
            while i + 1 < cpus.len() && cpus[i + 1] == cpus[i] + 1 {
                i += 1;
            }
            let end = cpus[i];
            if start == end {
                ranges.push(start.to_string());
            } else {
                ranges.push(format!("{}-{}", start, end));
            }
            i += 1;
        }
        ranges.join(",")
    }

    /// Pattern-aware notation: like [`CpuSet::format`] but strided runs with
    /// a constant step of at least 2 across at least three points render as
    /// `a-b:step`, with an even/odd label for step 2. Runs shorter than
    /// `3 * step` fall back to comma-joined singletons.
    pub fn format_pattern(&self) -> String {
        let cpus = self.to_vec();
        if cpus.is_empty() {
            return String::new();
        }
        if cpus.len() == 1 {
            return cpus[0].to_string();
        }

        let mut ranges = Vec::new();
        let mut i = 0;
        while i < cpus.len() {
            let start = cpus[i];
            let mut end = start;
            let mut step = 1;

            // Two-element lookahead: adopt a stride only if the next two
            // gaps agree. Prefers step 2 layouts by construction since the
            // first matching gap wins.
            if i + 2 < cpus.len() {
                let candidate = cpus[i + 1] - cpus[i];
                if cpus[i + 2] - cpus[i + 1] == candidate {
                    step = candidate;
                }
            }

            while i + 1 < cpus.len() && cpus[i + 1] == cpus[i] + step {
                i += 1;
                end = cpus[i];
            }

            if start == end {
                ranges.push(start.to_string());
            } else if step == 1 {
                ranges.push(format!("{}-{}", start, end));
            } else if end - start >= step * 3 {
                if step == 2 && start % 2 == 0 {
                    ranges.push(format!("{}-{}:2 (even)", start, end));
                } else if step == 2 {
                    ranges.push(format!("{}-{}:2 (odd)", start, end));
                } else {
                    ranges.push(format!("{}-{}:{}", start, end, step));
                }
            } else {
                let seq: Vec<String> = (start..=end)
                    .step_by(step)
                    .map(|cpu| cpu.to_string())
                    .collect();
                ranges.push(seq.join(","));
            }
            i += 1;
        }
        ranges.join(",")
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl serde::Serialize for CpuSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.format())
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cpus: iter.into_iter().collect(),
        }
    }
}

fn invalid_token(token: &str, input: &str) -> AnalysisError {
    AnalysisError::InvalidRangeToken {
        token: token.to_string(),
        input: input.to_string(),
    }
}
