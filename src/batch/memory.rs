//! Process memory sampling for adaptive batch sizing.

use std::fs;

/// Samples the process's resident memory.
///
/// A trait seam so tests (and non-Linux embedders) can substitute their
/// own source. Sampling failures are reported as `None` and logged by
/// the monitor — they never abort ongoing work.
pub trait MemorySampler: Send + Sync {
    /// Resident set size in bytes, or `None` when unavailable.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Default sampler reading `VmRSS` from `/proc/self/status` (Linux).
///
/// Returns `None` on platforms without procfs.
pub struct ProcSelfSampler;

impl MemorySampler for ProcSelfSampler {
    fn resident_bytes(&self) -> Option<u64> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

/// Extract the `VmRSS` line, reported by the kernel in kB.
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
