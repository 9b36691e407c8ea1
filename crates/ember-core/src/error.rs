//! Spec validation errors.

use thiserror::Error;

/// A caller-supplied cluster spec violates a provisioning constraint.
/// Returned before any provider call is issued; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("cpu count must be at least 1, got {cpu}")]
    CpuTooSmall { cpu: u32 },

    #[error("ram must be a multiple of 256 MB, got {ram_mb}")]
    RamNotAligned { ram_mb: u32 },

    #[error("worker count must be at least 1")]
    NoWorkers,
}
