//! Generation request shape and parameter policies.
//!
//! [`GenerationRequest`] mirrors the handler boundary input. The free
//! functions implement the value policies applied during binding: batch
//! clamping, seed generation, and the creativity gate.

use serde::Deserialize;

use crate::error::JobError;

/// Smallest batch size a job may run with.
pub const MIN_BATCH_SIZE: u32 = 1;
/// Largest batch size a job may run with; bounds per-job resource use.
pub const MAX_BATCH_SIZE: u32 = 4;

/// Creativity at or below this value bypasses the designated
/// enhancement nodes entirely. A binary gate, not a continuous blend;
/// known coarse-grained policy.
pub const CREATIVITY_THRESHOLD: f64 = 0.5;

/// One generation job's user parameters, as received at the handler
/// boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    /// Positive prompt text. Required, must be non-empty.
    pub positive: String,
    /// Negative prompt text.
    #[serde(default)]
    pub negative: String,
    /// Requested image count; clamped to `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
    #[serde(default = "default_number")]
    pub number: u32,
    /// Creativity knob in `[0, 1]`; see [`CREATIVITY_THRESHOLD`].
    #[serde(default = "default_creativity")]
    pub creativity: f64,
    /// Caller-supplied seed; generated when absent.
    #[serde(default)]
    pub seed: Option<u32>,
    /// Output width override, when the workflow should deviate from its
    /// template default.
    #[serde(default)]
    pub width: Option<u32>,
    /// Output height override.
    #[serde(default)]
    pub height: Option<u32>,
}

fn default_number() -> u32 {
    1
}

fn default_creativity() -> f64 {
    1.0
}

impl GenerationRequest {
    /// Reject requests that cannot produce a meaningful job.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.positive.trim().is_empty() {
            return Err(JobError::InvalidInput("positive is required".into()));
        }
        Ok(())
    }
}

/// Clamp a requested batch size into the allowed range.
pub fn clamp_batch_size(requested: u32) -> u32 {
    requested.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
}

/// True when the creativity value calls for bypassing the designated
/// enhancement nodes. The boundary value is treated as "low".
pub fn low_creativity(creativity: f64) -> bool {
    creativity <= CREATIVITY_THRESHOLD
}

/// Generate a seed uniformly distributed over the full unsigned 32-bit
/// range from the system clock's sub-second resolution.
///
/// Not cryptographic and not reproducible; the engine only needs a
/// value that varies between submissions.
pub fn generate_seed() -> u32 {
    let micros = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    (micros % (1u128 << 32)) as u32
}
