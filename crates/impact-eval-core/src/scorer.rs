//! Deterministic confidence scoring.
//!
//! A confidence value is drawn uniformly from a reviewer's declared range,
//! with the PRNG seeded from a stable hash of the initiative identifier. The
//! same identifier and range produce the same value on every machine and in
//! every process, which makes the deterministic strategy usable for pipeline
//! debugging and regression fixtures.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// A confidence range that failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid confidence range ({low}, {high}): {reason}")]
pub struct InvalidRangeError {
    pub low: f64,
    pub high: f64,
    pub reason: &'static str,
}

/// Closed `[low, high]` interval inside `[0, 1]`.
///
/// Serialized as a two-element array, `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct ConfidenceRange {
    low: f64,
    high: f64,
}

impl ConfidenceRange {
    /// Build a validated range.
    pub fn new(low: f64, high: f64) -> Result<Self, InvalidRangeError> {
        let reject = |reason| Err(InvalidRangeError { low, high, reason });

        if !low.is_finite() || !high.is_finite() {
            return reject("bounds must be finite");
        }
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
            return reject("bounds must lie within [0, 1]");
        }
        if low > high {
            return reject("lower bound exceeds upper bound");
        }

        Ok(Self { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Whether `value` lies inside the range (inclusive).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }

    /// Human-readable summary used in deterministic reports.
    pub fn describe(&self) -> String {
        format!(
            "Confidence drawn uniformly between {:.2} and {:.2}",
            self.low, self.high
        )
    }
}

impl fmt::Display for ConfidenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.low, self.high)
    }
}

impl TryFrom<(f64, f64)> for ConfidenceRange {
    type Error = InvalidRangeError;

    fn try_from((low, high): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(low, high)
    }
}

impl From<ConfidenceRange> for (f64, f64) {
    fn from(range: ConfidenceRange) -> Self {
        (range.low, range.high)
    }
}

/// Seed derived from the first eight bytes of the SHA-256 digest, big-endian.
fn stable_seed(initiative_id: &str) -> u64 {
    let digest = Sha256::digest(initiative_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Draw a reproducible confidence value for `initiative_id` from `range`.
///
/// The draw depends only on its inputs: no clock, no global RNG, no shared
/// state. Reproducibility across releases holds as long as the `rand` minor
/// version (and with it the `StdRng` algorithm) is unchanged.
pub fn score_confidence(initiative_id: &str, range: ConfidenceRange) -> f64 {
    if range.low == range.high {
        return range.low;
    }

    let mut rng = StdRng::seed_from_u64(stable_seed(initiative_id));
    let confidence = rng.gen_range(range.low..=range.high);

    tracing::debug!(initiative_id, %range, confidence, "Drew deterministic confidence");
    confidence
}

/// Validate `(low, high)` and draw a confidence value in one step.
pub fn score(initiative_id: &str, low: f64, high: f64) -> Result<f64, InvalidRangeError> {
    Ok(score_confidence(initiative_id, ConfidenceRange::new(low, high)?))
}
