//! Deadline model for serial reads and writes.
//!
//! A [`Timeout`] never stores a deadline. Each call asks it for a budget
//! scaled by the number of bytes involved, so replacing the timeout on a port
//! only affects calls that start afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call timing bounds, in milliseconds.
///
/// The budget of a read of `n` bytes is
/// `read_timeout_constant + read_timeout_multiplier * n`, and likewise for
/// writes. `inter_byte_timeout` bounds the gap between consecutive bytes of a
/// read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timeout {
    /// Maximum gap between two received bytes. [`Timeout::MAX`] disables it.
    pub inter_byte_timeout: u32,
    /// Fixed part of every read budget. [`Timeout::MAX`] blocks forever.
    pub read_timeout_constant: u32,
    /// Additional read budget per requested byte.
    pub read_timeout_multiplier: u32,
    /// Fixed part of every write budget. [`Timeout::MAX`] blocks forever.
    pub write_timeout_constant: u32,
    /// Additional write budget per byte written.
    pub write_timeout_multiplier: u32,
}

impl Timeout {
    /// Sentinel: "no limit" for the inter-byte gap, "forever" for constants.
    pub const MAX: u32 = u32::MAX;

    pub const fn new(
        inter_byte_timeout: u32,
        read_timeout_constant: u32,
        read_timeout_multiplier: u32,
        write_timeout_constant: u32,
        write_timeout_multiplier: u32,
    ) -> Self {
        Self {
            inter_byte_timeout,
            read_timeout_constant,
            read_timeout_multiplier,
            write_timeout_constant,
            write_timeout_multiplier,
        }
    }

    /// Same constant bound for reads and writes, independent of size.
    pub const fn simple(timeout_ms: u32) -> Self {
        Self::new(Self::MAX, timeout_ms, 0, timeout_ms, 0)
    }

    /// Every call polls once and returns immediately.
    pub const fn non_blocking() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }

    /// Every call waits until its byte count is satisfied.
    pub const fn blocking() -> Self {
        Self::new(Self::MAX, Self::MAX, 0, Self::MAX, 0)
    }

    /// Read budget in milliseconds for `bytes` requested bytes.
    pub fn read_timeout_ms(&self, bytes: usize) -> u64 {
        scaled(self.read_timeout_constant, self.read_timeout_multiplier, bytes)
    }

    /// Write budget in milliseconds for a `bytes`-long payload.
    pub fn write_timeout_ms(&self, bytes: usize) -> u64 {
        scaled(self.write_timeout_constant, self.write_timeout_multiplier, bytes)
    }

    /// Read budget, or `None` when reads block forever.
    pub fn read_budget(&self, bytes: usize) -> Option<Duration> {
        budget(self.read_timeout_constant, self.read_timeout_ms(bytes))
    }

    /// Write budget, or `None` when writes block forever.
    pub fn write_budget(&self, bytes: usize) -> Option<Duration> {
        budget(self.write_timeout_constant, self.write_timeout_ms(bytes))
    }

    /// Inter-byte bound, or `None` when disabled.
    pub fn inter_byte(&self) -> Option<Duration> {
        (self.inter_byte_timeout != Self::MAX)
            .then(|| Duration::from_millis(u64::from(self.inter_byte_timeout)))
    }
}

fn scaled(constant: u32, multiplier: u32, bytes: usize) -> u64 {
    let bytes = u64::try_from(bytes).unwrap_or(u64::MAX);
    u64::from(constant).saturating_add(u64::from(multiplier).saturating_mul(bytes))
}

fn budget(constant: u32, total_ms: u64) -> Option<Duration> {
    (constant != Timeout::MAX).then(|| Duration::from_millis(total_ms))
}
