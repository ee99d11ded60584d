use thiserror::Error;

use crate::marker::Direction;

pub type Result<T> = std::result::Result<T, PipeError>;

/// Unified error type for pipe operations.
///
/// Timeouts are not represented here: an elapsed deadline is an expected
/// operational outcome, reported as `Ok(false)` from
/// [`DmaPipe::wait_completed`](crate::DmaPipe::wait_completed) and
/// `Ok(None)` from
/// [`DmaPipe::wait_for_interrupt`](crate::DmaPipe::wait_for_interrupt).
#[derive(Debug, Error)]
pub enum PipeError {
    /// The reserved memory window must be configured before buffers can be
    /// translated. Recoverable: configure and retry.
    #[error("reserved memory window is not configured")]
    WindowNotConfigured,

    /// A buffer pointer (or part of its range) falls outside the reserved
    /// window. Indicates a caller bug; not retried.
    #[error("buffer {addr:#x} outside reserved window [{base:#x}, {end:#x})")]
    InvalidAddress {
        addr: usize,
        base: usize,
        end: usize,
    },

    /// A buffer's physical address has bits in the descriptor's size/flag
    /// field. Buffers must be aligned to the minimum transfer unit.
    #[error("buffer physical address {phys:#x} is not 4096-byte aligned")]
    UnalignedBuffer { phys: u32 },

    /// A buffer length is not `4096 << k` for `k <= 15`.
    #[error("invalid buffer length {len}: expected 4096 << k with k <= 15")]
    InvalidLength { len: usize },

    /// The hardware FIFO reports zero acceptance. Expected under load;
    /// wait for acceptance (or an interrupt) before resubmitting.
    #[error("hardware is not accepting {direction} buffers")]
    BackpressureExceeded { direction: Direction },

    /// A register window or interrupt device could not be acquired at
    /// construction.
    #[error("could not acquire {device}: {source}")]
    DeviceUnavailable {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// The interrupt descriptor failed mid-operation.
    #[error("interrupt descriptor i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
