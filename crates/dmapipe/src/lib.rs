//! Driver core for an AXI-style DMA pipe engine.
//!
//! The hardware exposes two buffer FIFOs (one per transfer direction), two
//! wrapping 16-bit completion counters, and a single edge-triggered
//! interrupt line, all behind a small memory-mapped register block. This
//! crate turns that into a submission/completion API:
//!
//! - [`DmaPipe::submit`] pushes a fixed-size buffer descriptor into a
//!   hardware FIFO and returns a [`Marker`] identifying its completion
//!   point.
//! - [`DmaPipe::wait_completed`] blocks (with timeout) until a marker
//!   completes, using the interrupt line rather than spinning.
//! - [`DmaPipe::on_completion`] + [`DmaPipe::dispatch`] deliver completions
//!   asynchronously, in submission order, from the owner's event loop.
//!
//! The crate only borrows its hardware resources: the register window is
//! reached through the [`PipeRegisters`] seam, interrupt delivery through
//! [`IrqEvents`], and DMA buffers must come from an externally-owned
//! [`DmaWindow`]. The `dmapipe-uio` crate provides the Linux
//! `/dev/mem` + UIO implementations of those seams.

mod dispatch;
pub mod error;
pub mod irq;
pub mod marker;
pub mod pipe;
pub mod regs;
pub mod window;

pub use error::{PipeError, Result};
pub use irq::IrqEvents;
pub use marker::{Direction, Marker};
pub use pipe::{DmaPipe, SubmitFlags, MAX_SIZE_ORDER, MIN_BUFFER_LEN};
pub use regs::{MappedRegisters, PipeRegisters};
pub use window::DmaWindow;
