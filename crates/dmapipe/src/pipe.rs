//! The pipe instance: submission, completion tracking, waiting, dispatch.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::dispatch::PendingCallbacks;
use crate::error::{PipeError, Result};
use crate::irq::IrqEvents;
use crate::marker::{counter_reached, Direction, Marker};
use crate::regs::PipeRegisters;
use crate::window::DmaWindow;

/// Minimum transfer unit. Valid buffer lengths are
/// `MIN_BUFFER_LEN << size_order`.
pub const MIN_BUFFER_LEN: usize = 4096;

/// Largest size-order encodable in the descriptor's 4-bit field.
pub const MAX_SIZE_ORDER: u32 = 15;

bitflags! {
    /// Per-submission hardware flags, packed into descriptor bits 4 and up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SubmitFlags: u32 {
        /// Raise an interrupt when this buffer completes.
        const IRQ_ON_COMPLETE = 1 << 0;
    }
}

/// One hardware DMA pipe: a read queue and a write queue sharing a
/// register block and an interrupt line.
///
/// Single-threaded: all access must come from the thread driving the
/// owner's event loop, or be externally synchronized. Only
/// [`wait_completed`] and [`wait_for_interrupt`] block; submission and
/// dispatch never do. Dropping the pipe abandons any still-pending
/// completion callbacks without invoking them.
///
/// [`wait_completed`]: DmaPipe::wait_completed
/// [`wait_for_interrupt`]: DmaPipe::wait_for_interrupt
pub struct DmaPipe {
    regs: Box<dyn PipeRegisters>,
    irq: Box<dyn IrqEvents>,
    window: Option<DmaWindow>,
    /// Buffers submitted per direction since construction, seeded from the
    /// hardware completion counters so host and device agree even when the
    /// engine has been used before.
    buffers_read: u32,
    buffers_written: u32,
    pending_read: PendingCallbacks,
    pending_write: PendingCallbacks,
}

impl DmaPipe {
    /// Attach to a pipe through its register block and interrupt channel.
    pub fn new(regs: Box<dyn PipeRegisters>, irq: Box<dyn IrqEvents>) -> Self {
        let buffers_read = regs.read(Direction::Read.completed_reg()) & 0xffff;
        let buffers_written = regs.read(Direction::Write.completed_reg()) & 0xffff;
        debug!(buffers_read, buffers_written, "attached to pipe hardware");
        Self {
            regs,
            irq,
            window: None,
            buffers_read,
            buffers_written,
            pending_read: PendingCallbacks::new(),
            pending_write: PendingCallbacks::new(),
        }
    }

    /// Configure the reserved memory window buffers are drawn from.
    pub fn set_window(&mut self, window: DmaWindow) {
        self.window = Some(window);
    }

    /// How many more buffers the direction's FIFO can accept right now.
    pub fn acceptance(&self, direction: Direction) -> u32 {
        self.regs.read(direction.fifo_reg())
    }

    /// Submit one buffer to a queue, returning its completion marker.
    ///
    /// `len` must be `4096 << k` for `k <= 15` and the buffer must lie in
    /// the configured window at a 4096-byte-aligned physical address.
    /// Fails with [`PipeError::BackpressureExceeded`] when the FIFO
    /// reports zero acceptance; wait for acceptance before resubmitting
    /// rather than retrying blindly. Nothing is mutated on any failure.
    pub fn submit(
        &mut self,
        direction: Direction,
        buf: *const u8,
        len: usize,
        flags: SubmitFlags,
    ) -> Result<Marker> {
        let descriptor = self.encode_descriptor(buf, len, flags)?;
        if self.acceptance(direction) == 0 {
            return Err(PipeError::BackpressureExceeded { direction });
        }
        Ok(self.push_descriptor(direction, descriptor, len))
    }

    /// Submit a source buffer to the read queue and a destination buffer
    /// to the write queue as one transform-pipeline step.
    ///
    /// Both FIFOs must have acceptance before either descriptor is
    /// written; if only one side has capacity the whole call fails with
    /// [`PipeError::BackpressureExceeded`] and neither submission occurs.
    /// The destination side always requests a completion interrupt and the
    /// source side never does. Returns the write-queue marker.
    pub fn submit_read_write(
        &mut self,
        src: *const u8,
        src_len: usize,
        src_flags: SubmitFlags,
        dst: *const u8,
        dst_len: usize,
        dst_flags: SubmitFlags,
    ) -> Result<Marker> {
        let src_desc =
            self.encode_descriptor(src, src_len, src_flags - SubmitFlags::IRQ_ON_COMPLETE)?;
        let dst_desc =
            self.encode_descriptor(dst, dst_len, dst_flags | SubmitFlags::IRQ_ON_COMPLETE)?;
        for direction in [Direction::Read, Direction::Write] {
            if self.acceptance(direction) == 0 {
                return Err(PipeError::BackpressureExceeded { direction });
            }
        }
        self.push_descriptor(Direction::Read, src_desc, src_len);
        Ok(self.push_descriptor(Direction::Write, dst_desc, dst_len))
    }

    /// Whether the buffer identified by `marker` has been consumed by
    /// hardware.
    ///
    /// The hardware counter wraps at 16 bits; the comparison stays correct
    /// provided fewer than 32768 buffers are in flight between check and
    /// completion.
    pub fn is_completed(&self, direction: Direction, marker: Marker) -> bool {
        counter_reached(self.hw_completed(direction), marker)
    }

    /// Consume one interrupt notification, blocking up to `timeout`.
    ///
    /// A notification raised since the last consumption is taken by a
    /// non-blocking poll before re-arming and blocking, which closes the
    /// missed-wakeup window between a caller's completion check and the
    /// start of its wait. Returns `Ok(None)` on timeout.
    pub fn wait_for_interrupt(&mut self, timeout: Option<Duration>) -> Result<Option<u32>> {
        if let Some(events) = self.irq.wait(Some(Duration::ZERO))? {
            return Ok(Some(events));
        }
        self.irq.arm()?;
        self.irq.wait(timeout)
    }

    /// Block until `marker` completes or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout after logging the hardware state;
    /// an elapsed deadline is an expected condition and the caller decides
    /// whether to retry or abort.
    pub fn wait_completed(
        &mut self,
        direction: Direction,
        marker: Marker,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_completed(direction, marker) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    %direction,
                    %marker,
                    read_completed = self.hw_completed(Direction::Read),
                    write_completed = self.hw_completed(Direction::Write),
                    read_acceptance = self.acceptance(Direction::Read),
                    write_acceptance = self.acceptance(Direction::Write),
                    "timed out waiting for buffer completion"
                );
                return Ok(false);
            }
            self.wait_for_interrupt(Some(deadline - now))?;
        }
    }

    /// Drain queued notifications without blocking.
    ///
    /// Used during (re)initialization to discard stale interrupts left
    /// over from a previous session.
    pub fn clear_pending(&mut self) -> Result<()> {
        let mut drained = 0u64;
        while let Some(events) = self.irq.wait(Some(Duration::ZERO))? {
            drained += u64::from(events);
        }
        if drained > 0 {
            debug!(drained, "discarded stale interrupt events");
        }
        Ok(())
    }

    /// Register `callback` to run once `marker` completes.
    ///
    /// Read direction: if the marker is already complete the callback runs
    /// synchronously before this returns. The write direction has no such
    /// fast path; write completions always route through [`dispatch`].
    /// Queued callbacks fire from a later `dispatch` call, in ascending
    /// marker order per direction.
    ///
    /// There is no way to deregister a callback; entries still pending
    /// when the pipe is dropped are abandoned without being invoked.
    ///
    /// [`dispatch`]: DmaPipe::dispatch
    pub fn on_completion(
        &mut self,
        direction: Direction,
        marker: Marker,
        callback: impl FnOnce() + 'static,
    ) {
        if direction == Direction::Read && self.is_completed(direction, marker) {
            callback();
            return;
        }
        self.pending_mut(direction).insert(marker, Box::new(callback));
    }

    /// Deliver completed callbacks; call when the interrupt descriptor
    /// polls readable.
    ///
    /// Consumes exactly one notification, re-arms, then sweeps both
    /// directions until a full sweep fires nothing: one notification may
    /// stand for several completions, and an earlier un-drained
    /// notification may have covered more still. Callbacks run
    /// synchronously on the calling thread, lowest marker first per
    /// direction, and must not block. Never blocks itself; returns the
    /// number of callbacks fired.
    pub fn dispatch(&mut self) -> Result<usize> {
        self.irq.wait(Some(Duration::ZERO))?;
        self.irq.arm()?;

        let mut fired = 0usize;
        loop {
            let mut progressed = false;
            for direction in [Direction::Read, Direction::Write] {
                let completed = self.hw_completed(direction);
                while let Some((marker, callback)) = self
                    .pending_mut(direction)
                    .pop_if(|marker| counter_reached(completed, marker))
                {
                    trace!(%direction, %marker, "firing completion callback");
                    callback();
                    fired += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(fired)
    }

    fn hw_completed(&self, direction: Direction) -> u16 {
        self.regs.read(direction.completed_reg()) as u16
    }

    fn pending_mut(&mut self, direction: Direction) -> &mut PendingCallbacks {
        match direction {
            Direction::Read => &mut self.pending_read,
            Direction::Write => &mut self.pending_write,
        }
    }

    fn encode_descriptor(&self, buf: *const u8, len: usize, flags: SubmitFlags) -> Result<u32> {
        let window = self.window.ok_or(PipeError::WindowNotConfigured)?;
        let order = size_order(len)?;
        let phys = window.translate_range(buf, len)?;
        if phys as usize % MIN_BUFFER_LEN != 0 {
            return Err(PipeError::UnalignedBuffer { phys });
        }
        Ok(phys | (flags.bits() << 4) | order)
    }

    fn push_descriptor(&mut self, direction: Direction, descriptor: u32, len: usize) -> Marker {
        self.regs.write(direction.fifo_reg(), descriptor);
        let counter = match direction {
            Direction::Read => &mut self.buffers_read,
            Direction::Write => &mut self.buffers_written,
        };
        *counter = counter.wrapping_add(1);
        let marker = Marker(*counter);
        trace!(%direction, %marker, len, descriptor, "submitted buffer");
        marker
    }
}

fn size_order(len: usize) -> Result<u32> {
    if !len.is_power_of_two() || len < MIN_BUFFER_LEN {
        return Err(PipeError::InvalidLength { len });
    }
    let order = len.trailing_zeros() - MIN_BUFFER_LEN.trailing_zeros();
    if order > MAX_SIZE_ORDER {
        return Err(PipeError::InvalidLength { len });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_order_accepts_powers_of_two_times_4096() {
        assert_eq!(size_order(4096).unwrap(), 0);
        assert_eq!(size_order(8192).unwrap(), 1);
        assert_eq!(size_order(4096 << 15).unwrap(), 15);
    }

    #[test]
    fn size_order_rejects_everything_else() {
        for len in [0usize, 1, 2048, 4095, 4097, 12288, 4096 << 16] {
            assert!(matches!(
                size_order(len),
                Err(PipeError::InvalidLength { .. })
            ));
        }
    }
}
