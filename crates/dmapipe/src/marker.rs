//! Queue directions and completion markers.

use std::fmt;

use crate::regs::{REG_BUFS_READ, REG_BUFS_WRITTEN, REG_READ_ACCEPT, REG_WRITE_ACCEPT};

/// Which of the pipe's two hardware queues a buffer belongs to.
///
/// The queues are numbered and tracked independently; nothing orders a read
/// completion against a write completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// FIFO register: acceptance count on read, descriptor port on write.
    pub(crate) fn fifo_reg(self) -> usize {
        match self {
            Direction::Read => REG_READ_ACCEPT,
            Direction::Write => REG_WRITE_ACCEPT,
        }
    }

    /// Completed-buffer counter register for this queue.
    pub(crate) fn completed_reg(self) -> usize {
        match self {
            Direction::Read => REG_BUFS_READ,
            Direction::Write => REG_BUFS_WRITTEN,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "read",
            Direction::Write => "write",
        })
    }
}

/// Completion point of one submitted buffer.
///
/// The marker returned by the Nth submission on a queue is the queue's
/// submission count after that submission; markers increase monotonically
/// per direction for the lifetime of the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Marker(pub(crate) u32);

impl Marker {
    /// The raw sequence number.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Whether a wrapping 16-bit completion counter has reached `marker`.
///
/// The hardware only reports the low 16 bits of its completed-buffer
/// count, so the comparison is a signed 16-bit difference. This
/// classifies correctly across wraparound as long as fewer than 32768
/// buffers separate the marker from the hardware counter; that bound is
/// a hard limit of the design.
pub(crate) fn counter_reached(hw_count: u16, marker: Marker) -> bool {
    (hw_count.wrapping_sub(marker.0 as u16) as i16) >= 0
}
