//! The pipe's interrupt notification channel.

use std::time::Duration;

use crate::error::Result;

/// Edge-triggered interrupt delivery with an explicit re-enable.
///
/// The hardware raises one notification per enable token: after a
/// notification is consumed the channel stays silent until [`arm`] is
/// called again. A single notification may stand for several buffer
/// completions; the event count says how many delivery events were
/// coalesced, not how many buffers finished.
///
/// [`arm`]: IrqEvents::arm
pub trait IrqEvents {
    /// Write the enable token, re-enabling delivery of the next
    /// notification.
    fn arm(&mut self) -> Result<()>;

    /// Consume a pending notification, returning its event count.
    ///
    /// Blocks up to `timeout` (`None` blocks indefinitely,
    /// `Some(Duration::ZERO)` polls without blocking) and returns
    /// `Ok(None)` if no notification arrived in time.
    fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<u32>>;
}
