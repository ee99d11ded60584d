#![allow(dead_code)]

//! Fake pipe hardware shared by the integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use dmapipe::regs::{REG_BUFS_READ, REG_BUFS_WRITTEN, REG_READ_ACCEPT, REG_WRITE_ACCEPT};
use dmapipe::{DmaPipe, DmaWindow, IrqEvents, PipeRegisters, Result};

pub const WINDOW_LEN: usize = 1 << 20;
pub const PHYS_BASE: u32 = 0x1000_0000;

/// One interrupt notification. Consuming it applies the counter updates
/// the notification stands for.
pub struct Event {
    pub count: u32,
    pub bufs_read: Option<u16>,
    pub bufs_written: Option<u16>,
}

impl Event {
    pub fn plain(count: u32) -> Self {
        Self {
            count,
            bufs_read: None,
            bufs_written: None,
        }
    }

    pub fn written(completed: u16) -> Self {
        Self {
            count: 1,
            bufs_read: None,
            bufs_written: Some(completed),
        }
    }

    pub fn read(completed: u16) -> Self {
        Self {
            count: 1,
            bufs_read: Some(completed),
            bufs_written: None,
        }
    }
}

#[derive(Default)]
pub struct HwState {
    pub read_accept: u32,
    pub write_accept: u32,
    pub bufs_read: u16,
    pub bufs_written: u16,
    /// Descriptor words written to each FIFO port, in order.
    pub read_fifo: Vec<u32>,
    pub write_fifo: Vec<u32>,
    /// Notifications already delivered (the descriptor polls readable).
    pub events: VecDeque<Event>,
    /// Notifications waiting for an enable token before delivery.
    pub latent: VecDeque<Event>,
    /// Number of enable tokens written.
    pub armed: u32,
}

pub struct FakeRegisters(pub Rc<RefCell<HwState>>);

impl PipeRegisters for FakeRegisters {
    fn read(&self, offset: usize) -> u32 {
        let hw = self.0.borrow();
        match offset {
            REG_READ_ACCEPT => hw.read_accept,
            REG_WRITE_ACCEPT => hw.write_accept,
            REG_BUFS_READ => u32::from(hw.bufs_read),
            REG_BUFS_WRITTEN => u32::from(hw.bufs_written),
            _ => panic!("read of unknown register {offset:#x}"),
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        let mut hw = self.0.borrow_mut();
        match offset {
            REG_READ_ACCEPT => {
                assert!(hw.read_accept > 0, "read submission with zero acceptance");
                hw.read_accept -= 1;
                hw.read_fifo.push(value);
            }
            REG_WRITE_ACCEPT => {
                assert!(hw.write_accept > 0, "write submission with zero acceptance");
                hw.write_accept -= 1;
                hw.write_fifo.push(value);
            }
            _ => panic!("write to read-only register {offset:#x}"),
        }
    }
}

/// Edge-triggered fake: latent notifications become deliverable one per
/// enable token, the way the hardware line is re-enabled per event.
pub struct FakeIrq(pub Rc<RefCell<HwState>>);

impl IrqEvents for FakeIrq {
    fn arm(&mut self) -> Result<()> {
        let mut hw = self.0.borrow_mut();
        hw.armed += 1;
        if let Some(event) = hw.latent.pop_front() {
            hw.events.push_back(event);
        }
        Ok(())
    }

    fn wait(&mut self, _timeout: Option<Duration>) -> Result<Option<u32>> {
        let mut hw = self.0.borrow_mut();
        match hw.events.pop_front() {
            Some(event) => {
                if let Some(count) = event.bufs_read {
                    hw.bufs_read = count;
                }
                if let Some(count) = event.bufs_written {
                    hw.bufs_written = count;
                }
                Ok(Some(event.count))
            }
            None => Ok(None),
        }
    }
}

/// A pipe over fake hardware plus the backing memory its window borrows.
pub struct TestPipe {
    pub hw: Rc<RefCell<HwState>>,
    pub pipe: DmaPipe,
    backing: Vec<u8>,
}

impl TestPipe {
    pub fn new() -> Self {
        Self::with_state(HwState {
            read_accept: 8,
            write_accept: 8,
            ..HwState::default()
        })
    }

    pub fn with_state(state: HwState) -> Self {
        let hw = Rc::new(RefCell::new(state));
        let mut pipe = DmaPipe::new(
            Box::new(FakeRegisters(hw.clone())),
            Box::new(FakeIrq(hw.clone())),
        );
        let backing = vec![0u8; WINDOW_LEN];
        pipe.set_window(unsafe { DmaWindow::new(backing.as_ptr(), WINDOW_LEN, PHYS_BASE) });
        Self { hw, pipe, backing }
    }

    /// Pointer `page` 4096-byte pages into the window.
    pub fn buf(&self, page: usize) -> *const u8 {
        assert!(page * 4096 < WINDOW_LEN);
        unsafe { self.backing.as_ptr().add(page * 4096) }
    }

    /// Pointer `bytes` into the window (for intentionally unaligned buffers).
    pub fn buf_at_offset(&self, bytes: usize) -> *const u8 {
        assert!(bytes < WINDOW_LEN);
        unsafe { self.backing.as_ptr().add(bytes) }
    }
}
