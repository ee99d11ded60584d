//! Linux backend for `dmapipe`: maps the pipe's register block through
//! `/dev/mem` and drives a UIO-style interrupt device.
//!
//! The interrupt device follows the write-to-arm / read-event-count
//! protocol: writing a 4-byte enable count re-enables delivery, the fd
//! polls readable when a notification is pending, and reading consumes it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use dmapipe::{DmaPipe, IrqEvents, MappedRegisters, PipeError, Result};

/// Map the pipe's register window at physical address `phys_addr`.
pub fn map_registers(phys_addr: u64) -> Result<MappedRegisters> {
    let fd = unsafe {
        libc::open(
            b"/dev/mem\0".as_ptr().cast(),
            libc::O_RDWR | libc::O_SYNC,
        )
    };
    if fd < 0 {
        return Err(device_unavailable("/dev/mem"));
    }
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            dmapipe::regs::REGS_LEN,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            phys_addr as libc::off_t,
        )
    };
    let mmap_err = io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if base == libc::MAP_FAILED {
        return Err(PipeError::DeviceUnavailable {
            device: "pipe register window".to_string(),
            source: mmap_err,
        });
    }
    debug!(phys_addr, "mapped pipe register window");
    Ok(unsafe { MappedRegisters::new(base.cast()) })
}

fn device_unavailable(device: &str) -> PipeError {
    PipeError::DeviceUnavailable {
        device: device.to_string(),
        source: io::Error::last_os_error(),
    }
}

/// A UIO-style interrupt device implementing [`IrqEvents`].
#[derive(Debug)]
pub struct UioIrq {
    device: File,
}

impl UioIrq {
    /// Open the interrupt device at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| PipeError::DeviceUnavailable {
                device: path.display().to_string(),
                source,
            })?;
        Ok(Self { device })
    }

    /// Wrap an already-open interrupt descriptor.
    pub fn from_device(device: File) -> Self {
        Self { device }
    }
}

impl IrqEvents for UioIrq {
    fn arm(&mut self) -> Result<()> {
        self.device.write_all(&1u32.to_ne_bytes())?;
        Ok(())
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<u32>> {
        let millis: libc::c_int = match timeout {
            None => -1,
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        let mut pollfd = libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = loop {
            let rc = unsafe { libc::poll(&mut pollfd, 1, millis) };
            if rc >= 0 {
                break rc;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        };
        if ready == 0 {
            return Ok(None);
        }
        let mut count = [0u8; 4];
        self.device.read_exact(&mut count)?;
        Ok(Some(u32::from_ne_bytes(count)))
    }
}

/// Map the register window at `phys_addr`, open the interrupt device at
/// `irq_path`, and attach a [`DmaPipe`] to them.
pub fn open_pipe(phys_addr: u64, irq_path: impl AsRef<Path>) -> Result<DmaPipe> {
    let regs = map_registers(phys_addr)?;
    let irq = UioIrq::open(irq_path)?;
    Ok(DmaPipe::new(Box::new(regs), Box::new(irq)))
}
