//! Linux `/dev/i2c-N` bus
//!
//! Combined write-then-read transactions go through the `I2C_RDWR` ioctl, so
//! the kernel issues a repeated start between the two messages. Userspace has
//! no access to the device's interrupt, so devices on this bus are polled.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use iichid_transport::{I2cBus, TransportError};
use tracing::debug;

// From linux/i2c-dev.h and linux/i2c.h
const I2C_RDWR: libc::c_ulong = 0x0707;
const I2C_FUNCS: libc::c_ulong = 0x0705;
const I2C_M_RD: u16 = 0x0001;
const I2C_FUNC_I2C: libc::c_ulong = 0x0000_0001;

#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// An i2c-dev character device
#[derive(Debug, Clone)]
pub struct LinuxI2cBus {
    path: PathBuf,
    file: Arc<File>,
}

impl LinuxI2cBus {
    /// Open the adapter and check it can do plain I2C transfers.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| TransportError::NotFound(format!("{}: {}", path.display(), e)))?;

        let mut funcs: libc::c_ulong = 0;
        // SAFETY: I2C_FUNCS writes one c_ulong through the pointer
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_FUNCS, &mut funcs as *mut libc::c_ulong) };
        if ret < 0 {
            return Err(TransportError::Io(format!(
                "I2C_FUNCS on {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }
        if funcs & I2C_FUNC_I2C == 0 {
            return Err(TransportError::ResourceUnavailable(format!(
                "{} cannot do combined transfers",
                path.display()
            )));
        }
        debug!("Opened {} (funcs 0x{:08x})", path.display(), funcs);

        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn transfer_blocking(
    file: &File,
    address: u16,
    write: &[u8],
    read_len: usize,
) -> Result<Vec<u8>, TransportError> {
    let write_len = u16::try_from(write.len())
        .map_err(|_| TransportError::Io(format!("write of {} bytes too long", write.len())))?;
    let read_len16 = u16::try_from(read_len)
        .map_err(|_| TransportError::Io(format!("read of {read_len} bytes too long")))?;

    let mut wbuf = write.to_vec();
    let mut rbuf = vec![0u8; read_len];
    let mut msgs = [
        I2cMsg {
            addr: address,
            flags: 0,
            len: write_len,
            buf: wbuf.as_mut_ptr(),
        },
        I2cMsg {
            addr: address,
            flags: I2C_M_RD,
            len: read_len16,
            buf: rbuf.as_mut_ptr(),
        },
    ];
    let mut data = I2cRdwrIoctlData {
        msgs: msgs.as_mut_ptr(),
        nmsgs: msgs.len() as u32,
    };

    // SAFETY: both buffers outlive the call and match the lengths in msgs
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_RDWR, &mut data as *mut I2cRdwrIoctlData) };
    if ret < 0 {
        return Err(TransportError::Io(format!(
            "I2C_RDWR at 0x{:02x}: {}",
            address,
            std::io::Error::last_os_error()
        )));
    }
    Ok(rbuf)
}

#[async_trait]
impl I2cBus for LinuxI2cBus {
    async fn transfer(
        &self,
        address: u16,
        write: &[u8],
        read_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let file = self.file.clone();
        let write = write.to_vec();
        tokio::task::spawn_blocking(move || transfer_blocking(&file, address, &write, read_len))
            .await
            .map_err(|e| TransportError::Internal(format!("transfer task failed: {e}")))?
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}
