/*
 * This file is part of Irscout.
 *
 * Copyright (C) 2026 Irscout contributors
 *
 * Irscout is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Irscout is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Irscout. If not, see <https://www.gnu.org/licenses/>.
 */

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use serde_json::json;

use crate::camera::EffectObserver;
use crate::logger;
use crate::probe::{ControlAddress, ControlError, ProbePort, QueryKind};

// UVC class-specific request codes (UVC 1.1, §4.2.1).
const UVC_SET_CUR: u8 = 0x01;
const UVC_GET_CUR: u8 = 0x81;
const UVC_GET_MIN: u8 = 0x82;
const UVC_GET_MAX: u8 = 0x83;
const UVC_GET_LEN: u8 = 0x85;

/// Mirror of the kernel's `struct uvc_xu_control_query` (uvcvideo.h).
#[repr(C)]
struct UvcXuControlQuery {
    unit: u8,
    selector: u8,
    query: u8,
    size: u16,
    data: *mut u8,
}

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ: libc::c_ulong = 2;

const fn ioc(dir: libc::c_ulong, ty: u8, nr: u8, size: usize) -> libc::c_ulong {
    (dir << 30) | ((size as libc::c_ulong) << 16) | ((ty as libc::c_ulong) << 8) | (nr as libc::c_ulong)
}

// _IOWR('u', 0x21, struct uvc_xu_control_query)
const UVCIOC_CTRL_QUERY: libc::c_ulong = ioc(
    IOC_READ | IOC_WRITE,
    b'u',
    0x21,
    std::mem::size_of::<UvcXuControlQuery>(),
);

/// Probe port over a real camera: extension-unit queries through
/// `UVCIOC_CTRL_QUERY` on a `/dev/videoN` node, effect observation delegated
/// to the observer chosen at construction time.
pub struct UvcProbePort {
    fd: RawFd,
    device: String,
    observer: Box<dyn EffectObserver>,
}

impl UvcProbePort {
    pub fn open(device: &str, observer: Box<dyn EffectObserver>) -> io::Result<Self> {
        let path = CString::new(device)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "device path has NUL"))?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd,
            device: device.to_string(),
            observer,
        })
    }

    fn query(&self, addr: ControlAddress, code: u8, data: &mut [u8]) -> io::Result<()> {
        let mut q = UvcXuControlQuery {
            unit: addr.unit,
            selector: addr.selector,
            query: code,
            size: data.len() as u16,
            data: data.as_mut_ptr(),
        };
        let rc = unsafe { libc::ioctl(self.fd, UVCIOC_CTRL_QUERY, &mut q) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn value_length(&self, addr: ControlAddress) -> io::Result<u16> {
        // GET_LEN answers a 16-bit little-endian byte count
        let mut buf = [0u8; 2];
        self.query(addr, UVC_GET_LEN, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// A vanished device node is a device-level fault; everything else just
    /// marks the one address as unusable.
    fn classify(addr: ControlAddress, err: io::Error) -> ControlError {
        if err.raw_os_error() == Some(libc::ENODEV) {
            ControlError::device_fault(addr, err.to_string())
        } else {
            ControlError::address_invalid(addr, err.to_string())
        }
    }
}

impl ProbePort for UvcProbePort {
    fn query_length(&mut self, addr: ControlAddress) -> Result<u16, ControlError> {
        self.value_length(addr).map_err(|e| Self::classify(addr, e))
    }

    fn get(&mut self, kind: QueryKind, addr: ControlAddress) -> Result<Vec<u8>, ControlError> {
        let len = self.value_length(addr).map_err(|e| Self::classify(addr, e))?;
        if len == 0 {
            return Err(ControlError::address_invalid(addr, "zero-length control"));
        }
        let code = match kind {
            QueryKind::Current => UVC_GET_CUR,
            QueryKind::Max => UVC_GET_MAX,
            QueryKind::Min => UVC_GET_MIN,
        };
        let mut buf = vec![0u8; len as usize];
        self.query(addr, code, &mut buf)
            .map_err(|e| Self::classify(addr, e))?;
        Ok(buf)
    }

    fn set(&mut self, addr: ControlAddress, value: &[u8]) -> bool {
        let mut buf = value.to_vec();
        let ok = self.query(addr, UVC_SET_CUR, &mut buf).is_ok();
        logger::log_event(
            "xu_set",
            json!({
                "device": self.device,
                "unit": addr.unit,
                "selector": addr.selector,
                "value": value,
                "ok": ok,
            }),
        );
        ok
    }

    fn observe_effect(&mut self) -> bool {
        self.observer.observe()
    }
}

impl Drop for UvcProbePort {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
