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

use std::fmt;
use std::io;

use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Identifies one extension-unit control on a device: the unit id assigned by
/// the camera firmware and the control selector within that unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlAddress {
    pub unit: u8,
    pub selector: u8,
}

impl ControlAddress {
    pub fn new(unit: u8, selector: u8) -> Self {
        Self { unit, selector }
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.selector)
    }
}

/// Which of a control's value vectors a GET query fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Current,
    Max,
    Min,
}

#[derive(Error, Debug)]
pub enum ControlError {
    /// The address does not correspond to a usable control. Recoverable:
    /// callers skip the address and move on.
    #[error("control {unit}:{selector} is not usable: {reason}")]
    AddressInvalid { unit: u8, selector: u8, reason: String },
    /// A mutating operation reached a control marked disabled. The finder
    /// filters disabled controls up front, so hitting this is a contract
    /// violation in the caller.
    #[error("operation attempted on a disabled control")]
    Disabled,
    /// The device stopped answering and could not be put back into a known
    /// state. Fatal for the whole run; the device likely needs a power cycle.
    #[error("device unresponsive at control {unit}:{selector}: {reason}")]
    DeviceFault { unit: u8, selector: u8, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ControlError {
    pub fn address_invalid(addr: ControlAddress, reason: impl Into<String>) -> Self {
        ControlError::AddressInvalid {
            unit: addr.unit,
            selector: addr.selector,
            reason: reason.into(),
        }
    }

    pub fn device_fault(addr: ControlAddress, reason: impl Into<String>) -> Self {
        ControlError::DeviceFault {
            unit: addr.unit,
            selector: addr.selector,
            reason: reason.into(),
        }
    }

}

/// Device I/O boundary consumed by the scanner and the finder.
///
/// A probe port answers value queries for one camera and performs one effect
/// observation per probe. Queries are strictly sequential; the port is the
/// only writer of device state while a search runs.
#[cfg_attr(test, automock)]
pub trait ProbePort {
    /// Byte length of the control's value vector. Zero means the address does
    /// not correspond to a control.
    fn query_length(&mut self, addr: ControlAddress) -> Result<u16, ControlError>;

    /// Fetch the current, max, or min value vector of a control.
    fn get(&mut self, kind: QueryKind, addr: ControlAddress) -> Result<Vec<u8>, ControlError>;

    /// Apply a whole value vector to a control. A rejected write is a normal
    /// outcome, not an error.
    fn set(&mut self, addr: ControlAddress, value: &[u8]) -> bool;

    /// Block until a decision is available on whether the emitter fired in
    /// response to the value applied last. Observation concurrency (frame
    /// capture, operator prompting) lives behind this call.
    fn observe_effect(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_address_display() {
        assert_eq!(format!("{}", ControlAddress::new(4, 9)), "4:9");
        assert_eq!(format!("{}", ControlAddress::new(255, 0)), "255:0");
    }

    #[test]
    fn test_control_error_display() {
        let invalid = ControlError::address_invalid(ControlAddress::new(3, 1), "zero-length");
        assert_eq!(
            format!("{}", invalid),
            "control 3:1 is not usable: zero-length"
        );

        let disabled = ControlError::Disabled;
        assert_eq!(
            format!("{}", disabled),
            "operation attempted on a disabled control"
        );

        let fault = ControlError::device_fault(ControlAddress::new(3, 2), "restore failed");
        assert!(format!("{}", fault).contains("device unresponsive at control 3:2"));
    }

    #[test]
    fn test_control_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "test");
        let err: ControlError = io_err.into();
        assert!(matches!(err, ControlError::Io(_)));
    }

    #[test]
    fn test_mock_probe_port_expectations() {
        let mut port = MockProbePort::new();
        port.expect_query_length()
            .withf(|addr| addr.unit == 2 && addr.selector == 5)
            .returning(|_| Ok(3));
        port.expect_set().returning(|_, _| true);
        assert_eq!(port.query_length(ControlAddress::new(2, 5)).unwrap(), 3);
        assert!(port.set(ControlAddress::new(2, 5), &[0, 0, 0]));
    }
}
