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

use std::ops::RangeInclusive;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::instruction::ControlInstruction;
use crate::logger;
use crate::probe::{ControlAddress, ControlError, ProbePort};

/// Builds the axis catalog for one device by sweeping the (unit, selector)
/// address space and keeping every address that introspects as a real,
/// writable control.
pub struct Scanner {
    units: RangeInclusive<u8>,
    selectors: RangeInclusive<u8>,
}

impl Default for Scanner {
    fn default() -> Self {
        // selector 0 is the control-undefined slot in every extension unit,
        // never a real control
        Self {
            units: 0..=u8::MAX,
            selectors: 1..=u8::MAX,
        }
    }
}

impl Scanner {
    pub fn new(units: RangeInclusive<u8>, selectors: RangeInclusive<u8>) -> Self {
        Self { units, selectors }
    }

    /// Sweep the configured ranges. Addresses that fail introspection are
    /// dropped; a device-level fault aborts the sweep. Cancellation stops the
    /// sweep between addresses and returns whatever was found so far.
    pub fn scan(
        &self,
        port: &mut dyn ProbePort,
        cancel: &CancelToken,
    ) -> Result<Vec<ControlInstruction>, ControlError> {
        let mut catalog = Vec::new();
        for unit in self.units.clone() {
            for selector in self.selectors.clone() {
                if cancel.is_requested() {
                    logger::log_event("scan_cancelled", json!({ "found": catalog.len() }));
                    return Ok(catalog);
                }
                let addr = ControlAddress::new(unit, selector);
                match ControlInstruction::from_probe(port, addr) {
                    Ok(instruction) => {
                        logger::log_event(
                            "scan_hit",
                            json!({
                                "unit": unit,
                                "selector": selector,
                                "len": instruction.current().len(),
                            }),
                        );
                        catalog.push(instruction);
                    }
                    Err(ControlError::AddressInvalid { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        logger::log_event("scan_done", json!({ "found": catalog.len() }));
        Ok(catalog)
    }
}
