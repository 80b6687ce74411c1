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

use serde::{Deserialize, Serialize};

use crate::probe::{ControlAddress, ControlError, ProbePort, QueryKind};

/// Search outcome recorded on one control, persisted across runs.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    /// Confirmed to fire the emitter at its current value. Terminal success.
    Start,
    /// Not yet evaluated, or evaluated without a conclusive trigger.
    Idle,
    /// Caused a device fault while probing. Terminal; excluded from all
    /// future operations and future runs.
    Disable,
}

/// One addressable control axis: an ordered byte vector with known bounds and
/// the state needed to walk its value space.
///
/// `max`/`min` empty means the bound is unknown: an unknown max is treated as
/// 255 in every position, an unknown min means there is no distinguished
/// minimum to start a walk from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInstruction {
    address: ControlAddress,
    current: Vec<u8>,
    initial: Vec<u8>,
    max: Vec<u8>,
    min: Vec<u8>,
    lifecycle: Lifecycle,
    /// Next byte position `next()` will attempt to increment. Saved across
    /// calls so a carry chain resumes where the previous one stopped instead
    /// of rescanning from position 0 and double-incrementing low positions.
    cursor: usize,
}

impl ControlInstruction {
    /// Introspect one address through the probe port.
    ///
    /// The fetched current value is immediately written back: a control we
    /// cannot write is useless for probing and gets rejected here, before the
    /// search ever sees it. Missing max/min bounds are tolerated and left
    /// empty.
    pub fn from_probe(
        port: &mut dyn ProbePort,
        address: ControlAddress,
    ) -> Result<Self, ControlError> {
        let len = port.query_length(address)?;
        if len == 0 {
            return Err(ControlError::address_invalid(address, "zero-length control"));
        }
        let current = port
            .get(QueryKind::Current, address)
            .map_err(|e| ControlError::address_invalid(address, format!("unreadable: {}", e)))?;
        if current.len() != len as usize {
            return Err(ControlError::address_invalid(address, "length mismatch"));
        }
        if !port.set(address, &current) {
            return Err(ControlError::address_invalid(address, "not writable"));
        }
        let max = match port.get(QueryKind::Max, address) {
            Ok(v) if v.len() == current.len() => v,
            _ => Vec::new(),
        };
        let min = match port.get(QueryKind::Min, address) {
            Ok(v) if v.len() == current.len() => v,
            _ => Vec::new(),
        };
        let initial = current.clone();
        Ok(Self {
            address,
            current,
            initial,
            max,
            min,
            lifecycle: Lifecycle::Idle,
            cursor: 0,
        })
    }

    /// Rehydrate an axis from persisted fields without touching the device.
    pub fn from_saved(
        address: ControlAddress,
        current: Vec<u8>,
        initial: Vec<u8>,
        max: Vec<u8>,
        min: Vec<u8>,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            address,
            current,
            initial,
            max,
            min,
            lifecycle,
            cursor: 0,
        }
    }

    pub fn address(&self) -> ControlAddress {
        self.address
    }

    pub fn current(&self) -> &[u8] {
        &self.current
    }

    pub fn initial(&self) -> &[u8] {
        &self.initial
    }

    pub fn max(&self) -> &[u8] {
        &self.max
    }

    pub fn min(&self) -> &[u8] {
        &self.min
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn mark_start(&mut self) {
        self.lifecycle = Lifecycle::Start;
    }

    pub fn mark_disable(&mut self) {
        self.lifecycle = Lifecycle::Disable;
    }

    fn ensure_enabled(&self) -> Result<(), ControlError> {
        if self.lifecycle == Lifecycle::Disable {
            return Err(ControlError::Disabled);
        }
        Ok(())
    }

    fn ceiling(&self, pos: usize) -> u8 {
        self.max.get(pos).copied().unwrap_or(u8::MAX)
    }

    /// Replace `current` with an operator-chosen value.
    ///
    /// Rejected (returning false, leaving `current` untouched) when the
    /// length differs or any byte falls outside a known bound. Manual values
    /// are how an operator reaches combinations the automatic walk skips.
    pub fn set_cur(&mut self, value: &[u8]) -> Result<bool, ControlError> {
        self.ensure_enabled()?;
        if value.len() != self.current.len() {
            return Ok(false);
        }
        for (i, &b) in value.iter().enumerate() {
            if !self.max.is_empty() && b > self.max[i] {
                return Ok(false);
            }
            if !self.min.is_empty() && b < self.min[i] {
                return Ok(false);
            }
        }
        self.current = value.to_vec();
        self.cursor = 0;
        Ok(true)
    }

    /// Place `current` at the known minimum. Returns false when no minimum
    /// is known.
    pub fn set_min_cur(&mut self) -> Result<bool, ControlError> {
        self.ensure_enabled()?;
        if self.min.is_empty() {
            return Ok(false);
        }
        self.current = self.min.clone();
        self.cursor = 0;
        Ok(true)
    }

    /// Place `current` at the maximum: the known max when one exists, else
    /// 255 in every position.
    pub fn set_max_cur(&mut self) -> Result<bool, ControlError> {
        self.ensure_enabled()?;
        if self.max.is_empty() {
            self.current = vec![u8::MAX; self.current.len()];
        } else {
            self.current = self.max.clone();
        }
        self.cursor = 0;
        Ok(true)
    }

    /// Restore `current` to the value the control held when first seen.
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.ensure_enabled()?;
        self.current = self.initial.clone();
        self.cursor = 0;
        Ok(())
    }

    /// Advance `current` to the next point of the bounded walk.
    ///
    /// The vector is treated as a mixed-radix counter with position 0 least
    /// significant: the position under the cursor is incremented; a position
    /// at its ceiling wraps back to its initial byte (not to zero, keeping
    /// the device baseline) and carries into the next position. Returns false
    /// once the carry runs off the end, leaving `current` untouched.
    ///
    /// This is deliberately not a full Cartesian sweep: 256^n values is
    /// unreachable for multi-byte controls, so the walk covers each position
    /// exhaustively and combinations only as carries happen to produce them.
    pub fn next(&mut self) -> Result<bool, ControlError> {
        self.ensure_enabled()?;
        let mut staged = self.current.clone();
        let mut pos = self.cursor;
        while pos < staged.len() {
            if staged[pos] >= self.ceiling(pos) {
                staged[pos] = self.initial[pos];
                pos += 1;
                continue;
            }
            staged[pos] += 1;
            self.current = staged;
            self.cursor = pos;
            return Ok(true);
        }
        Ok(false)
    }
}
