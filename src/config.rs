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

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::instruction::{ControlInstruction, Lifecycle};
use crate::probe::ControlAddress;

/// One persisted axis. `initial` is omitted when it equals `current`;
/// `max`/`min` are omitted when the bound is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAxis {
    pub unit: u8,
    pub selector: u8,
    pub current: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub max: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub min: Vec<u8>,
    pub lifecycle: Lifecycle,
}

impl SavedAxis {
    pub fn from_instruction(instruction: &ControlInstruction) -> Self {
        let addr = instruction.address();
        let initial = if instruction.initial() == instruction.current() {
            None
        } else {
            Some(instruction.initial().to_vec())
        };
        Self {
            unit: addr.unit,
            selector: addr.selector,
            current: instruction.current().to_vec(),
            initial,
            max: instruction.max().to_vec(),
            min: instruction.min().to_vec(),
            lifecycle: instruction.lifecycle(),
        }
    }

    pub fn to_instruction(&self) -> ControlInstruction {
        let initial = self.initial.clone().unwrap_or_else(|| self.current.clone());
        ControlInstruction::from_saved(
            ControlAddress::new(self.unit, self.selector),
            self.current.clone(),
            initial,
            self.max.clone(),
            self.min.clone(),
            self.lifecycle,
        )
    }
}

/// Durable search state, keyed by device identity. Loaded before a run
/// (absent file means an empty catalog and a fresh sweep) and saved after
/// every run regardless of outcome.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedState {
    #[serde(default)]
    pub devices: HashMap<String, Vec<SavedAxis>>,
}

impl SavedState {
    pub fn catalog_for(&self, device_key: &str) -> Vec<ControlInstruction> {
        self.devices
            .get(device_key)
            .map(|axes| axes.iter().map(SavedAxis::to_instruction).collect())
            .unwrap_or_default()
    }

    pub fn store_catalog(&mut self, device_key: &str, catalog: &[ControlInstruction]) {
        self.devices.insert(
            device_key.to_string(),
            catalog.iter().map(SavedAxis::from_instruction).collect(),
        );
    }
}

/// Stable identity for a device node, resilient to symlinked paths like
/// /dev/v4l/by-id/...
pub fn device_key(device: &str) -> String {
    fs::canonicalize(device)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| device.to_string())
}

pub fn state_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("irscout").join("state.json");
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("irscout")
            .join("state.json");
    }
    PathBuf::from("/etc/irscout/state.json")
}

pub fn load_state_from(path: &Path) -> Option<SavedState> {
    let data = fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn load_state() -> Option<SavedState> {
    load_state_from(&state_path())
}

pub fn save_state_to(path: &Path, state: &SavedState) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let json = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
    fs::write(path, json)
}

pub fn save_state(state: &SavedState) -> io::Result<()> {
    save_state_to(&state_path(), state)
}

const MAX_DEVICES: usize = 256;
const MAX_AXES_PER_DEVICE: usize = 65_536;
const MAX_VALUE_LEN: usize = 64;

pub fn validate_state(state: &SavedState) -> Result<(), String> {
    if state.devices.len() > MAX_DEVICES {
        return Err(format!("too many devices (max {})", MAX_DEVICES));
    }
    for (key, axes) in &state.devices {
        if key.is_empty() || key.len() > 256 {
            return Err("invalid device key".to_string());
        }
        if axes.len() > MAX_AXES_PER_DEVICE {
            return Err(format!(
                "too many axes for {} (max {})",
                key, MAX_AXES_PER_DEVICE
            ));
        }
        for (i, axis) in axes.iter().enumerate() {
            let len = axis.current.len();
            if len == 0 || len > MAX_VALUE_LEN {
                return Err(format!("axis #{} of {} has a bad value length", i + 1, key));
            }
            if let Some(initial) = &axis.initial {
                if initial.len() != len {
                    return Err(format!("axis #{} of {}: initial length mismatch", i + 1, key));
                }
            }
            if !axis.max.is_empty() && axis.max.len() != len {
                return Err(format!("axis #{} of {}: max length mismatch", i + 1, key));
            }
            if !axis.min.is_empty() && axis.min.len() != len {
                return Err(format!("axis #{} of {}: min length mismatch", i + 1, key));
            }
        }
    }
    Ok(())
}
