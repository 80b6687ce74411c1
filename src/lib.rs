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

//! Irscout - IR emitter discovery for UVC cameras
//!
//! This library probes a camera's extension-unit control space to find the
//! control value(s) that switch on an infrared illuminator, using only the
//! visible response of the emitter as feedback.

pub mod cancel;
pub mod camera;
pub mod config;
pub mod finder;
pub mod instruction;
pub mod logger;
pub mod probe;
pub mod scanner;
pub mod uvc;
