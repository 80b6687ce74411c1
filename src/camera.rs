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
use std::io::{self, BufRead, Write};
use std::os::unix::io::RawFd;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;

/// Decides whether the emitter fired in response to the probe that just ran.
///
/// The detection strategy is deliberately pluggable: the manual observer
/// defers to a human watching the scene, the automatic one thresholds frame
/// intensity. Which one a probe port carries is chosen at construction time.
pub trait EffectObserver {
    fn observe(&mut self) -> bool;
}

/// Asks the operator. Blocks the search loop on a single-key answer.
pub struct ManualObserver;

impl EffectObserver for ManualObserver {
    fn observe(&mut self) -> bool {
        eprint!("did the emitter fire? [y/N] ");
        let _ = io::stderr().flush();
        let fired = read_key_confirm();
        eprintln!("{}", if fired { "y" } else { "n" });
        fired
    }
}

fn read_key_confirm() -> bool {
    if terminal::enable_raw_mode().is_err() {
        // not a terminal (piped stdin); fall back to line input
        return read_line_confirm();
    }
    let mut fired = false;
    loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    fired = true;
                    break;
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Enter | KeyCode::Esc => break,
                _ => {}
            },
            Ok(_) => {}
            Err(_) => break,
        }
    }
    let _ = terminal::disable_raw_mode();
    fired
}

fn read_line_confirm() -> bool {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

/// Source of raw frame bytes for automatic observation.
pub trait FrameSource {
    fn capture(&mut self) -> io::Result<Vec<u8>>;
}

/// read()-based capture from a video node. Good enough for intensity
/// statistics; anything needing real streaming belongs behind its own
/// `FrameSource`.
pub struct DeviceFrameSource {
    fd: RawFd,
    frame_len: usize,
}

impl DeviceFrameSource {
    pub fn open(device: &str, frame_len: usize) -> io::Result<Self> {
        let path = CString::new(device)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "device path has NUL"))?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, frame_len })
    }
}

impl FrameSource for DeviceFrameSource {
    fn capture(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.frame_len];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(n as usize);
        Ok(buf)
    }
}

impl Drop for DeviceFrameSource {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Default trigger threshold: mean-intensity jump, in 8-bit levels, that
/// counts as the illuminator switching on.
pub const DEFAULT_INTENSITY_THRESHOLD: f64 = 12.0;

const SAMPLES_PER_OBSERVATION: usize = 3;

/// Automatic observer: compares the scene's mean intensity against a rolling
/// baseline and reports a trigger on a jump above the threshold. Quiet
/// samples are folded into the baseline so slow ambient drift does not
/// accumulate into a false trigger.
pub struct AutoObserver<S: FrameSource> {
    source: S,
    baseline: Option<f64>,
    threshold: f64,
}

impl<S: FrameSource> AutoObserver<S> {
    pub fn new(source: S, threshold: f64) -> Self {
        Self {
            source,
            baseline: None,
            threshold,
        }
    }

    /// Average a few frames to ride out sensor noise. None when no usable
    /// frame arrived.
    fn sample_intensity(&mut self) -> Option<f64> {
        let mut acc = 0.0;
        let mut n = 0usize;
        for _ in 0..SAMPLES_PER_OBSERVATION {
            if let Ok(frame) = self.source.capture() {
                if !frame.is_empty() {
                    acc += mean_intensity(&frame);
                    n += 1;
                }
            }
        }
        if n == 0 {
            None
        } else {
            Some(acc / n as f64)
        }
    }
}

impl<S: FrameSource> EffectObserver for AutoObserver<S> {
    fn observe(&mut self) -> bool {
        let Some(mean) = self.sample_intensity() else {
            return false;
        };
        let Some(base) = self.baseline else {
            // first observation establishes the dark baseline
            self.baseline = Some(mean);
            return false;
        };
        if mean - base >= self.threshold {
            return true;
        }
        self.baseline = Some(base * 0.8 + mean * 0.2);
        false
    }
}

pub fn mean_intensity(frame: &[u8]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame.iter().map(|&b| b as u64).sum();
    sum as f64 / frame.len() as f64
}
