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

mod cancel;
mod camera;
mod config;
mod finder;
mod instruction;
mod logger;
mod probe;
mod scanner;
mod uvc;

use std::ffi::CString;

use anyhow::Context;

use camera::{AutoObserver, DeviceFrameSource, EffectObserver, ManualObserver,
    DEFAULT_INTENSITY_THRESHOLD};
use cancel::CancelToken;
use finder::Finder;
use instruction::Lifecycle;
use probe::ControlError;
use scanner::Scanner;
use uvc::UvcProbePort;

const EXIT_SEARCH_FAILED: i32 = 1;
const EXIT_DEVICE_FAULT: i32 = 2;

const DEFAULT_EMITTERS: usize = 1;
const DEFAULT_NEG_ANSWER_LIMIT: u32 = 64;
// enough bytes of a raw frame for intensity statistics
const FRAME_PROBE_LEN: usize = 64 * 1024;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--logging") {
        logger::init_logging();
        logger::log_event("startup", serde_json::json!({ "args": args }));
    }

    match args.get(1).map(|s| s.as_str()) {
        Some("scan") => run_scan(&args),
        Some("configure") => run_configure(&args),
        _ => {
            print_usage();
            std::process::exit(EXIT_SEARCH_FAILED);
        }
    }
}

fn print_usage() {
    eprintln!("usage: irscout scan <device> [--units A:B] [--selectors A:B] [--logging]");
    eprintln!("       irscout configure <device> [--emitters N] [--budget N] [--auto]");
    eprintln!("                         [--units A:B] [--selectors A:B] [--logging]");
    eprintln!();
    eprintln!("  scan       sweep the extension-unit address space and persist the catalog");
    eprintln!("  configure  search the catalog for values that fire the IR emitter");
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

// "A:B" inclusive
fn parse_range(s: &str) -> Option<(u8, u8)> {
    let (lo, hi) = s.split_once(':')?;
    let lo = lo.parse().ok()?;
    let hi = hi.parse().ok()?;
    if lo > hi {
        return None;
    }
    Some((lo, hi))
}

fn scanner_from_args(args: &[String]) -> Scanner {
    let units = flag_value(args, "--units")
        .and_then(|s| parse_range(&s))
        .map(|(lo, hi)| lo..=hi)
        .unwrap_or(0..=u8::MAX);
    let selectors = flag_value(args, "--selectors")
        .and_then(|s| parse_range(&s))
        .map(|(lo, hi)| lo..=hi)
        .unwrap_or(1..=u8::MAX);
    Scanner::new(units, selectors)
}

fn require_device(args: &[String]) -> String {
    match args.get(2) {
        Some(d) if !d.starts_with("--") => d.clone(),
        _ => {
            print_usage();
            std::process::exit(EXIT_SEARCH_FAILED);
        }
    }
}

/// Fail early with the distinguished exit code when the node is missing or
/// the user lacks video-group access.
fn check_device_access(device: &str) {
    let ok = CString::new(device)
        .map(|p| unsafe { libc::access(p.as_ptr(), libc::R_OK | libc::W_OK) } == 0)
        .unwrap_or(false);
    if !ok {
        eprintln!(
            "error: cannot access {} (does it exist? are you in the video group?)",
            device
        );
        std::process::exit(EXIT_DEVICE_FAULT);
    }
}

fn open_port(device: &str, observer: Box<dyn EffectObserver>) -> UvcProbePort {
    match UvcProbePort::open(device, observer) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("error: cannot open {}: {}", device, e);
            std::process::exit(EXIT_DEVICE_FAULT);
        }
    }
}

fn load_validated_state() -> config::SavedState {
    match config::load_state() {
        Some(state) => match config::validate_state(&state) {
            Ok(()) => state,
            Err(e) => {
                eprintln!(
                    "warning: ignoring invalid state file {}: {}",
                    config::state_path().display(),
                    e
                );
                config::SavedState::default()
            }
        },
        None => config::SavedState::default(),
    }
}

fn persist(state: &config::SavedState) {
    if let Err(e) = config::save_state(state) {
        eprintln!(
            "warning: failed to save state to {}: {}",
            config::state_path().display(),
            e
        );
    }
}

fn run_scan(args: &[String]) -> anyhow::Result<()> {
    let device = require_device(args);
    check_device_access(&device);

    let cancel = CancelToken::new();
    cancel::install_interrupt_handler(&cancel).context("install interrupt handler")?;

    // scanning never observes the emitter; the manual observer is inert here
    let mut port = open_port(&device, Box::new(ManualObserver));
    let scanner = scanner_from_args(args);

    eprintln!("irscout: sweeping extension units on {} ...", device);
    let catalog = match scanner.scan(&mut port, &cancel) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("error: sweep failed: {}", e);
            std::process::exit(EXIT_DEVICE_FAULT);
        }
    };

    let mut state = load_validated_state();
    state.store_catalog(&config::device_key(&device), &catalog);
    persist(&state);

    println!(
        "found {} control(s); catalog saved to {}",
        catalog.len(),
        config::state_path().display()
    );
    Ok(())
}

fn run_configure(args: &[String]) -> anyhow::Result<()> {
    let device = require_device(args);
    check_device_access(&device);

    let emitters = flag_value(args, "--emitters")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_EMITTERS);
    let budget = flag_value(args, "--budget")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_NEG_ANSWER_LIMIT);
    let auto = args.iter().any(|a| a == "--auto");

    let observer: Box<dyn EffectObserver> = if auto {
        let frames = match DeviceFrameSource::open(&device, FRAME_PROBE_LEN) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot open {} for frame capture: {}", device, e);
                std::process::exit(EXIT_DEVICE_FAULT);
            }
        };
        Box::new(AutoObserver::new(frames, DEFAULT_INTENSITY_THRESHOLD))
    } else {
        Box::new(ManualObserver)
    };
    let mut port = open_port(&device, observer);

    let cancel = CancelToken::new();
    cancel::install_interrupt_handler(&cancel).context("install interrupt handler")?;

    let key = config::device_key(&device);
    let mut state = load_validated_state();
    let mut catalog = state.catalog_for(&key);
    if catalog.is_empty() {
        eprintln!("irscout: no saved catalog for {}, sweeping first ...", device);
        catalog = match scanner_from_args(args).scan(&mut port, &cancel) {
            Ok(catalog) => catalog,
            Err(e) => {
                eprintln!("error: sweep failed: {}", e);
                std::process::exit(EXIT_DEVICE_FAULT);
            }
        };
        state.store_catalog(&key, &catalog);
        persist(&state);
    }
    if catalog.is_empty() {
        eprintln!("error: no controls found on {}", device);
        std::process::exit(EXIT_SEARCH_FAILED);
    }

    eprintln!(
        "irscout: probing {} control(s), budget {} per control ...",
        catalog.len(),
        budget
    );
    let result = Finder::new(emitters, budget).find(&mut port, &mut catalog, &cancel);

    // every exit path persists the mutated catalog
    state.store_catalog(&key, &catalog);
    persist(&state);

    match result {
        Ok(true) => {
            for axis in catalog.iter().filter(|a| a.lifecycle() == Lifecycle::Start) {
                println!("emitter control {} = {:?}", axis.address(), axis.current());
            }
            Ok(())
        }
        Ok(false) => {
            if cancel.is_requested() {
                eprintln!("irscout: interrupted; progress saved");
            } else {
                eprintln!("irscout: no emitter control found within budget");
            }
            std::process::exit(EXIT_SEARCH_FAILED);
        }
        Err(e @ ControlError::DeviceFault { .. }) | Err(e @ ControlError::Io(_)) => {
            eprintln!("error: {}", e);
            eprintln!("the device is in an unknown state; unplug it or power-cycle before retrying");
            std::process::exit(EXIT_DEVICE_FAULT);
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(EXIT_SEARCH_FAILED);
        }
    }
}
