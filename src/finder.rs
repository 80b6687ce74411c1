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

use serde_json::json;

use crate::cancel::CancelToken;
use crate::instruction::{ControlInstruction, Lifecycle};
use crate::logger;
use crate::probe::{ControlError, ProbePort};

/// Drives the search protocol over a catalog of control axes.
///
/// The finder is stateless across runs: all progress lives in the catalog it
/// mutates (each axis's lifecycle and current value), which the caller
/// persists on every exit path.
pub struct Finder {
    target_emitters: usize,
    neg_answer_limit: u32,
}

enum AxisOutcome {
    /// The emitter fired; the axis keeps its triggering value.
    Triggered,
    /// Budget or value space ran out; the axis was restored to its initial
    /// value.
    Exhausted,
    /// Cancellation was requested; the axis was restored before returning.
    Cancelled,
}

impl Finder {
    pub fn new(target_emitters: usize, neg_answer_limit: u32) -> Self {
        Self {
            target_emitters,
            neg_answer_limit,
        }
    }

    /// Walk the catalog until `target_emitters` axes are confirmed to fire
    /// the emitter, the catalog is exhausted, cancellation is requested, or
    /// the device faults.
    ///
    /// Returns Ok(true) on success, Ok(false) on an exhausted or cancelled
    /// search. A `DeviceFault` escapes after the offending axis has been
    /// force-reset and marked disabled; every other per-axis failure is
    /// contained. All visited axes end in a well-defined state: either their
    /// triggering value (lifecycle `Start`) or their initial value.
    pub fn find(
        &self,
        port: &mut dyn ProbePort,
        catalog: &mut [ControlInstruction],
        cancel: &CancelToken,
    ) -> Result<bool, ControlError> {
        // Axes confirmed by an earlier run count toward the target and are
        // not re-probed; re-walking them would clobber the found value.
        let mut found = catalog
            .iter()
            .filter(|a| a.lifecycle() == Lifecycle::Start)
            .count();
        logger::log_event(
            "search_start",
            json!({
                "axes": catalog.len(),
                "already_confirmed": found,
                "target": self.target_emitters,
                "neg_answer_limit": self.neg_answer_limit,
            }),
        );
        if found >= self.target_emitters {
            return Ok(true);
        }

        for axis in catalog.iter_mut() {
            match axis.lifecycle() {
                Lifecycle::Disable | Lifecycle::Start => continue,
                Lifecycle::Idle => {}
            }
            if cancel.is_requested() {
                logger::log_event("search_cancelled", json!({ "found": found }));
                return Ok(false);
            }

            match self.probe_axis(port, axis, cancel) {
                Ok(AxisOutcome::Triggered) => {
                    found += 1;
                    if found >= self.target_emitters {
                        logger::log_event("search_done", json!({ "found": found }));
                        return Ok(true);
                    }
                }
                Ok(AxisOutcome::Exhausted) => {}
                Ok(AxisOutcome::Cancelled) => {
                    logger::log_event("search_cancelled", json!({ "found": found }));
                    return Ok(false);
                }
                Err(ControlError::AddressInvalid {
                    unit,
                    selector,
                    reason,
                }) => {
                    // The address stopped behaving like a control; it was
                    // never a viable axis, so skip it without poisoning it.
                    logger::log_event(
                        "axis_skipped",
                        json!({ "unit": unit, "selector": selector, "reason": reason }),
                    );
                }
                Err(e) => return Err(e),
            }
        }

        logger::log_event("search_exhausted", json!({ "found": found }));
        Ok(found >= self.target_emitters)
    }

    /// Probe one axis: place it at a deterministic start, walk its value
    /// space under the negative-answer budget, and leave it either at the
    /// triggering value or restored to its initial value.
    fn probe_axis(
        &self,
        port: &mut dyn ProbePort,
        axis: &mut ControlInstruction,
        cancel: &CancelToken,
    ) -> Result<AxisOutcome, ControlError> {
        let addr = axis.address();
        logger::log_event(
            "axis_begin",
            json!({ "unit": addr.unit, "selector": addr.selector }),
        );

        // Deterministic starting point: the known minimum when one exists,
        // the control's initial value otherwise.
        if !axis.set_min_cur()? {
            axis.reset()?;
        }

        let mut negatives: u32 = 0;
        let mut triggered = false;
        let mut cancelled = false;

        loop {
            if cancel.is_requested() {
                cancelled = true;
                break;
            }
            if negatives >= self.neg_answer_limit {
                break;
            }
            if !axis.next()? {
                break;
            }
            // The walk's stride may never land on the boundary value, so the
            // last budgeted probe is always spent on it.
            if negatives + 1 == self.neg_answer_limit {
                axis.set_max_cur()?;
            }

            let applied = port.set(addr, axis.current());
            if applied && port.observe_effect() {
                axis.mark_start();
                logger::log_event(
                    "emitter_found",
                    json!({
                        "unit": addr.unit,
                        "selector": addr.selector,
                        "value": axis.current(),
                    }),
                );
                triggered = true;
                break;
            }
            if !applied {
                logger::log_event(
                    "apply_rejected",
                    json!({
                        "unit": addr.unit,
                        "selector": addr.selector,
                        "value": axis.current(),
                    }),
                );
            }
            // A rejected apply and a quiet emitter spend the budget alike.
            negatives += 1;
        }

        if !triggered {
            axis.reset()?;
            if !port.set(addr, axis.current()) {
                // The device is holding an unknown value and refuses the
                // restore. Exclude the axis from every future run and abort;
                // continuing to probe risks corrupting the device.
                axis.mark_disable();
                return Err(ControlError::device_fault(
                    addr,
                    "failed to restore initial value",
                ));
            }
        }

        if cancelled {
            return Ok(AxisOutcome::Cancelled);
        }
        if triggered {
            Ok(AxisOutcome::Triggered)
        } else {
            Ok(AxisOutcome::Exhausted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ControlAddress, QueryKind};
    use std::collections::HashMap;

    /// Scripted stand-in for a camera: records every SET, answers
    /// observations from a per-axis script, and can be told to reject
    /// specific writes.
    struct ScriptedPort {
        set_log: Vec<(ControlAddress, Vec<u8>)>,
        observe_answers: Vec<bool>,
        observe_cursor: usize,
        reject_set: Option<(ControlAddress, Vec<u8>)>,
        cancel_after_observes: Option<(usize, CancelToken)>,
        lengths: HashMap<(u8, u8), u16>,
        values: HashMap<(u8, u8), Vec<u8>>,
    }

    impl ScriptedPort {
        fn new(observe_answers: Vec<bool>) -> Self {
            Self {
                set_log: Vec::new(),
                observe_answers,
                observe_cursor: 0,
                reject_set: None,
                cancel_after_observes: None,
                lengths: HashMap::new(),
                values: HashMap::new(),
            }
        }

        fn sets_for(&self, addr: ControlAddress) -> Vec<&Vec<u8>> {
            self.set_log
                .iter()
                .filter(|(a, _)| *a == addr)
                .map(|(_, v)| v)
                .collect()
        }
    }

    impl ProbePort for ScriptedPort {
        fn query_length(&mut self, addr: ControlAddress) -> Result<u16, ControlError> {
            match self.lengths.get(&(addr.unit, addr.selector)) {
                Some(&n) => Ok(n),
                None => Err(ControlError::address_invalid(addr, "no such control")),
            }
        }

        fn get(&mut self, kind: QueryKind, addr: ControlAddress) -> Result<Vec<u8>, ControlError> {
            match kind {
                QueryKind::Current => self
                    .values
                    .get(&(addr.unit, addr.selector))
                    .cloned()
                    .ok_or_else(|| ControlError::address_invalid(addr, "unreadable")),
                _ => Err(ControlError::address_invalid(addr, "no bound")),
            }
        }

        fn set(&mut self, addr: ControlAddress, value: &[u8]) -> bool {
            if let Some((bad_addr, bad_value)) = &self.reject_set {
                if *bad_addr == addr && bad_value.as_slice() == value {
                    return false;
                }
            }
            self.set_log.push((addr, value.to_vec()));
            true
        }

        fn observe_effect(&mut self) -> bool {
            let answer = self
                .observe_answers
                .get(self.observe_cursor)
                .copied()
                .unwrap_or(false);
            self.observe_cursor += 1;
            if let Some((after, token)) = &self.cancel_after_observes {
                if self.observe_cursor >= *after {
                    token.request();
                }
            }
            answer
        }
    }

    fn idle_axis(unit: u8, selector: u8, initial: &[u8], max: &[u8]) -> ControlInstruction {
        ControlInstruction::from_saved(
            ControlAddress::new(unit, selector),
            initial.to_vec(),
            initial.to_vec(),
            max.to_vec(),
            Vec::new(),
            Lifecycle::Idle,
        )
    }

    #[test]
    fn test_termination_respects_budget_and_restores() {
        // plenty of value space, never triggers
        let mut catalog = vec![idle_axis(1, 1, &[0], &[200])];
        let mut port = ScriptedPort::new(vec![]);
        let finder = Finder::new(1, 4);
        let ok = finder
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(!ok);
        // 4 budgeted probes plus the restore write
        assert_eq!(port.sets_for(ControlAddress::new(1, 1)).len(), 5);
        assert_eq!(catalog[0].current(), catalog[0].initial());
        assert_eq!(catalog[0].lifecycle(), Lifecycle::Idle);
    }

    #[test]
    fn test_last_budgeted_probe_is_the_boundary_value() {
        let mut catalog = vec![idle_axis(1, 1, &[0], &[200])];
        let mut port = ScriptedPort::new(vec![]);
        Finder::new(1, 3)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        let sets = port.sets_for(ControlAddress::new(1, 1));
        // probes walk 1, 2, then jump to the max; the trailing write restores
        assert_eq!(sets, vec![&vec![1], &vec![2], &vec![200], &vec![0]]);
    }

    #[test]
    fn test_end_to_end_second_axis_triggers() {
        // axis 1 has no room to move (current == max), axis 2 fires on its
        // second probed value, axis 3 must never be touched
        let mut catalog = vec![
            idle_axis(1, 1, &[9], &[9]),
            idle_axis(1, 2, &[0], &[50]),
            idle_axis(1, 3, &[0], &[50]),
        ];
        let mut port = ScriptedPort::new(vec![false, true]);
        let finder = Finder::new(1, 16);
        let ok = finder
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(ok);
        assert_eq!(catalog[0].lifecycle(), Lifecycle::Idle);
        assert_eq!(catalog[0].current(), &[9]);
        assert_eq!(catalog[1].lifecycle(), Lifecycle::Start);
        assert_eq!(catalog[1].current(), &[2]);
        assert!(port.sets_for(ControlAddress::new(1, 3)).is_empty());
    }

    #[test]
    fn test_fatal_restore_failure_disables_axis_and_aborts() {
        let mut catalog = vec![idle_axis(2, 1, &[0], &[50]), idle_axis(2, 2, &[0], &[50])];
        let mut port = ScriptedPort::new(vec![]);
        // the restore write of axis 1 (back to its initial [0]) is refused
        port.reject_set = Some((ControlAddress::new(2, 1), vec![0]));
        let err = Finder::new(1, 2)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ControlError::DeviceFault { unit: 2, selector: 1, .. }));
        assert_eq!(catalog[0].lifecycle(), Lifecycle::Disable);
        // force-reset in memory even though the device refused the write
        assert_eq!(catalog[0].current(), catalog[0].initial());
        assert!(port.sets_for(ControlAddress::new(2, 2)).is_empty());
    }

    #[test]
    fn test_disabled_axes_are_skipped() {
        let mut disabled = idle_axis(3, 1, &[0], &[50]);
        disabled.mark_disable();
        let mut catalog = vec![disabled, idle_axis(3, 2, &[0], &[50])];
        let mut port = ScriptedPort::new(vec![true]);
        let ok = Finder::new(1, 8)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(ok);
        assert!(port.sets_for(ControlAddress::new(3, 1)).is_empty());
        assert_eq!(catalog[1].lifecycle(), Lifecycle::Start);
    }

    #[test]
    fn test_already_confirmed_axes_count_without_reprobing() {
        let mut confirmed = idle_axis(4, 1, &[7], &[50]);
        confirmed.mark_start();
        let mut catalog = vec![confirmed, idle_axis(4, 2, &[0], &[50])];
        let mut port = ScriptedPort::new(vec![]);
        let ok = Finder::new(1, 8)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(ok);
        // nothing was probed at all; the target was already met
        assert!(port.set_log.is_empty());
        assert_eq!(catalog[0].current(), &[7]);
    }

    #[test]
    fn test_min_first_placement_when_minimum_known() {
        let axis = ControlInstruction::from_saved(
            ControlAddress::new(5, 1),
            vec![20],
            vec![20],
            vec![30],
            vec![10],
            Lifecycle::Idle,
        );
        let mut catalog = vec![axis];
        let mut port = ScriptedPort::new(vec![true]);
        Finder::new(1, 8)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        // walk starts just above the minimum, not above the initial value
        assert_eq!(port.sets_for(ControlAddress::new(5, 1))[0], &vec![11]);
    }

    #[test]
    fn test_cancellation_before_start_probes_nothing() {
        let mut catalog = vec![idle_axis(6, 1, &[0], &[50])];
        let mut port = ScriptedPort::new(vec![]);
        let cancel = CancelToken::new();
        cancel.request();
        let ok = Finder::new(1, 8).find(&mut port, &mut catalog, &cancel).unwrap();
        assert!(!ok);
        assert!(port.set_log.is_empty());
    }

    #[test]
    fn test_cancellation_mid_walk_restores_axis() {
        let mut catalog = vec![idle_axis(6, 2, &[0], &[50]), idle_axis(6, 3, &[0], &[50])];
        let cancel = CancelToken::new();
        let mut port = ScriptedPort::new(vec![]);
        port.cancel_after_observes = Some((2, cancel.clone()));
        let ok = Finder::new(1, 100).find(&mut port, &mut catalog, &cancel).unwrap();
        assert!(!ok);
        // the in-flight axis was reset and re-applied before returning
        let sets = port.sets_for(ControlAddress::new(6, 2));
        assert_eq!(sets.last().unwrap().as_slice(), &[0]);
        assert_eq!(catalog[0].current(), catalog[0].initial());
        assert_eq!(catalog[0].lifecycle(), Lifecycle::Idle);
        // the next axis was never reached
        assert!(port.sets_for(ControlAddress::new(6, 3)).is_empty());
    }

    #[test]
    fn test_rejected_apply_counts_against_budget() {
        let mut catalog = vec![idle_axis(7, 1, &[0], &[50])];
        let mut port = ScriptedPort::new(vec![]);
        // the first probed value is refused by the hardware
        port.reject_set = Some((ControlAddress::new(7, 1), vec![1]));
        Finder::new(1, 3)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        // accepted writes: probe 2, boundary probe, restore
        let sets = port.sets_for(ControlAddress::new(7, 1));
        assert_eq!(sets, vec![&vec![2], &vec![50], &vec![0]]);
    }

    #[test]
    fn test_multiple_targets_visits_later_axes() {
        let mut catalog = vec![idle_axis(8, 1, &[0], &[50]), idle_axis(8, 2, &[0], &[50])];
        // first probe of each axis fires
        let mut port = ScriptedPort::new(vec![true, true]);
        let ok = Finder::new(2, 8)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(ok);
        assert_eq!(catalog[0].lifecycle(), Lifecycle::Start);
        assert_eq!(catalog[1].lifecycle(), Lifecycle::Start);
    }

    #[test]
    fn test_target_not_met_returns_false() {
        let mut catalog = vec![idle_axis(9, 1, &[0], &[3])];
        let mut port = ScriptedPort::new(vec![]);
        let ok = Finder::new(1, 50)
            .find(&mut port, &mut catalog, &CancelToken::new())
            .unwrap();
        assert!(!ok);
    }
}
