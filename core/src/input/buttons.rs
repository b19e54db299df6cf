//! Per-mapping GPIO debounce / hold / release machine.
//!
//! Each IO mapping owns a signed tick counter: zero is idle, positive
//! counts pressed ticks, negative counts the post-release cool-down. The
//! machine decides, per tick, whether this mapping's edge fires; applying
//! the action is the caller's business.

use crate::control::mapping::{Action, ButtonState, EdgeType, Mapping};

/// Advance one mapping's machine by one tick.
///
/// `pin` is the active-high pin level, `shifted_now` the shift latch at
/// the start of this poll pass. Returns true when the mapping's edge fires
/// this tick.
pub fn step(
    bs: &mut ButtonState,
    pin: bool,
    mapping: Mapping,
    shifted_now: bool,
    debounce_time: i32,
    hold_time: i32,
) -> bool {
    if bs.debounce == 0 {
        // Idle: watch for the press edge.
        if !pin {
            return false;
        }
        bs.shifted_at_press = shifted_now;
        bs.debounce = 1;
        return match mapping.edge {
            EdgeType::Pressed => !shifted_now,
            EdgeType::PressedShifted => shifted_now,
            _ => false,
        };
    }

    if bs.debounce < 0 {
        // Cool-down after release.
        bs.debounce += 1;
        return false;
    }

    if bs.debounce < debounce_time {
        // Settling: ignore the pin entirely.
        bs.debounce += 1;
        return false;
    }

    if bs.debounce < hold_time {
        if pin {
            bs.debounce += 1;
            return false;
        }
        // Released before the hold threshold.
        bs.debounce = -debounce_time;
        return match mapping.edge {
            EdgeType::Released => !bs.shifted_at_press,
            EdgeType::ReleasedShifted => bs.shifted_at_press,
            _ => false,
        };
    }

    if bs.debounce == hold_time {
        // The hold edge fires exactly once.
        bs.debounce += 1;
        return match mapping.edge {
            EdgeType::Holding => !bs.shifted_at_press,
            EdgeType::HoldingShifted => bs.shifted_at_press,
            _ => false,
        };
    }

    // Past the hold edge.
    if pin {
        // Only the volume actions auto-repeat while held.
        if matches!(mapping.action, Action::VolUpHold | Action::VolDownHold) {
            return match mapping.edge {
                EdgeType::Holding => !bs.shifted_at_press,
                EdgeType::HoldingShifted => bs.shifted_at_press,
                _ => false,
            };
        }
        return false;
    }

    // Released after hold: only the unshifted RELEASED edge fires.
    bs.debounce = -debounce_time;
    mapping.edge == EdgeType::Released && !bs.shifted_at_press
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::mapping::MappingKind;

    const DEBOUNCE: i32 = 5;
    const HOLD: i32 = 20;

    fn mapping(edge: EdgeType, action: Action) -> Mapping {
        Mapping {
            kind: MappingKind::Io,
            port: 0,
            pin: 3,
            pullup: true,
            edge,
            action,
            deck: 0,
        }
    }

    /// Run a pin waveform through the machine, counting dispatches.
    fn run(edge: EdgeType, action: Action, waveform: &[bool], shift: &[bool]) -> usize {
        let mut bs = ButtonState::default();
        let map = mapping(edge, action);
        waveform
            .iter()
            .zip(shift.iter())
            .filter(|&(&pin, &sh)| step(&mut bs, pin, map, sh, DEBOUNCE, HOLD))
            .count()
    }

    fn held_for(ticks: usize, total: usize) -> (Vec<bool>, Vec<bool>) {
        let mut wave = vec![true; ticks];
        wave.resize(total, false);
        (wave, vec![false; total])
    }

    #[test]
    fn test_short_press_fires_released_once_no_holding() {
        // Held past settling but released before hold: exactly one
        // RELEASED, zero HOLDING.
        let (wave, shift) = held_for(10, 40);
        assert_eq!(run(EdgeType::Released, Action::StartStop, &wave, &shift), 1);
        assert_eq!(run(EdgeType::Holding, Action::StartStop, &wave, &shift), 0);
    }

    #[test]
    fn test_long_press_fires_holding_exactly_once() {
        let (wave, shift) = held_for(35, 60);
        assert_eq!(run(EdgeType::Holding, Action::StartStop, &wave, &shift), 1);
    }

    #[test]
    fn test_press_edge_fires_immediately() {
        let (wave, shift) = held_for(3, 10);
        assert_eq!(run(EdgeType::Pressed, Action::Cue(0), &wave, &shift), 1);
    }

    #[test]
    fn test_release_within_settling_window_is_swallowed() {
        // Release during settling: debounce keeps counting, the release is
        // only seen once the counter leaves the settling band.
        let (wave, shift) = held_for(2, 30);
        assert_eq!(run(EdgeType::Released, Action::StartStop, &wave, &shift), 1);
    }

    #[test]
    fn test_volume_hold_repeats_every_tick() {
        let (wave, shift) = held_for(30, 30);
        // Fires at the hold edge (tick HOLD) and then every tick after.
        let fired = run(EdgeType::Holding, Action::VolUpHold, &wave, &shift);
        assert_eq!(fired, (30 - HOLD) as usize);
    }

    #[test]
    fn test_non_volume_hold_does_not_repeat() {
        let (wave, shift) = held_for(30, 30);
        assert_eq!(run(EdgeType::Holding, Action::Record, &wave, &shift), 1);
    }

    #[test]
    fn test_shift_captured_at_press_governs_release() {
        // Shift is on at press and dropped mid-press: the shifted RELEASED
        // edge still fires, the unshifted one does not.
        let wave: Vec<bool> = [vec![true; 10], vec![false; 20]].concat();
        let mut shift = vec![true; 3];
        shift.resize(30, false);
        assert_eq!(
            run(EdgeType::ReleasedShifted, Action::Cue(1), &wave, &shift),
            1
        );
        assert_eq!(run(EdgeType::Released, Action::Cue(0), &wave, &shift), 0);
    }

    #[test]
    fn test_shift_selects_pressed_variant() {
        let (wave, _) = held_for(3, 10);
        let shift = vec![true; 10];
        assert_eq!(run(EdgeType::PressedShifted, Action::Cue(1), &wave, &shift), 1);
        assert_eq!(run(EdgeType::Pressed, Action::Cue(0), &wave, &shift), 0);
    }

    #[test]
    fn test_released_after_hold_is_unshifted_only() {
        let wave: Vec<bool> = [vec![true; 30], vec![false; 20]].concat();
        let shift = vec![true; 50];
        // Shifted at press: the post-hold release dispatches nothing.
        assert_eq!(run(EdgeType::Released, Action::StartStop, &wave, &shift), 0);
        assert_eq!(
            run(EdgeType::ReleasedShifted, Action::StartStop, &wave, &shift),
            0
        );
    }

    #[test]
    fn test_cooldown_blocks_retrigger() {
        // Press, release, and press again during the cool-down: the second
        // press must wait until the counter returns to idle.
        let mut bs = ButtonState::default();
        let map = mapping(EdgeType::Pressed, Action::StartStop);
        let mut fired = 0;
        // Press long enough to leave settling, then release.
        for _ in 0..10 {
            fired += usize::from(step(&mut bs, true, map, false, DEBOUNCE, HOLD));
        }
        step(&mut bs, false, map, false, DEBOUNCE, HOLD);
        assert!(bs.debounce < 0);
        // Immediately press again: swallowed while cooling down.
        for _ in 0..DEBOUNCE {
            fired += usize::from(step(&mut bs, true, map, false, DEBOUNCE, HOLD));
        }
        assert_eq!(fired, 1);
        // Cool-down over: the next press fires again.
        fired += usize::from(step(&mut bs, true, map, false, DEBOUNCE, HOLD));
        assert_eq!(fired, 2);
    }
}
