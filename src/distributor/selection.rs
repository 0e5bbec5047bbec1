//! The instrument-selection policies, written as pure functions over the routing inputs: the
//! method, the routing cursor, the enabled-instrument mask, and the controller's active-note
//! bookkeeping. Keeping them free of `Distributor` state makes each tie-break rule directly
//! testable.
//!
//! Forward selection and reverse lookup are deliberately asymmetric for the round-robin methods:
//! notes are placed by scanning *forward* from the cursor but located by scanning *backward*
//! from it, which approximates last-in-first-out release ordering without any per-note
//! bookkeeping in the core.

use super::{DistributionMethod, NUM_INSTRUMENT_SLOTS};
use crate::instrument::InstrumentController;

const SLOTS: u8 = NUM_INSTRUMENT_SLOTS as u8;

/// Whether the given slot is inside the mask.
pub(crate) fn slot_enabled(instruments: u32, slot: u8) -> bool {
    slot < SLOTS && instruments & (1 << slot) != 0
}

/// Picks the instrument slot for the next note, or `None` when the method yields nothing.
///
/// Per-method rules:
/// - `StraightThrough`: slot = channel index, valid only when that exact slot is enabled.
/// - `RoundRobin`: the first enabled slot after the cursor, wrapping at most once.
/// - `RoundRobinBalance`: same scan, but an idle slot wins immediately and otherwise the
///   least-loaded slot of the full cycle is chosen; ties keep the earliest candidate.
/// - `Ascending` / `Descending`: linear scan from the bottom/top; an idle slot wins immediately,
///   least-loaded otherwise.
/// - `Stack`: reserved, never selects.
pub fn next_instrument<C: InstrumentController>(
    method: DistributionMethod,
    cursor: Option<u8>,
    instruments: u32,
    channel: u8,
    controller: &C,
) -> Option<u8> {
    match method {
        DistributionMethod::StraightThrough => {
            slot_enabled(instruments, channel).then_some(channel)
        }
        DistributionMethod::RoundRobin => {
            circular_scan(cursor).find(|&slot| slot_enabled(instruments, slot))
        }
        DistributionMethod::RoundRobinBalance => {
            least_loaded(circular_scan(cursor), instruments, controller)
        }
        DistributionMethod::Ascending => least_loaded(0..SLOTS, instruments, controller),
        DistributionMethod::Descending => least_loaded((0..SLOTS).rev(), instruments, controller),
        DistributionMethod::Stack => None,
    }
}

/// Locates the slot presumed to be sounding `note`, mirroring the forward selection order of the
/// active method: the channel-mapped slot for `StraightThrough`, backward from the cursor for the
/// round-robin methods, bottom-up for `Ascending`, top-down for `Descending`.
pub fn find_note<C: InstrumentController>(
    method: DistributionMethod,
    cursor: Option<u8>,
    instruments: u32,
    channel: u8,
    note: u8,
    controller: &C,
) -> Option<u8> {
    let sounding =
        |slot: &u8| slot_enabled(instruments, *slot) && controller.is_note_active(*slot, note);

    match method {
        DistributionMethod::StraightThrough => Some(channel).filter(sounding),
        DistributionMethod::RoundRobin | DistributionMethod::RoundRobinBalance => {
            let start = cursor.unwrap_or(0);
            (0..SLOTS).map(|offset| (start + SLOTS - offset) % SLOTS).find(sounding)
        }
        DistributionMethod::Ascending => (0..SLOTS).find(sounding),
        DistributionMethod::Descending => (0..SLOTS).rev().find(sounding),
        DistributionMethod::Stack => None,
    }
}

/// Slots in circular order, starting just past the cursor (or at slot 0 when nothing has been
/// selected yet) and covering every slot exactly once.
fn circular_scan(cursor: Option<u8>) -> impl Iterator<Item = u8> {
    let start = cursor.map_or(0, |slot| (slot + 1) % SLOTS);
    (0..SLOTS).map(move |offset| (start + offset) % SLOTS)
}

/// The balancing rule shared by `RoundRobinBalance`, `Ascending`, and `Descending`: the first
/// idle slot in scan order wins outright; failing that, the slot with the fewest active notes,
/// earliest-seen on ties.
fn least_loaded<C: InstrumentController>(
    scan: impl Iterator<Item = u8>,
    instruments: u32,
    controller: &C,
) -> Option<u8> {
    let mut best: Option<(u8, u8)> = None;
    for slot in scan {
        if !slot_enabled(instruments, slot) {
            continue;
        }
        let active = controller.num_active_notes(slot);
        if active == 0 {
            return Some(slot);
        }
        match best {
            Some((_, fewest)) if active >= fewest => {}
            _ => best = Some((slot, active)),
        }
    }
    best.map(|(slot, _)| slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingController;

    const ALL: u32 = u32::MAX;

    fn controller_with_load(load: &[(u8, u8)]) -> RecordingController {
        let mut controller = RecordingController::default();
        for &(slot, count) in load {
            for note in 0..count {
                controller.play_note(slot, note, 100, 0);
            }
        }
        controller
    }

    #[test]
    fn straight_through_requires_the_exact_slot() {
        let controller = RecordingController::default();
        let method = DistributionMethod::StraightThrough;

        assert_eq!(Some(4), next_instrument(method, None, 1 << 4, 4, &controller));
        assert_eq!(None, next_instrument(method, None, 1 << 3, 4, &controller));
    }

    #[test]
    fn round_robin_starts_at_slot_zero() {
        let controller = RecordingController::default();
        assert_eq!(
            Some(0),
            next_instrument(DistributionMethod::RoundRobin, None, ALL, 0, &controller)
        );
    }

    #[test]
    fn round_robin_wraps_at_most_once() {
        let controller = RecordingController::default();
        let method = DistributionMethod::RoundRobin;

        assert_eq!(Some(1), next_instrument(method, Some(31), 1 << 1, 0, &controller));
        assert_eq!(None, next_instrument(method, Some(7), 0, 0, &controller));
    }

    #[test]
    fn balance_prefers_idle_slots() {
        let controller = controller_with_load(&[(0, 2), (1, 1)]);
        let instruments = 0b111;

        assert_eq!(
            Some(2),
            next_instrument(DistributionMethod::RoundRobinBalance, None, instruments, 0, &controller),
            "slot 2 is idle"
        );
    }

    #[test]
    fn balance_never_selects_above_the_minimum_load() {
        let controller = controller_with_load(&[(0, 3), (1, 1), (2, 2)]);
        let instruments = 0b111;

        let selected =
            next_instrument(DistributionMethod::RoundRobinBalance, None, instruments, 0, &controller)
                .unwrap();
        assert_eq!(1, selected, "slot 1 carries the minimum load");
    }

    #[test]
    fn balance_ties_keep_the_earliest_candidate() {
        // scanning starts past cursor 0, so slot 1 is seen before slot 2
        let controller = controller_with_load(&[(0, 9), (1, 2), (2, 2)]);
        let selected = next_instrument(
            DistributionMethod::RoundRobinBalance,
            Some(0),
            0b111,
            0,
            &controller,
        );
        assert_eq!(Some(1), selected);
    }

    #[test]
    fn ascending_and_descending_scan_from_opposite_ends() {
        let controller = RecordingController::default();
        let instruments = (1 << 3) | (1 << 20);

        assert_eq!(
            Some(3),
            next_instrument(DistributionMethod::Ascending, None, instruments, 0, &controller)
        );
        assert_eq!(
            Some(20),
            next_instrument(DistributionMethod::Descending, None, instruments, 0, &controller)
        );
    }

    #[test]
    fn ascending_falls_back_to_the_least_loaded_slot() {
        let controller = controller_with_load(&[(0, 2), (3, 1), (5, 4)]);
        let instruments = 0b10_1001;

        assert_eq!(
            Some(3),
            next_instrument(DistributionMethod::Ascending, None, instruments, 0, &controller)
        );
    }

    #[test]
    fn stack_selects_nothing() {
        let controller = RecordingController::default();
        assert_eq!(None, next_instrument(DistributionMethod::Stack, None, ALL, 0, &controller));
    }

    #[test]
    fn reverse_lookup_scans_backward_from_the_cursor() {
        let mut controller = RecordingController::default();
        controller.play_note(2, 60, 100, 0);
        controller.play_note(5, 60, 100, 0);

        let found = find_note(DistributionMethod::RoundRobin, Some(5), ALL, 0, 60, &controller);
        assert_eq!(Some(5), found, "the cursor slot itself is checked first");

        let found = find_note(DistributionMethod::RoundRobin, Some(4), ALL, 0, 60, &controller);
        assert_eq!(Some(2), found, "walking backward finds the older note next");
    }

    #[test]
    fn reverse_lookup_mirrors_linear_methods() {
        let mut controller = RecordingController::default();
        controller.play_note(2, 60, 100, 0);
        controller.play_note(5, 60, 100, 0);

        assert_eq!(
            Some(2),
            find_note(DistributionMethod::Ascending, None, ALL, 0, 60, &controller)
        );
        assert_eq!(
            Some(5),
            find_note(DistributionMethod::Descending, None, ALL, 0, 60, &controller)
        );
    }

    #[test]
    fn reverse_lookup_ignores_disabled_slots() {
        let mut controller = RecordingController::default();
        controller.play_note(2, 60, 100, 0);

        assert_eq!(
            None,
            find_note(DistributionMethod::Ascending, None, 1 << 3, 0, 60, &controller)
        );
    }
}
