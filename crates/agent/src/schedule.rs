//! Pending time-triggered actions and the executor that fires them.
//!
//! The store is a plain `Vec` scanned linearly: a single node holds tens of
//! pending entries, not thousands. Two contracts matter:
//!
//! - de-duplication: at most one entry per `(command, value, trigger_time)`;
//! - fire-once: the executor removes an entry in the same step it applies it.
//!
//! Entries that become due in the same tick fire in reverse index order.
//! That order is an artefact of the removal-safe scan, not a priority, and
//! callers must not rely on it.

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::command::{CommandKind, OnOff, Timestamp};
use crate::error::ErrorKind;
use crate::output::DeviceOutput;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub command: CommandKind,
    pub value: OnOff,
    pub trigger_time: Timestamp,
}

impl ScheduleEntry {
    fn matches(&self, command: CommandKind, value: OnOff, time: &Timestamp) -> bool {
        self.command == command && self.value == value && &self.trigger_time == time
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScheduleStore {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, command: CommandKind, value: OnOff, time: &Timestamp) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.matches(command, value, time))
    }

    /// Append an entry unless an identical one is already pending.
    /// Returns `true` if a new entry was stored.
    pub fn add(&mut self, command: CommandKind, value: OnOff, time: Timestamp) -> bool {
        if self.find(command, value, &time).is_some() {
            return false;
        }
        self.entries.push(ScheduleEntry {
            command,
            value,
            trigger_time: time,
        });
        true
    }

    /// Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<ScheduleEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn remove_matching(
        &mut self,
        command: CommandKind,
        value: OnOff,
        time: &Timestamp,
    ) -> Option<ScheduleEntry> {
        self.find(command, value, time)
            .and_then(|idx| self.remove(idx))
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Fire every entry with `trigger_time <= now` and remove it.
///
/// The scan runs from the last index down to the first so that removing the
/// current entry never shifts an entry that has not been visited yet.
pub fn fire_due(
    store: &mut ScheduleStore,
    output: &mut dyn DeviceOutput,
    now: &Timestamp,
) -> Vec<ScheduleEntry> {
    let mut fired = Vec::new();

    for idx in (0..store.len()).rev() {
        let due = store
            .get(idx)
            .is_some_and(|entry| entry.trigger_time <= *now);
        if !due {
            continue;
        }
        if let Some(entry) = store.remove(idx) {
            output.set(entry.command, entry.value);
            info!(
                output = %entry.command,
                value = %entry.value,
                trigger_time = %entry.trigger_time,
                %now,
                "schedule fired"
            );
            fired.push(entry);
        }
    }

    fired
}

/// One executor tick. Without a synchronised clock nothing is evaluated.
pub fn tick(
    store: &mut ScheduleStore,
    output: &mut dyn DeviceOutput,
    clock: &dyn Clock,
) -> Result<Vec<ScheduleEntry>, ErrorKind> {
    let now = clock.now()?;
    if store.is_empty() {
        return Ok(Vec::new());
    }
    let fired = fire_due(store, output, &now);
    debug!(%now, fired = fired.len(), pending = store.len(), "schedule tick");
    Ok(fired)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::output::RecordingOutput;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    // -- Store ----------------------------------------------------------

    #[test]
    fn add_is_idempotent() {
        let mut store = ScheduleStore::new();
        assert!(store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:00")));
        assert!(!store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:00")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_distinguishes_every_field() {
        let mut store = ScheduleStore::new();
        let t = ts("2024-01-01T00:00:00");
        store.add(CommandKind::Pump, OnOff::On, t.clone());
        store.add(CommandKind::Pump, OnOff::Off, t.clone());
        store.add(CommandKind::Light, OnOff::On, t);
        store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:01"));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn find_returns_position() {
        let mut store = ScheduleStore::new();
        store.add(CommandKind::Light, OnOff::On, ts("2024-01-01T08:00:00"));
        store.add(CommandKind::Valve, OnOff::Off, ts("2024-01-01T09:00:00"));
        assert_eq!(
            store.find(CommandKind::Valve, OnOff::Off, &ts("2024-01-01T09:00:00")),
            Some(1)
        );
        assert_eq!(
            store.find(CommandKind::Valve, OnOff::On, &ts("2024-01-01T09:00:00")),
            None
        );
    }

    #[test]
    fn remove_out_of_range_is_noop() {
        let mut store = ScheduleStore::new();
        store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:00"));
        assert_eq!(store.remove(5), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_matching_on_empty_store_is_noop() {
        let mut store = ScheduleStore::new();
        assert_eq!(
            store.remove_matching(CommandKind::Pump, OnOff::On, &ts("2024-01-01T00:00:00")),
            None
        );
        assert!(store.is_empty());
    }

    #[test]
    fn remove_matching_removes_only_the_match() {
        let mut store = ScheduleStore::new();
        store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:00"));
        store.add(CommandKind::Pump, OnOff::Off, ts("2024-01-01T00:10:00"));
        let removed = store.remove_matching(CommandKind::Pump, OnOff::On, &ts("2024-01-01T00:00:00"));
        assert!(removed.is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].value, OnOff::Off);
    }

    // -- Executor -------------------------------------------------------

    #[test]
    fn due_entry_fires_once_and_is_removed() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T00:00:00"));

        let clock = FixedClock::at("2024-01-01T00:00:01");
        let fired = tick(&mut store, &mut out, &clock).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)]);
        assert!(store.is_empty());

        // Same instant again, then later: nothing more happens.
        tick(&mut store, &mut out, &clock).unwrap();
        tick(&mut store, &mut out, &FixedClock::at("2024-01-02T00:00:00")).unwrap();
        assert_eq!(out.writes.len(), 1);
    }

    #[test]
    fn entry_fires_at_exact_trigger_time() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Valve, OnOff::Off, ts("2024-06-01T12:00:00"));
        fire_due(&mut store, &mut out, &ts("2024-06-01T12:00:00"));
        assert_eq!(out.writes, vec![(CommandKind::Valve, OnOff::Off)]);
    }

    #[test]
    fn future_entry_is_untouched() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Light, OnOff::On, ts("2030-01-01T00:00:00"));

        tick(&mut store, &mut out, &FixedClock::at("2024-01-01T00:00:00")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(out.writes.is_empty());
        assert_eq!(out.get(CommandKind::Light), OnOff::Off);
    }

    #[test]
    fn mixed_entries_only_due_ones_fire() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Pump, OnOff::On, ts("2024-01-01T06:00:00"));
        store.add(CommandKind::Light, OnOff::On, ts("2024-01-01T18:00:00"));
        store.add(CommandKind::Valve, OnOff::On, ts("2024-01-01T05:00:00"));
        store.add(CommandKind::Pump, OnOff::Off, ts("2024-01-01T06:30:00"));

        let fired = fire_due(&mut store, &mut out, &ts("2024-01-01T06:15:00"));

        assert_eq!(fired.len(), 2);
        assert_eq!(store.len(), 2);
        let mut kinds: Vec<_> = out.writes.iter().map(|(k, _)| *k).collect();
        kinds.sort_by_key(|k| k.status_key());
        assert_eq!(kinds, [CommandKind::Pump, CommandKind::Valve]);
        assert!(store.find(CommandKind::Light, OnOff::On, &ts("2024-01-01T18:00:00")).is_some());
        assert!(store.find(CommandKind::Pump, OnOff::Off, &ts("2024-01-01T06:30:00")).is_some());
    }

    #[test]
    fn adjacent_due_entries_are_not_skipped() {
        // Forward removal while iterating forward would skip every other
        // entry here.
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        for s in ["2024-01-01T00:00:01", "2024-01-01T00:00:02", "2024-01-01T00:00:03"] {
            store.add(CommandKind::Pump, OnOff::On, ts(s));
        }
        let fired = fire_due(&mut store, &mut out, &ts("2024-01-01T00:00:03"));
        assert_eq!(fired.len(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn unsynchronised_clock_skips_tick() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Pump, OnOff::On, ts("2000-01-01T00:00:00"));

        let err = tick(&mut store, &mut out, &FixedClock::unsynced()).unwrap_err();
        assert_eq!(err, ErrorKind::ClockUnavailable);
        assert_eq!(store.len(), 1);
        assert!(out.writes.is_empty());
    }

    #[test]
    fn past_entry_survives_unsynced_ticks_then_fires() {
        let mut store = ScheduleStore::new();
        let mut out = RecordingOutput::default();
        store.add(CommandKind::Pump, OnOff::On, ts("2001-01-01T00:00:00"));

        for _ in 0..5 {
            assert!(tick(&mut store, &mut out, &FixedClock::unsynced()).is_err());
        }
        assert_eq!(store.len(), 1);
        assert!(out.writes.is_empty());

        let fired = tick(&mut store, &mut out, &FixedClock::at("2024-06-01T12:00:00")).unwrap();
        assert_eq!(fired.len(), 1);
        assert!(store.is_empty());
        assert_eq!(out.writes, vec![(CommandKind::Pump, OnOff::On)]);
    }
}
