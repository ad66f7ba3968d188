//! Per-ref result slots.
//!
//! Each slot holds a write-once entry and a small lock-protected state: the
//! scheduling phase of the chunk and the refs waiting for it. Subscribing
//! and completing take the same lock, so a waiter either lands in the list
//! before completion takes it or observes the slot as done.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::error::{ExecError, ExecResult};
use crate::program::Ref;
use crate::value::RawData;

/// A resolved chunk result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: RawData,
    /// Literal data that does not depend on any resource.
    ///
    /// Informational only: the executor never consults it. Callers that
    /// inspect a finished [`Cache`] use it to tell constants apart from
    /// values read from a runtime.
    pub is_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// A handler is executing; `rerun` is set when a dependency completed meanwhile.
    Running { rerun: bool },
    /// Asynchronous work is in flight and will store the result itself.
    Scheduled,
    Done,
}

#[derive(Debug)]
struct SlotState {
    phase: Phase,
    waiters: Vec<Ref>,
}

#[derive(Debug)]
struct Slot {
    entry: OnceLock<CacheEntry>,
    state: Mutex<SlotState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            entry: OnceLock::new(),
            state: Mutex::new(SlotState {
                phase: Phase::Idle,
                waiters: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result slots for every chunk of one program.
#[derive(Debug)]
pub struct Cache {
    slots: Vec<Slot>,
}

impl Cache {
    /// Slots for refs `1..=len`.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| Slot::new()).collect(),
        }
    }

    fn slot(&self, r: Ref) -> Option<&Slot> {
        if r == 0 {
            return None;
        }
        self.slots.get(r as usize - 1)
    }

    pub fn get(&self, r: Ref) -> Option<&CacheEntry> {
        self.slot(r).and_then(|slot| slot.entry.get())
    }

    pub fn is_resolved(&self, r: Ref) -> bool {
        self.get(r).is_some()
    }

    /// Claim `r` for handler execution.
    ///
    /// Returns false when the handler must not run now: it is already
    /// running (a rerun is requested instead), scheduled or done.
    pub(crate) fn begin(&self, r: Ref) -> bool {
        let Some(slot) = self.slot(r) else {
            return false;
        };
        let mut state = slot.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Running { rerun: false };
                true
            }
            Phase::Running { .. } => {
                state.phase = Phase::Running { rerun: true };
                false
            }
            Phase::Scheduled | Phase::Done => false,
        }
    }

    /// Register `waiter` to be triggered when `dep` completes.
    ///
    /// Returns false if `dep` is already done, in which case nothing was
    /// registered and the waiter should retry right away.
    pub(crate) fn subscribe(&self, dep: Ref, waiter: Ref) -> bool {
        let Some(slot) = self.slot(dep) else {
            return false;
        };
        let mut state = slot.lock();
        if state.phase == Phase::Done {
            return false;
        }
        if !state.waiters.contains(&waiter) {
            state.waiters.push(waiter);
        }
        true
    }

    /// End a handler run that is now waiting on a dependency.
    ///
    /// Returns true if a rerun was requested while the handler ran.
    pub(crate) fn suspend(&self, r: Ref) -> bool {
        let Some(slot) = self.slot(r) else {
            return false;
        };
        let mut state = slot.lock();
        match state.phase {
            Phase::Running { rerun: true } => {
                state.phase = Phase::Running { rerun: false };
                true
            }
            Phase::Running { rerun: false } => {
                state.phase = Phase::Idle;
                false
            }
            Phase::Idle | Phase::Scheduled | Phase::Done => false,
        }
    }

    pub(crate) fn mark_scheduled(&self, r: Ref) {
        if let Some(slot) = self.slot(r) {
            let mut state = slot.lock();
            if state.phase != Phase::Done {
                state.phase = Phase::Scheduled;
            }
        }
    }

    /// Populate `r`. A slot can be written exactly once.
    pub(crate) fn store(&self, r: Ref, entry: CacheEntry) -> ExecResult<()> {
        let slot = self.slot(r).ok_or(ExecError::UnknownChunk(r))?;
        slot.entry
            .set(entry)
            .map_err(|_| ExecError::AlreadyResolved(r))?;
        slot.lock().phase = Phase::Done;
        Ok(())
    }

    /// Take every ref waiting on `r`.
    pub(crate) fn take_waiters(&self, r: Ref) -> Vec<Ref> {
        self.slot(r)
            .map(|slot| std::mem::take(&mut slot.lock().waiters))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: i64) -> CacheEntry {
        CacheEntry {
            data: RawData::int(v),
            is_static: false,
        }
    }

    #[test]
    fn test_write_once() {
        let cache = Cache::new(2);
        assert!(!cache.is_resolved(1));
        cache.store(1, entry(1)).unwrap();
        assert_eq!(cache.get(1).unwrap().data, RawData::int(1));
        assert_eq!(cache.store(1, entry(2)), Err(ExecError::AlreadyResolved(1)));
        assert_eq!(cache.get(1).unwrap().data, RawData::int(1));
        assert!(cache.store(3, entry(1)).is_err());
    }

    #[test]
    fn test_subscribe_after_done_is_refused() {
        let cache = Cache::new(2);
        assert!(cache.subscribe(1, 2));
        assert!(cache.subscribe(1, 2));
        cache.store(1, entry(1)).unwrap();
        assert!(!cache.subscribe(1, 2));
        assert_eq!(cache.take_waiters(1), vec![2]);
        assert!(cache.take_waiters(1).is_empty());
    }

    #[test]
    fn test_begin_while_running_requests_rerun() {
        let cache = Cache::new(1);
        assert!(cache.begin(1));
        assert!(!cache.begin(1));
        assert!(cache.suspend(1));
        assert!(!cache.suspend(1));
        assert!(cache.begin(1));
    }

    #[test]
    fn test_scheduled_and_done_never_restart() {
        let cache = Cache::new(2);
        assert!(cache.begin(1));
        cache.mark_scheduled(1);
        assert!(!cache.begin(1));

        cache.store(2, entry(0)).unwrap();
        assert!(!cache.begin(2));
        cache.mark_scheduled(2);
        assert!(!cache.begin(2));
    }
}
