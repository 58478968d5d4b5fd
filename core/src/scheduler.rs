//! Single time axis shared by every hardware component.
//!
//! Events are kept in a fixed-capacity min-heap keyed by `(timestamp, priority)` with a UID
//! tie-break, so same-cycle ordering is deterministic. Cancellation is handle-based: a handle
//! identifies a slot, which is freed by swapping with the last live slot and re-heapifying,
//! never by deallocating storage.

use std::cmp::Ordering;

pub const SCHEDULER_CAPACITY: usize = 64;

/// Identifies which subsystem callback an `Event` dispatches to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventClass {
    Sentinel = 0,
    PpuPhaseTransition = 1,
    PpuAffineReload = 2,
    ApuSequencerTick = 3,
    ApuSampleTick = 4,
    TimerOverflow = 5,
    TimerWriteReload = 6,
    TimerWriteControl = 7,
    DmaActivate = 8,
    IrqAssert = 9,
    EepromReady = 10,
}

impl EventClass {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => EventClass::PpuPhaseTransition,
            2 => EventClass::PpuAffineReload,
            3 => EventClass::ApuSequencerTick,
            4 => EventClass::ApuSampleTick,
            5 => EventClass::TimerOverflow,
            6 => EventClass::TimerWriteReload,
            7 => EventClass::TimerWriteControl,
            8 => EventClass::DmaActivate,
            9 => EventClass::IrqAssert,
            10 => EventClass::EepromReady,
            _ => EventClass::Sentinel,
        }
    }
}

/// A stable reference to a live event, returned by [`Scheduler::add`].
///
/// Handles only remain valid until the referenced event fires or is cancelled; reusing a stale
/// handle is a programmer error and will either cancel the wrong event or panic.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EventHandle {
    uid: u64,
}

impl EventHandle {
    pub(crate) fn from_uid(uid: u64) -> Self {
        Self { uid }
    }

    pub(crate) fn uid_value(&self) -> u64 {
        self.uid
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Key {
    timestamp: u64,
    priority: u8,
    uid: u64,
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.priority, self.uid).cmp(&(other.timestamp, other.priority, other.uid))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Event {
    key: Key,
    pub class: EventClass,
    pub user_data: u64,
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl Event {
    pub fn uid(&self) -> u64 {
        self.key.uid
    }

    pub fn timestamp(&self) -> u64 {
        self.key.timestamp
    }
}

#[derive(Debug)]
pub struct Scheduler {
    /// Binary min-heap stored directly on a flat array: `heap[0]` is always the earliest event,
    /// and every slot's children live at `2i+1`/`2i+2`. A cancelled slot is freed by swapping in
    /// the last live slot and sifting it to its correct place, so the array never shrinks or
    /// reallocates outside of `push`/`pop`.
    heap: Vec<Event>,
    pub current_time: u64,
    next_uid: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        let mut heap = Vec::with_capacity(SCHEDULER_CAPACITY);
        // Tail sentinel: guarantees the heap is never empty and that a bug which forgets to
        // reschedule something real surfaces as a panic rather than a silent stall.
        heap.push(Event {
            key: Key { timestamp: u64::MAX, priority: 255, uid: 0 },
            class: EventClass::Sentinel,
            user_data: 0,
        });

        Self { heap, current_time: 0, next_uid: 1 }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].key.cmp(&self.heap[parent].key) == Ordering::Less {
                self.heap.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < len && self.heap[left].key.cmp(&self.heap[smallest].key) == Ordering::Less {
                smallest = left;
            }
            if right < len && self.heap[right].key.cmp(&self.heap[smallest].key) == Ordering::Less {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.heap.swap(index, smallest);
            index = smallest;
        }
    }

    /// Removes the slot at `index`, swapping in the last live slot and sifting it to its
    /// correct place in O(log n). No-op if `index` is already the last slot.
    fn remove_at(&mut self, index: usize) {
        let last = self.heap.len() - 1;
        if index != last {
            self.heap.swap(index, last);
        }
        self.heap.pop();
        if index < self.heap.len() {
            self.sift_up(index);
            self.sift_down(index);
        }
    }

    /// Schedule `class` to fire `delay` cycles from now, with the given `priority` (lower fires
    /// first among events at the same timestamp) and opaque `user_data` passed back to the
    /// dispatcher.
    pub fn add(&mut self, delay: u64, class: EventClass, priority: u8, user_data: u64) -> EventHandle {
        assert!(
            self.heap.len() < SCHEDULER_CAPACITY,
            "scheduler heap overflow: more than {} live events",
            SCHEDULER_CAPACITY
        );
        let uid = self.next_uid;
        self.next_uid += 1;
        let key = Key { timestamp: self.current_time + delay, priority, uid };
        self.heap.push(Event { key, class, user_data });
        self.sift_up(self.heap.len() - 1);
        log::trace!("scheduler: add {:?} at {} (uid {})", class, key.timestamp, uid);
        EventHandle { uid }
    }

    /// Remove the event referenced by `handle`, if it hasn't already fired. No-op otherwise.
    pub fn cancel(&mut self, handle: EventHandle) {
        if let Some(index) = self.heap.iter().position(|e| e.key.uid == handle.uid) {
            self.remove_at(index);
        }
        log::trace!("scheduler: cancel uid {}", handle.uid);
    }

    /// Advance time by `delta_cycles`, dispatching every event now due via `dispatch` before
    /// returning. `dispatch` receives `(class, user_data, event_timestamp)`.
    pub fn add_cycles(&mut self, delta_cycles: u64, mut dispatch: impl FnMut(EventClass, u64, u64)) {
        let target = self.current_time + delta_cycles;
        while let Some(&event) = self.heap.first() {
            if event.key.timestamp > target {
                break;
            }
            self.remove_at(0);
            self.current_time = event.key.timestamp;
            if event.class == EventClass::Sentinel {
                panic!("scheduler: sentinel event fired, heap ran dry");
            }
            dispatch(event.class, event.user_data, event.key.timestamp);
        }
        self.current_time = target;
    }

    pub fn now(&self) -> u64 {
        self.current_time
    }

    /// Dumps every live event as `(timestamp, priority, uid, class, user_data)`, used by
    /// save-state encoding. `next_uid` is exported separately so `import` can resume handing out
    /// fresh uids without colliding with any restored event.
    pub(crate) fn export_events(&self) -> Vec<(u64, u8, u64, EventClass, u64)> {
        self.heap
            .iter()
            .filter(|e| e.class != EventClass::Sentinel)
            .map(|e| (e.key.timestamp, e.key.priority, e.key.uid, e.class, e.user_data))
            .collect()
    }

    pub(crate) fn next_uid_value(&self) -> u64 {
        self.next_uid
    }

    /// Rebuilds the heap from a save state: restores `current_time`, `next_uid`, and every event
    /// with its original uid intact so subsystem-held `EventHandle`s round-trip unchanged.
    pub(crate) fn import(&mut self, current_time: u64, next_uid: u64, events: Vec<(u64, u8, u64, EventClass, u64)>) {
        let mut heap = Vec::with_capacity(SCHEDULER_CAPACITY);
        heap.push(Event {
            key: Key { timestamp: u64::MAX, priority: 255, uid: 0 },
            class: EventClass::Sentinel,
            user_data: 0,
        });
        for (timestamp, priority, uid, class, user_data) in events {
            heap.push(Event { key: Key { timestamp, priority, uid }, class, user_data });
        }
        self.heap = heap;
        // `heap` was appended in arbitrary (import-order) fashion rather than via `add`'s
        // sift-up, so restore the invariant with a standard bottom-up heapify.
        for index in (0..self.heap.len() / 2).rev() {
            self.sift_down(index);
        }
        self.current_time = current_time;
        self.next_uid = next_uid;
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.heap.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_invariant_holds_after_mixed_operations() {
        let mut sched = Scheduler::new();
        let mut handles = Vec::new();
        for i in 0..10 {
            handles.push(sched.add(100 - i, EventClass::TimerOverflow, 0, i));
        }
        sched.cancel(handles[3]);
        sched.cancel(handles[7]);
        // Draining via add_cycles should observe strictly non-decreasing timestamps.
        let mut last = 0u64;
        sched.add_cycles(1000, |_, _, ts| {
            assert!(ts >= last);
            last = ts;
        });
    }

    #[test]
    fn same_timestamp_priority_breaks_tie() {
        let mut sched = Scheduler::new();
        let order = std::cell::RefCell::new(Vec::new());
        sched.add(10, EventClass::DmaActivate, 2, 0);
        sched.add(10, EventClass::IrqAssert, 0, 0);
        sched.add(10, EventClass::TimerOverflow, 1, 0);
        sched.add_cycles(10, |class, _, _| order.borrow_mut().push(class));
        assert_eq!(
            order.into_inner(),
            vec![EventClass::IrqAssert, EventClass::TimerOverflow, EventClass::DmaActivate]
        );
    }

    #[test]
    fn cancelled_event_never_dispatches() {
        let mut sched = Scheduler::new();
        let handle = sched.add(5, EventClass::EepromReady, 0, 42);
        sched.cancel(handle);
        let mut fired = false;
        sched.add_cycles(100, |_, _, _| fired = true);
        assert!(!fired);
    }

    #[test]
    fn sentinel_keeps_heap_nonempty() {
        let sched = Scheduler::new();
        assert_eq!(sched.len(), 1);
    }
}
