//! Discrete-event queue.
//!
//! Events are ordered by `(time, insertion sequence)`, so events scheduled
//! for the same virtual millisecond fire in the order they were queued.
//! Cancellation is lazy: a cancelled key is remembered and skipped when it
//! reaches the front of the heap.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde::{Deserialize, Serialize};

use crate::combatant::CombatantId;
use crate::grid::Coord;
use crate::moves::MoveId;

/// Handle to a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey(pub u64);

/// Something that happens at a scheduled virtual time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A combatant's turn.
    NextTurn {
        /// Who acts.
        combatant: CombatantId,
        /// Delay this turn was scheduled with; statuses decay by it.
        delay_ms: i64,
    },
    /// One effect step of an in-flight move.
    MoveStep {
        /// Move user.
        user: CombatantId,
        /// Move being cast.
        move_id: MoveId,
        /// Locked target cell.
        target: Coord,
        /// Zero-based step index.
        step: u32,
    },
    /// An in-flight move finishes.
    MoveComplete {
        /// Move user.
        user: CombatantId,
        /// Move being cast.
        move_id: MoveId,
    },
}

impl Event {
    /// The combatant this event belongs to.
    #[must_use]
    pub const fn owner(&self) -> CombatantId {
        match self {
            Self::NextTurn { combatant, .. } => *combatant,
            Self::MoveStep { user, .. } | Self::MoveComplete { user, .. } => *user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Scheduled {
    at: i64,
    seq: u64,
    event: Event,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for earliest-first.
        match other.at.cmp(&self.at) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered event queue with a virtual clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    cancelled: BTreeSet<u64>,
    next_seq: u64,
    now: i64,
}

impl EventQueue {
    /// An empty queue at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in ms.
    #[must_use]
    pub const fn now(&self) -> i64 {
        self.now
    }

    /// Schedule an event `delay_ms` from now (negative delays clamp to now).
    pub fn schedule_in(&mut self, delay_ms: i64, event: Event) -> EventKey {
        self.schedule_at(self.now.saturating_add(delay_ms.max(0)), event)
    }

    /// Schedule an event at an absolute time, never earlier than now.
    pub fn schedule_at(&mut self, at: i64, event: Event) -> EventKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            at: at.max(self.now),
            seq,
            event,
        });
        EventKey(seq)
    }

    /// Cancel a pending event. Returns false if it already fired or was
    /// never scheduled.
    pub fn cancel(&mut self, key: EventKey) -> bool {
        if key.0 >= self.next_seq || !self.heap.iter().any(|s| s.seq == key.0) {
            return false;
        }
        self.cancelled.insert(key.0)
    }

    /// Time of the next live event.
    pub fn peek_time(&mut self) -> Option<i64> {
        self.discard_cancelled();
        self.heap.peek().map(|s| s.at)
    }

    /// Pop the next live event, advancing the clock to its time.
    pub fn pop(&mut self) -> Option<(EventKey, Event)> {
        self.discard_cancelled();
        let next = self.heap.pop()?;
        self.now = next.at;
        Some((EventKey(next.seq), next.event))
    }

    /// Number of live events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    /// Whether no live events remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance the clock without firing anything.
    pub fn advance_to(&mut self, at: i64) {
        self.now = self.now.max(at);
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.cancelled.remove(&top.seq) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

/// What happens when a cancellable event is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelHook {
    /// Drop the event.
    Discard,
    /// The event was a move completion: end the move and give the
    /// combatant its turns back.
    ResumeTurns,
}

/// A registered cancellable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellable {
    /// The queued event.
    pub key: EventKey,
    /// What to do on cancellation.
    pub hook: CancelHook,
}

/// Per-combatant lists of in-flight cancellable events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cancellables {
    by_combatant: BTreeMap<CombatantId, Vec<Cancellable>>,
}

impl Cancellables {
    /// Track an event for `owner`.
    pub fn register(&mut self, owner: CombatantId, key: EventKey, hook: CancelHook) {
        self.by_combatant
            .entry(owner)
            .or_default()
            .push(Cancellable { key, hook });
    }

    /// Forget an event that fired normally.
    pub fn fired(&mut self, owner: CombatantId, key: EventKey) {
        if let Some(list) = self.by_combatant.get_mut(&owner) {
            list.retain(|c| c.key != key);
            if list.is_empty() {
                self.by_combatant.remove(&owner);
            }
        }
    }

    /// Take every tracked event of `owner`, in registration order.
    pub fn drain(&mut self, owner: CombatantId) -> Vec<Cancellable> {
        self.by_combatant.remove(&owner).unwrap_or_default()
    }

    /// Number of tracked events for `owner`.
    #[must_use]
    pub fn count(&self, owner: CombatantId) -> usize {
        self.by_combatant.get(&owner).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(id: u32) -> Event {
        Event::NextTurn {
            combatant: CombatantId(id),
            delay_ms: 0,
        }
    }

    #[test]
    fn test_time_order() {
        let mut queue = EventQueue::new();
        queue.schedule_at(300, turn(1));
        queue.schedule_at(100, turn(2));
        queue.schedule_at(200, turn(3));

        let order: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|(_, e)| e.owner().0)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(queue.now(), 300);
    }

    #[test]
    fn test_same_time_insertion_order() {
        let mut queue = EventQueue::new();
        for id in 0..10 {
            queue.schedule_at(500, turn(id));
        }
        let order: Vec<u32> = std::iter::from_fn(|| queue.pop())
            .map(|(_, e)| e.owner().0)
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_skips_event() {
        let mut queue = EventQueue::new();
        let a = queue.schedule_at(10, turn(1));
        queue.schedule_at(20, turn(2));
        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        assert_eq!(queue.len(), 1);

        let (_, event) = queue.pop().unwrap();
        assert_eq!(event.owner(), CombatantId(2));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_cancel_fired_event_is_noop() {
        let mut queue = EventQueue::new();
        let a = queue.schedule_at(10, turn(1));
        queue.pop();
        assert!(!queue.cancel(a));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_schedule_in_is_relative_to_now() {
        let mut queue = EventQueue::new();
        queue.schedule_at(1000, turn(1));
        queue.pop();
        queue.schedule_in(250, turn(2));
        assert_eq!(queue.peek_time(), Some(1250));
    }

    #[test]
    fn test_cancellables_drain() {
        let mut tracked = Cancellables::default();
        let owner = CombatantId(4);
        tracked.register(owner, EventKey(1), CancelHook::Discard);
        tracked.register(owner, EventKey(2), CancelHook::ResumeTurns);
        tracked.fired(owner, EventKey(1));
        assert_eq!(tracked.count(owner), 1);

        let drained = tracked.drain(owner);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].hook, CancelHook::ResumeTurns);
        assert_eq!(tracked.count(owner), 0);
    }
}
