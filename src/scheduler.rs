// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Delayed callbacks used by the congestion control strategies.
//!
//! A strategy never sleeps. It asks a [`Scheduler`] to deliver a
//! [`SampleTimer`] after some delay and keeps the returned [`TimerHandle`].
//! When the timer fires, the owning connection hands the handle and payload
//! back to the strategy, which acts on it only if the handle is still the one
//! it holds.
//!
//! Every timer is scheduled on behalf of a [`TimerOwner`]. Once the owner is
//! dropped its timers are never delivered, whether or not it cancelled them.

use std::cmp;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;
use std::time::Duration;
use std::time::Instant;

use log::trace;
use priority_queue::double_priority_queue::DoublePriorityQueue;
use rustc_hash::FxHashMap;

use crate::Error;
use crate::Result;

/// Opaque identifier of a scheduled timer.
///
/// Handles are never reused by the queue that issued them, so a handle of a
/// fired or cancelled timer can never alias a live one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Upper bound of a timer delay. Longer delays are clamped.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(24 * 3600);

/// Liveness token of the object owning scheduled timers.
///
/// The scheduler keeps a weak reference to the token of each timer and
/// discards the timer once the token is gone.
#[derive(Debug, Default)]
pub struct TimerOwner(Rc<()>);

impl TimerOwner {
    pub fn new() -> Self {
        Self(Rc::new(()))
    }

    /// Weak reference checked by the scheduler before delivering a timer.
    pub fn watch(&self) -> Weak<()> {
        Rc::downgrade(&self.0)
    }
}

/// Re-estimation callbacks requested by the Westwood family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTimer {
    /// Take a bandwidth sample over `interval` (Westwood+, one per RTT).
    Bandwidth { interval: Duration },

    /// Take a rate-estimate sample over `interval` (Westwood CRB).
    Rate { interval: Duration },
}

/// Event scheduler consumed by congestion control strategies.
pub trait Scheduler {
    /// Current time of the scheduler clock.
    fn now(&self) -> Instant;

    /// Deliver `timer` once `delay` has elapsed, unless `owner` has been
    /// dropped by then.
    fn schedule(&mut self, delay: Duration, timer: SampleTimer, owner: &TimerOwner)
        -> TimerHandle;

    /// Cancel a scheduled timer. Cancelling a fired or already cancelled
    /// timer is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}

/// A virtual-clock event queue.
///
/// Timers are kept sorted by deadline and, within the same deadline, by the
/// order in which they were scheduled. Timers of a dropped owner stay in the
/// queue until they reach its head, but are neither counted nor delivered.
pub struct EventQueue<E> {
    /// Current time.
    now: Instant,

    /// Id of the next scheduled timer.
    next_id: u64,

    /// Pending timers ordered by (deadline, id).
    timers: DoublePriorityQueue<u64, (Instant, u64)>,

    /// Payloads of pending timers, with the owner of owned timers.
    events: FxHashMap<u64, (E, Option<Weak<()>>)>,
}

impl<E> EventQueue<E> {
    /// Create an empty queue whose clock starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            next_id: 0,
            timers: DoublePriorityQueue::new(),
            events: FxHashMap::default(),
        }
    }

    /// Current time of the queue clock.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Return the number of pending timers.
    pub fn len(&self) -> usize {
        self.events
            .values()
            .filter(|(_, owner)| owner_alive(owner))
            .count()
    }

    /// Return if no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a timer firing `delay` after the current time.
    pub fn schedule_event(&mut self, delay: Duration, event: E) -> TimerHandle {
        self.push(delay, event, None)
    }

    /// Add a timer firing `delay` after the current time, unless `owner` is
    /// dropped first.
    pub fn schedule_owned_event(
        &mut self,
        delay: Duration,
        event: E,
        owner: &TimerOwner,
    ) -> TimerHandle {
        self.push(delay, event, Some(owner.watch()))
    }

    /// Delete a pending timer and return its payload.
    pub fn cancel_event(&mut self, handle: TimerHandle) -> Option<E> {
        _ = self.timers.remove(&handle.0);
        self.events.remove(&handle.0).map(|(e, _)| e)
    }

    /// Check whether the given timer is still pending.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.is_live(handle.0)
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.timers.peek_min() {
            Some((id, (deadline, _))) if self.is_live(*id) => Some(*deadline),
            Some(_) => self
                .timers
                .iter()
                .filter(|(id, _)| self.is_live(**id))
                .map(|(_, (deadline, _))| *deadline)
                .min(),
            None => None,
        }
    }

    /// Return the amount of time remaining for the earliest pending timer.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(self.now))
    }

    /// Move the clock forward. The clock never goes backwards.
    pub fn advance_to(&mut self, now: Instant) -> Result<()> {
        if now < self.now {
            return Err(Error::InvalidState(format!(
                "clock moved backwards by {:?}",
                self.now - now
            )));
        }
        self.now = now;
        Ok(())
    }

    /// Advance the clock by `delay`, at most by `MAX_TIMER_DELAY`.
    pub fn advance(&mut self, delay: Duration) {
        self.now = self.deadline(delay);
    }

    /// Return the next timer whose deadline has passed, if any.
    pub fn next_expired(&mut self) -> Option<(TimerHandle, E)> {
        match self.next_deadline() {
            Some(deadline) if deadline <= self.now => self.pop_min(),
            _ => None,
        }
    }

    /// Move the clock to the earliest pending deadline and return that timer.
    pub fn pop_next(&mut self) -> Option<(TimerHandle, E)> {
        let deadline = self.next_deadline()?;
        if deadline > self.now {
            self.now = deadline;
        }
        self.pop_min()
    }

    /// Clear all the timers.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.events.clear();
    }

    fn push(&mut self, delay: Duration, event: E, owner: Option<Weak<()>>) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = self.deadline(delay);
        _ = self.timers.push(id, (deadline, id));
        self.events.insert(id, (event, owner));
        TimerHandle(id)
    }

    /// Instant `delay` after now. Never panics on overflow.
    fn deadline(&self, delay: Duration) -> Instant {
        let delay = cmp::min(delay, MAX_TIMER_DELAY);
        self.now.checked_add(delay).unwrap_or(self.now)
    }

    fn is_live(&self, id: u64) -> bool {
        self.events
            .get(&id)
            .map_or(false, |(_, owner)| owner_alive(owner))
    }

    /// Pop the earliest timer whose owner is still alive. Timers of dropped
    /// owners found on the way are discarded.
    fn pop_min(&mut self) -> Option<(TimerHandle, E)> {
        while let Some((id, _)) = self.timers.pop_min() {
            match self.events.remove(&id) {
                Some((e, owner)) if owner_alive(&owner) => return Some((TimerHandle(id), e)),
                Some(_) => trace!("event queue discard timer#{} of dropped owner", id),
                None => (),
            }
        }
        None
    }
}

fn owner_alive(owner: &Option<Weak<()>>) -> bool {
    owner.as_ref().map_or(true, |w| w.strong_count() > 0)
}

impl<E: From<SampleTimer>> Scheduler for EventQueue<E> {
    fn now(&self) -> Instant {
        self.now
    }

    fn schedule(
        &mut self,
        delay: Duration,
        timer: SampleTimer,
        owner: &TimerOwner,
    ) -> TimerHandle {
        self.schedule_owned_event(delay, E::from(timer), owner)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        _ = self.cancel_event(handle);
    }
}

impl<E> fmt::Debug for EventQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event queue pending={} next={:?}", self.len(), self.time_remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BW: SampleTimer = SampleTimer::Bandwidth {
        interval: Duration::from_millis(100),
    };

    const RE: SampleTimer = SampleTimer::Rate {
        interval: Duration::from_millis(400),
    };

    #[test]
    fn schedule() {
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let owner = TimerOwner::new();
        assert!(q.is_empty());

        let h1 = q.schedule(Duration::from_millis(100), BW, &owner);
        let h2 = q.schedule(Duration::from_millis(400), RE, &owner);
        assert_ne!(h1, h2);
        assert_eq!(q.len(), 2);
        assert!(q.is_pending(h1));
        assert!(q.is_pending(h2));
        assert_eq!(q.time_remaining(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn cancel() {
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let owner = TimerOwner::new();
        let h = q.schedule(Duration::from_millis(100), BW, &owner);

        q.cancel(h);
        assert!(q.is_empty());
        assert!(!q.is_pending(h));

        // Cancelling again is harmless.
        q.cancel(h);
        assert!(q.is_empty());
        assert_eq!(q.cancel_event(h), None);
    }

    #[test]
    fn handles_not_reused() {
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let owner = TimerOwner::new();
        let h1 = q.schedule(Duration::from_millis(100), BW, &owner);
        q.cancel(h1);
        let h2 = q.schedule(Duration::from_millis(100), BW, &owner);
        assert_ne!(h1, h2);
        assert!(!q.is_pending(h1));
        assert!(q.is_pending(h2));
    }

    #[test]
    fn expired() {
        let now = Instant::now();
        let mut q: EventQueue<u32> = EventQueue::new(now);
        let h0 = q.schedule_event(Duration::from_millis(100), 0);
        let h1 = q.schedule_event(Duration::from_millis(200), 1);
        let h2 = q.schedule_event(Duration::from_millis(300), 2);
        assert!(q.next_expired().is_none());

        q.advance(Duration::from_millis(100));
        assert_eq!(q.next_expired(), Some((h0, 0)));
        assert!(q.next_expired().is_none());

        q.cancel_event(h2);
        let h3 = q.schedule_event(Duration::from_millis(900), 3);
        let h4 = q.schedule_event(Duration::from_millis(900), 4);
        q.advance_to(now + Duration::from_millis(1000)).unwrap();
        assert_eq!(q.next_expired(), Some((h1, 1)));
        assert_eq!(q.next_expired(), Some((h3, 3)));
        assert_eq!(q.next_expired(), Some((h4, 4)));
        assert!(q.is_empty());
    }

    #[test]
    fn same_deadline_fifo() {
        let mut q: EventQueue<u32> = EventQueue::new(Instant::now());
        for i in 0..10 {
            q.schedule_event(Duration::from_millis(50), i);
        }
        q.advance(Duration::from_millis(50));
        for i in 0..10 {
            assert_eq!(q.next_expired().map(|(_, e)| e), Some(i));
        }
    }

    #[test]
    fn pop_next() {
        let now = Instant::now();
        let mut q: EventQueue<SampleTimer> = EventQueue::new(now);
        let owner = TimerOwner::new();
        assert!(q.pop_next().is_none());

        let h = q.schedule(Duration::from_millis(400), RE, &owner);
        assert_eq!(q.pop_next(), Some((h, RE)));
        assert_eq!(q.now(), now + Duration::from_millis(400));
    }

    #[test]
    fn clock_never_goes_backwards() {
        let now = Instant::now();
        let mut q: EventQueue<SampleTimer> = EventQueue::new(now + Duration::from_secs(1));
        assert!(matches!(q.advance_to(now), Err(Error::InvalidState(_))));
        assert_eq!(q.now(), now + Duration::from_secs(1));
    }

    #[test]
    fn clear() {
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let owner = TimerOwner::new();
        q.schedule(Duration::from_millis(100), BW, &owner);
        q.schedule(Duration::from_millis(400), RE, &owner);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.time_remaining(), None);
    }

    #[test]
    fn huge_delay_is_clamped() {
        let now = Instant::now();
        let mut q: EventQueue<u32> = EventQueue::new(now);
        let h = q.schedule_event(Duration::MAX, 0);
        assert_eq!(q.time_remaining(), Some(MAX_TIMER_DELAY));

        q.advance(Duration::MAX);
        assert_eq!(q.now(), now + MAX_TIMER_DELAY);
        assert_eq!(q.next_expired(), Some((h, 0)));
    }

    #[test]
    fn dropped_owner_timers_not_delivered() {
        let mut q: EventQueue<SampleTimer> = EventQueue::new(Instant::now());
        let owner = TimerOwner::new();
        let gone = TimerOwner::new();

        let h1 = q.schedule(Duration::from_millis(100), BW, &gone);
        let h2 = q.schedule(Duration::from_millis(200), BW, &gone);
        let h3 = q.schedule(Duration::from_millis(400), RE, &owner);
        let h4 = q.schedule_event(Duration::from_millis(500), RE);
        assert_eq!(q.len(), 4);

        drop(gone);
        assert_eq!(q.len(), 2);
        assert!(!q.is_pending(h1));
        assert!(!q.is_pending(h2));
        assert!(q.is_pending(h3));
        assert_eq!(q.time_remaining(), Some(Duration::from_millis(400)));

        q.advance(Duration::from_millis(300));
        assert!(q.next_expired().is_none());
        assert_eq!(q.pop_next(), Some((h3, RE)));
        assert_eq!(q.pop_next(), Some((h4, RE)));
        assert!(q.pop_next().is_none());
        assert!(q.is_empty());
    }
}
