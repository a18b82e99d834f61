use crate::prelude::{WHEEL_SLOTS, WHEEL_TICK_MS};
use std::time::{Duration, Instant};

/// Opaque lookup key for a live timer. `generation` guards against reusing a
/// handle after its slot has cycled back around to a different timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    slot: usize,
    id: u64,
}

struct TimerEntry {
    id: u64,
    rotations: u32,
    canceled: bool,
    repeat: Option<Duration>,
    callback: Box<dyn FnMut()>,
}

/// A hashed timer wheel owned by exactly one reactor thread. No locking: the
/// owning thread is the only reader and writer.
pub struct TimerWheel {
    slots: Vec<Vec<TimerEntry>>,
    current_slot: usize,
    tick: Duration,
    last_tick: Instant,
    next_id: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::with_params(WHEEL_SLOTS, Duration::from_millis(WHEEL_TICK_MS))
    }

    pub fn with_params(slots: usize, tick: Duration) -> Self {
        Self {
            slots: (0..slots).map(|_| Vec::new()).collect(),
            current_slot: 0,
            tick,
            last_tick: Instant::now(),
            next_id: 0,
        }
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn ticks_for(&self, timeout: Duration) -> u64 {
        let tick_ms = self.tick.as_millis().max(1) as u64;
        (timeout.as_millis() as u64 / tick_ms).max(1)
    }

    pub fn insert<F: FnMut() + 'static>(&mut self, timeout: Duration, callback: F) -> TimerHandle {
        self.insert_inner(timeout, None, callback)
    }

    pub fn insert_repeating<F: FnMut() + 'static>(&mut self, interval: Duration, callback: F) -> TimerHandle {
        self.insert_inner(interval, Some(interval), callback)
    }

    fn insert_inner<F: FnMut() + 'static>(
        &mut self,
        timeout: Duration,
        repeat: Option<Duration>,
        callback: F,
    ) -> TimerHandle {
        let ticks = self.ticks_for(timeout);
        let slot_count = self.slot_count() as u64;
        let slot = (self.current_slot as u64 + ticks) % slot_count;
        let rotations = (ticks / slot_count) as u32;

        let id = self.next_id;
        self.next_id += 1;

        self.slots[slot as usize].push(TimerEntry {
            id,
            rotations,
            canceled: false,
            repeat,
            callback: Box::new(callback),
        });

        TimerHandle { slot: slot as usize, id }
    }

    /// Cancels a timer. Safe to call with a handle whose timer already fired
    /// or was already canceled (no-op).
    pub fn cancel(&mut self, handle: TimerHandle) {
        if let Some(bucket) = self.slots.get_mut(handle.slot) {
            if let Some(entry) = bucket.iter_mut().find(|e| e.id == handle.id) {
                entry.canceled = true;
            }
        }
    }

    /// Refreshes a timer's timeout by canceling it and reinserting with a
    /// fresh deadline. Returns the new handle, since the slot generally
    /// changes.
    pub fn refresh<F: FnMut() + 'static>(&mut self, handle: TimerHandle, timeout: Duration, callback: F) -> TimerHandle {
        self.cancel(handle);
        self.insert(timeout, callback)
    }

    /// Milliseconds until the wheel next needs attention; used as the event
    /// loop's readiness-wait bound.
    pub fn next_timeout_ms(&self) -> u64 {
        let elapsed = self.last_tick.elapsed();
        self.tick.saturating_sub(elapsed).as_millis() as u64
    }

    /// Advances the wheel if at least one tick interval has elapsed,
    /// invoking every timer due in the current slot. Due callbacks are
    /// captured into a local list and removed from the slot before any of
    /// them run, so a callback that inserts a new timer can never observe
    /// the slot mid-mutation.
    pub fn tick(&mut self) {
        let elapsed = self.last_tick.elapsed();
        if elapsed + Duration::from_millis(1) < self.tick {
            return;
        }

        let slot_count = self.slot_count();
        let bucket = &mut self.slots[self.current_slot];

        let mut due = Vec::new();
        let mut still_pending = Vec::new();
        for mut entry in bucket.drain(..) {
            if entry.canceled {
                continue;
            }
            if entry.rotations > 0 {
                entry.rotations -= 1;
                still_pending.push(entry);
            } else {
                due.push(entry);
            }
        }
        *bucket = still_pending;

        for mut entry in due {
            (entry.callback)();
            if let Some(interval) = entry.repeat {
                let ticks = self.ticks_for(interval);
                let slot = (self.current_slot as u64 + ticks) % slot_count as u64;
                let rotations = (ticks / slot_count as u64) as u32;
                self.slots[slot as usize].push(TimerEntry {
                    id: entry.id,
                    rotations,
                    canceled: false,
                    repeat: entry.repeat,
                    callback: entry.callback,
                });
            }
        }

        self.current_slot = (self.current_slot + 1) % slot_count;
        self.last_tick = Instant::now();
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread::sleep;

    #[test]
    fn single_shot_timer_fires_once() {
        let mut wheel = TimerWheel::with_params(8, Duration::from_millis(5));
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        wheel.insert(Duration::from_millis(5), move || *f.borrow_mut() += 1);

        for _ in 0..8 {
            sleep(Duration::from_millis(6));
            wheel.tick();
        }

        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn canceled_timer_never_fires() {
        let mut wheel = TimerWheel::with_params(8, Duration::from_millis(5));
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        let handle = wheel.insert(Duration::from_millis(5), move || *f.borrow_mut() += 1);
        wheel.cancel(handle);

        for _ in 0..8 {
            sleep(Duration::from_millis(6));
            wheel.tick();
        }

        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn repeating_timer_fires_multiple_times() {
        let mut wheel = TimerWheel::with_params(4, Duration::from_millis(5));
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        wheel.insert_repeating(Duration::from_millis(5), move || *f.borrow_mut() += 1);

        for _ in 0..20 {
            sleep(Duration::from_millis(6));
            wheel.tick();
        }

        assert!(*fired.borrow() >= 2, "expected at least 2 fires, got {}", fired.borrow());
    }

    #[test]
    fn tick_before_interval_elapses_is_a_no_op() {
        let mut wheel = TimerWheel::with_params(8, Duration::from_millis(50));
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        wheel.insert(Duration::from_millis(50), move || *f.borrow_mut() += 1);

        wheel.tick(); // far less than 50ms has elapsed
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn multi_rotation_timer_waits_full_rotation_count() {
        let mut wheel = TimerWheel::with_params(4, Duration::from_millis(5));
        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        // 4 slots * 5ms = 20ms per rotation; ask for 30ms => 1 rotation + 2 slots.
        wheel.insert(Duration::from_millis(30), move || *f.borrow_mut() += 1);

        for _ in 0..5 {
            sleep(Duration::from_millis(6));
            wheel.tick();
        }
        assert_eq!(*fired.borrow(), 0, "should not fire before completing its rotation");

        for _ in 0..5 {
            sleep(Duration::from_millis(6));
            wheel.tick();
        }
        assert_eq!(*fired.borrow(), 1);
    }
}
