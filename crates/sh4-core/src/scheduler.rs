//! Virtual cycle clock shared by the CPU and timed peripherals.
//!
//! `run` advances every registered device in bounded slices, in
//! registration order. A slice ends at the run target, one slice length past
//! the shared clock, or the next timer deadline, whichever comes first, so
//! no device ever runs more than one slice ahead of the others. Timers fire
//! synchronously between slices once the shared clock has reached their
//! deadline.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Weak;

use tracing::trace;

use crate::fault::EmulatorError;
use crate::memory::AddressSpace;

/// A unit of hardware advanced by the scheduler.
pub trait ScheduledDevice {
    /// Short device name for logs.
    fn name(&self) -> &'static str;

    /// Runs for at most `cycles` and returns the cycles actually consumed.
    /// Zero means the device is idle for the rest of the slice.
    ///
    /// # Errors
    ///
    /// Terminal device failures, which end the scheduler run.
    fn run(&mut self, space: &mut AddressSpace, cycles: u64) -> Result<u64, EmulatorError>;
}

/// What a timer wants after firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Remove the timer.
    Done,
    /// Fire again this many cycles after the current deadline.
    Reschedule(u64),
}

/// Timer callback; runs on the emulation thread between slices.
pub type TimerCallback = Box<dyn FnMut() -> TimerAction>;

/// Handle returned by [`Scheduler::start_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct DeviceSlot {
    device: Weak<RefCell<dyn ScheduledDevice>>,
    clock: u64,
}

/// Slice-based cooperative scheduler.
pub struct Scheduler {
    now: u64,
    slice_cycles: u64,
    devices: Vec<DeviceSlot>,
    timers: BTreeMap<(u64, u64), TimerCallback>,
    deadlines: HashMap<u64, u64>,
    next_seq: u64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("slice_cycles", &self.slice_cycles)
            .field("devices", &self.devices.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler with the given slice length (at least one cycle).
    #[must_use]
    pub fn new(slice_cycles: u64) -> Self {
        Self {
            now: 0,
            slice_cycles: slice_cycles.max(1),
            devices: Vec::new(),
            timers: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Shared clock: the slowest live device's position.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Slice length in cycles.
    #[must_use]
    pub const fn slice_cycles(&self) -> u64 {
        self.slice_cycles
    }

    /// Registers a device; it starts at the current shared clock.
    pub fn add_device(&mut self, device: Weak<RefCell<dyn ScheduledDevice>>) {
        self.devices.push(DeviceSlot {
            device,
            clock: self.now,
        });
    }

    /// Number of registered devices, live or dropped.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Private clock of the `index`th registered device.
    #[must_use]
    pub fn device_clock(&self, index: usize) -> Option<u64> {
        self.devices.get(index).map(|slot| slot.clock)
    }

    /// Schedules `callback` to fire `delay` cycles from now.
    pub fn start_timer(&mut self, delay: u64, callback: TimerCallback) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.now.saturating_add(delay);
        self.timers.insert((deadline, seq), callback);
        self.deadlines.insert(seq, deadline);
        TimerHandle(seq)
    }

    /// Removes a pending timer. Returns false if it already finished.
    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.deadlines
            .remove(&handle.0)
            .and_then(|deadline| self.timers.remove(&(deadline, handle.0)))
            .is_some()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn next_deadline(&self) -> Option<u64> {
        self.timers.keys().next().map(|&(deadline, _)| deadline)
    }

    fn fire_due(&mut self) {
        while let Some(entry) = self.timers.first_entry() {
            let (deadline, seq) = *entry.key();
            if deadline > self.now {
                break;
            }
            let mut callback = entry.remove();
            match callback() {
                TimerAction::Done => {
                    self.deadlines.remove(&seq);
                }
                TimerAction::Reschedule(delay) => {
                    let next = deadline.saturating_add(delay.max(1));
                    self.timers.insert((next, seq), callback);
                    self.deadlines.insert(seq, next);
                }
            }
        }
    }

    /// Advances the shared clock by `for_cycles`.
    ///
    /// Returns the cycles the shared clock actually advanced.
    ///
    /// # Errors
    ///
    /// The first device error, which ends the run.
    pub fn run(&mut self, space: &mut AddressSpace, for_cycles: u64) -> Result<u64, EmulatorError> {
        let start = self.now;
        let target = start.saturating_add(for_cycles);

        while self.now < target {
            self.fire_due();
            let mut slice_end = target.min(self.now.saturating_add(self.slice_cycles));
            if let Some(deadline) = self.next_deadline() {
                slice_end = slice_end.min(deadline.max(self.now + 1));
            }

            let mut shared = slice_end;
            for slot in &mut self.devices {
                let Some(device) = slot.device.upgrade() else {
                    continue;
                };
                if slot.clock < slice_end {
                    let budget = slice_end - slot.clock;
                    let used = device.borrow_mut().run(space, budget)?;
                    slot.clock = if used == 0 {
                        slice_end
                    } else {
                        slot.clock + used.min(budget)
                    };
                }
                shared = shared.min(slot.clock);
            }
            trace!(now = self.now, slice_end, shared, "slice complete");
            self.now = self.now.max(shared);
        }
        self.fire_due();
        Ok(self.now - start)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::trap::{HostTrapLayer, SoftwarePlatform};

    /// Device that consumes a fixed chunk per call and logs every budget.
    struct Chunked {
        chunk: u64,
        budgets: Vec<u64>,
    }

    impl ScheduledDevice for Chunked {
        fn name(&self) -> &'static str {
            "chunked"
        }

        fn run(&mut self, _: &mut AddressSpace, cycles: u64) -> Result<u64, EmulatorError> {
            self.budgets.push(cycles);
            Ok(self.chunk.min(cycles))
        }
    }

    fn space() -> AddressSpace {
        AddressSpace::new(HostTrapLayer::shared(Box::new(SoftwarePlatform)))
    }

    fn chunked(chunk: u64) -> Rc<RefCell<Chunked>> {
        Rc::new(RefCell::new(Chunked {
            chunk,
            budgets: Vec::new(),
        }))
    }

    #[test]
    fn slices_are_bounded() {
        let device = chunked(u64::MAX);
        let mut scheduler = Scheduler::new(100);
        let weak = Rc::downgrade(&device);
        let weak: Weak<RefCell<dyn ScheduledDevice>> = weak;
        scheduler.add_device(weak);

        assert_eq!(scheduler.run(&mut space(), 250).unwrap(), 250);
        assert_eq!(device.borrow().budgets, vec![100, 100, 50]);
    }

    #[test]
    fn idle_device_is_synced_to_slice_end() {
        let idle = chunked(0);
        let mut scheduler = Scheduler::new(64);
        let weak = Rc::downgrade(&idle);
        let weak: Weak<RefCell<dyn ScheduledDevice>> = weak;
        scheduler.add_device(weak);
        assert_eq!(scheduler.run(&mut space(), 128).unwrap(), 128);
        assert_eq!(scheduler.device_clock(0), Some(128));
    }

    #[test]
    fn shared_clock_follows_slowest_device() {
        let fast = chunked(u64::MAX);
        let slow = chunked(10);
        let mut scheduler = Scheduler::new(40);
        let fast_weak = Rc::downgrade(&fast);
        let fast_weak: Weak<RefCell<dyn ScheduledDevice>> = fast_weak;
        let slow_weak = Rc::downgrade(&slow);
        let slow_weak: Weak<RefCell<dyn ScheduledDevice>> = slow_weak;
        scheduler.add_device(fast_weak);
        scheduler.add_device(slow_weak);

        scheduler.run(&mut space(), 80).unwrap();
        assert_eq!(scheduler.now(), 80);
        // The fast device never got a budget reaching past now + one slice.
        assert!(fast.borrow().budgets.iter().all(|&b| b <= 40));
    }

    #[test]
    fn dropped_devices_are_skipped() {
        let device = chunked(u64::MAX);
        let mut scheduler = Scheduler::new(16);
        let weak = Rc::downgrade(&device);
        let weak: Weak<RefCell<dyn ScheduledDevice>> = weak;
        scheduler.add_device(weak);
        drop(device);
        assert_eq!(scheduler.run(&mut space(), 32).unwrap(), 32);
    }

    #[test]
    fn timers_fire_at_deadline_in_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new(1000);
        for name in ["a", "b"] {
            let log = Rc::clone(&log);
            scheduler.start_timer(
                50,
                Box::new(move || {
                    log.borrow_mut().push(name);
                    TimerAction::Done
                }),
            );
        }
        scheduler.run(&mut space(), 49).unwrap();
        assert!(log.borrow().is_empty());
        scheduler.run(&mut space(), 1).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn timer_deadline_splits_slice() {
        let device = chunked(u64::MAX);
        let mut scheduler = Scheduler::new(100);
        let weak = Rc::downgrade(&device);
        let weak: Weak<RefCell<dyn ScheduledDevice>> = weak;
        scheduler.add_device(weak);
        scheduler.start_timer(30, Box::new(|| TimerAction::Done));
        scheduler.run(&mut space(), 100).unwrap();
        assert_eq!(device.borrow().budgets, vec![30, 70]);
    }

    #[test]
    fn periodic_timer_reschedules_until_cancelled() {
        let fired = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new(1000);
        let counter = Rc::clone(&fired);
        let handle = scheduler.start_timer(
            10,
            Box::new(move || {
                counter.set(counter.get() + 1);
                TimerAction::Reschedule(10)
            }),
        );
        scheduler.run(&mut space(), 35).unwrap();
        assert_eq!(fired.get(), 3);

        assert!(scheduler.cancel_timer(handle));
        assert!(!scheduler.cancel_timer(handle));
        scheduler.run(&mut space(), 100).unwrap();
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn device_errors_end_the_run() {
        struct Broken;
        impl ScheduledDevice for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn run(&mut self, _: &mut AddressSpace, _: u64) -> Result<u64, EmulatorError> {
                Err(EmulatorError::ResourceExhaustion("test".into()))
            }
        }
        let broken: Rc<RefCell<dyn ScheduledDevice>> = Rc::new(RefCell::new(Broken));
        let mut scheduler = Scheduler::new(16);
        scheduler.add_device(Rc::downgrade(&broken));
        assert!(scheduler.run(&mut space(), 16).is_err());
    }
}
