//! Speed-scaled embassy-time driver.
//!
//! Virtual time advances at `speed_percent` of real time. Changing the speed rebases the
//! mapping at the current instant, so virtual time stays continuous and deadlines already
//! queued keep their virtual value. A background thread wakes the queued wakers when the
//! real instant matching their virtual deadline has passed.

use core::task::Waker;
use embassy_time_driver::{Driver, TICK_HZ, time_driver_impl};
use log::error;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant as StdInstant};

pub const MIN_SPEED_PERCENT: u32 = 1;
pub const MAX_SPEED_PERCENT: u32 = 1000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

struct DriverState {
    origin_real: StdInstant,
    /// Virtual time at `origin_real`, in ticks.
    origin_virtual: u64,
    percent: u32,
    /// Virtual deadline -> wakers due then.
    queue: BTreeMap<u64, Vec<Waker>>,
}

impl DriverState {
    fn new(origin_real: StdInstant) -> Self {
        Self {
            origin_real,
            origin_virtual: 0,
            percent: 100,
            queue: BTreeMap::new(),
        }
    }

    fn virtual_at(&self, real: StdInstant) -> u64 {
        let real_ticks = real.saturating_duration_since(self.origin_real).as_nanos() * TICK_HZ as u128 / NANOS_PER_SEC;
        let scaled = real_ticks * self.percent as u128 / 100;
        self.origin_virtual.saturating_add(scaled.min(u64::MAX as u128) as u64)
    }

    /// Real instant at which `virtual_ticks` is reached; deadlines before the origin are due at once.
    fn real_at(&self, virtual_ticks: u64) -> StdInstant {
        let Some(virtual_dt) = virtual_ticks.checked_sub(self.origin_virtual) else {
            return self.origin_real;
        };
        let real_ticks = virtual_dt as u128 * 100 / self.percent as u128;
        let nanos = real_ticks * NANOS_PER_SEC / TICK_HZ as u128;
        self.origin_real + Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    fn set_percent(&mut self, percent: u32, real_now: StdInstant) {
        self.origin_virtual = self.virtual_at(real_now);
        self.origin_real = real_now;
        self.percent = percent;
    }
}

static STATE: OnceLock<Mutex<DriverState>> = OnceLock::new();
static CV: OnceLock<Condvar> = OnceLock::new();
static SCHEDULER_STARTED: OnceLock<()> = OnceLock::new();

fn state() -> MutexGuard<'static, DriverState> {
    STATE
        .get_or_init(|| Mutex::new(DriverState::new(StdInstant::now())))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

fn cv() -> &'static Condvar {
    CV.get_or_init(Condvar::new)
}

fn ensure_scheduler_thread() {
    SCHEDULER_STARTED.get_or_init(|| {
        if let Err(e) = std::thread::Builder::new().name("embassy-time-scheduler".into()).spawn(scheduler_thread) {
            error!("Failed to start the embassy-time scheduler thread: {}", e);
        }
    });
}

fn scheduler_thread() {
    // Wait in slices so a speed change is picked up even if a notify is missed.
    const MAX_WAIT_SLICE: Duration = Duration::from_millis(25);

    let mut guard = state();
    loop {
        let next_at = guard.queue.keys().next().copied();
        let Some(next_at) = next_at else {
            guard = cv().wait(guard).unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        let real_now = StdInstant::now();
        let due = guard.real_at(next_at);
        if due > real_now {
            let wait = (due - real_now).min(MAX_WAIT_SLICE);
            guard = match cv().wait_timeout(guard, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
            continue;
        }

        let now_virtual = guard.virtual_at(real_now).max(next_at);
        let later = guard.queue.split_off(&now_virtual.saturating_add(1));
        let ready = std::mem::replace(&mut guard.queue, later);
        drop(guard);
        // Wake outside the lock: a woken task may schedule again right away.
        for waker in ready.into_values().flatten() {
            waker.wake();
        }
        guard = state();
    }
}

struct ScaledDriver;

impl Driver for ScaledDriver {
    fn now(&self) -> u64 {
        state().virtual_at(StdInstant::now())
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        ensure_scheduler_thread();
        {
            let mut guard = state();
            let wakers = guard.queue.entry(at).or_default();
            if !wakers.iter().any(|w| w.will_wake(waker)) {
                wakers.push(waker.clone());
            }
        }
        cv().notify_all();
    }
}

time_driver_impl!(static DRIVER: ScaledDriver = ScaledDriver);

/// Set the virtual clock speed, clamped to `MIN_SPEED_PERCENT..=MAX_SPEED_PERCENT`.
pub fn set_speed_percent(percent: u32) {
    let percent = percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT);
    {
        let mut guard = state();
        if guard.percent == percent {
            return;
        }
        guard.set_percent(percent, StdInstant::now());
    }
    cv().notify_all();
}

pub fn speed_percent() -> u32 {
    state().percent
}
