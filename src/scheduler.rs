//! Automatic update scheduling.
//!
//! A dedicated thread sleeps until the next reload deadline, runs the
//! update closure, and applies a retry ladder on failure. All waiting goes
//! through `DeadlineSleeper`, which sleeps in bounded slices and can be
//! woken early for a manual trigger or shutdown, so stopping the scheduler
//! never blocks for more than one slice.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::AbortToken;

/// Maximum single wait slice.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(10);

/// Delay before the next attempt after `consecutive_failures` failed
/// updates, or `None` once the ladder is exhausted and the scheduler should
/// fall back to the regular interval with a fresh counter.
///
/// The first five failures retry after a minute, the next five after an
/// hour, and the eleventh gives up.
pub fn retry_delay(consecutive_failures: u32) -> Option<Duration> {
    if consecutive_failures <= 5 {
        Some(Duration::from_secs(60))
    } else if consecutive_failures <= 10 {
        Some(Duration::from_secs(3600))
    } else {
        None
    }
}

/// Interruptible sleep primitive.
///
/// Sleeps in slices of at most ten seconds so a missed wakeup can never
/// stall shutdown for long. `wake` interrupts the current (or next) sleep.
#[derive(Default)]
pub struct DeadlineSleeper {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl DeadlineSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `duration`, returning `true` if woken early.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut woken = self.woken.lock();
        loop {
            if *woken {
                *woken = false;
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(MAX_WAIT_SLICE);
            self.condvar.wait_for(&mut woken, slice);
        }
    }

    /// Interrupt the current sleep; a wake with no sleeper in progress is
    /// consumed by the next `sleep_for` call.
    pub fn wake(&self) {
        *self.woken.lock() = true;
        self.condvar.notify_all();
    }
}

struct UpdaterShared {
    sleeper: DeadlineSleeper,
    stop: AtomicBool,
    update_in_flight: AtomicBool,
    abort: AbortToken,
}

/// Background auto-update thread.
pub struct AutoUpdater {
    shared: Arc<UpdaterShared>,
    handle: Option<JoinHandle<()>>,
}

impl AutoUpdater {
    /// Spawn the scheduler thread.
    ///
    /// The first update runs after `initial_delay`, later ones every
    /// `interval`; a failed update reschedules per `retry_delay`. The
    /// closure receives an abort token that fires on `stop`.
    pub fn start<F>(initial_delay: Duration, interval: Duration, update: F) -> Self
    where
        F: Fn(&AbortToken) -> crate::Result<()> + Send + 'static,
    {
        let shared = Arc::new(UpdaterShared {
            sleeper: DeadlineSleeper::new(),
            stop: AtomicBool::new(false),
            update_in_flight: AtomicBool::new(false),
            abort: AbortToken::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("hostblock-updater".to_string())
            .spawn(move || run_loop(thread_shared, initial_delay, interval, update))
            .ok();
        if handle.is_none() {
            log::error!("Failed to spawn updater thread; automatic reloads disabled");
        }

        Self { shared, handle }
    }

    /// Wake the scheduler to update immediately. No-op while an update is
    /// already in flight.
    pub fn trigger_now(&self) {
        if self.shared.update_in_flight.load(Ordering::SeqCst) {
            log::debug!("Reload already in progress, trigger ignored");
            return;
        }
        self.shared.sleeper.wake();
    }

    /// Whether an update is currently executing.
    pub fn is_update_in_flight(&self) -> bool {
        self.shared.update_in_flight.load(Ordering::SeqCst)
    }

    /// Signal the thread to stop, abort any in-flight update, and join.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.abort.abort();
        self.shared.sleeper.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutoUpdater {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop<F>(shared: Arc<UpdaterShared>, initial_delay: Duration, interval: Duration, update: F)
where
    F: Fn(&AbortToken) -> crate::Result<()>,
{
    let mut failures = 0u32;
    let mut wait = initial_delay;

    loop {
        shared.sleeper.sleep_for(wait);
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        shared.update_in_flight.store(true, Ordering::SeqCst);
        let result = update(&shared.abort);
        shared.update_in_flight.store(false, Ordering::SeqCst);

        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        match result {
            Ok(()) => {
                failures = 0;
                wait = interval;
            }
            Err(e) => {
                failures += 1;
                match retry_delay(failures) {
                    Some(delay) => {
                        log::warn!(
                            "Update failed (attempt {}), retrying in {:?}: {}",
                            failures,
                            delay,
                            e
                        );
                        wait = delay;
                    }
                    None => {
                        log::error!(
                            "Update failed {} times, backing off to the regular interval: {}",
                            failures,
                            e
                        );
                        failures = 0;
                        wait = interval;
                    }
                }
            }
        }
    }
    log::debug!("Updater thread stopped");
}
