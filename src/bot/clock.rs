use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use super::dispatcher::ObserverId;

/* Monotonic clock seam.
 * All deadlines and cooldown windows in the core run against this trait,
 * so tests can drive them with a manual clock instead of sleeping.
 */

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// Test clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(PartialEq, Eq)]
struct Entry {
    deadline: Instant,
    timer: TimerId,
    observer: ObserverId,
    cancelled: bool,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.timer.0.cmp(&other.timer.0))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/* Deadline scheduler.
 * One heap for every timed resolution in the system: poll expiry, approval
 * windows, the captcha claim window. A deadline fires the owning observer's
 * on_deadline exactly once; cancelled timers are skipped when they surface.
 */
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    queue: Mutex<BinaryHeap<Reverse<Entry>>>,
    next_timer: AtomicU64,
    // Wakes the production driver when an earlier deadline is scheduled.
    wakeup: Notify,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Scheduler {
            clock,
            queue: Mutex::new(BinaryHeap::new()),
            next_timer: AtomicU64::new(1),
            wakeup: Notify::new(),
        }
    }

    pub fn schedule(&self, delay: Duration, observer: ObserverId) -> TimerId {
        let timer = TimerId(self.next_timer.fetch_add(1, Ordering::Relaxed));
        let deadline = self.clock.now() + delay;
        self.queue.lock().unwrap().push(Reverse(Entry {
            deadline,
            timer,
            observer,
            cancelled: false,
        }));
        self.wakeup.notify_one();
        timer
    }

    // No-op when the timer already fired or was never scheduled.
    pub fn cancel(&self, timer: TimerId) {
        let mut queue = self.queue.lock().unwrap();
        let entries = std::mem::take(&mut *queue);
        *queue = entries
            .into_iter()
            .map(|Reverse(mut entry)| {
                if entry.timer == timer {
                    entry.cancelled = true;
                }
                Reverse(entry)
            })
            .collect();
    }

    // Pops every deadline at or before now. Callers resolve the observers.
    pub fn take_due(&self) -> Vec<(TimerId, ObserverId)> {
        let now = self.clock.now();
        let mut due = Vec::new();
        let mut queue = self.queue.lock().unwrap();
        while let Some(Reverse(entry)) = queue.peek() {
            if entry.deadline > now {
                break;
            }
            let Reverse(entry) = queue.pop().unwrap();
            if !entry.cancelled {
                due.push((entry.timer, entry.observer));
            }
        }
        due
    }

    // Time until the next live deadline, if any.
    pub fn next_delay(&self) -> Option<Duration> {
        let now = self.clock.now();
        let queue = self.queue.lock().unwrap();
        queue
            .iter()
            .filter(|Reverse(entry)| !entry.cancelled)
            .map(|Reverse(entry)| entry.deadline.saturating_duration_since(now))
            .min()
    }

    pub async fn wait_for_change(&self) {
        self.wakeup.notified().await;
    }
}
