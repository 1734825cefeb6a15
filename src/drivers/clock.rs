use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use chrono::{DateTime, Local, TimeDelta};
/// Time source for the scheduler: a monotonic clock for cadence decisions and
/// a wall clock for sample timestamps.
pub trait Clock {
    /// Monotonic time since the clock's origin.
    fn elapsed(&self) -> Duration;
    fn wall(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);
}
pub struct SystemClock {
    origin: Instant,
}
impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
/// Simulated clock. Clones share the same time; `sleep` advances it instantly.
#[derive(Clone)]
pub struct ManualClock {
    origin_wall: DateTime<Local>,
    elapsed: Arc<Mutex<Duration>>,
}
impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }
    pub fn starting_at(origin_wall: DateTime<Local>) -> Self {
        Self {
            origin_wall,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
    fn wall(&self) -> DateTime<Local> {
        let offset = TimeDelta::from_std(self.elapsed()).unwrap_or(TimeDelta::zero());
        self.origin_wall + offset
    }
    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let start = clock.wall();
        let other = clock.clone();
        other.sleep(Duration::from_millis(1500));
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
        assert_eq!(clock.wall() - start, TimeDelta::milliseconds(1500));
    }
}
