//! Wall-clock tick source for the controller clock.
//!
//! A background thread sets a shared boolean latch once per clock period.
//! The latch is the only datum shared with the master, which consumes it
//! with a single atomic swap at the start of event arbitration; ticks that
//! land while an iteration is in flight coalesce into one. Unit state is
//! never touched from this thread.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn raise(&self) {
        *self.stopped.lock().expect("stop signal poisoned") = true;
        self.condvar.notify_all();
    }

    /// Wait up to `timeout` for the stop signal. Returns true once stop has
    /// been requested.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = self.stopped.lock().expect("stop signal poisoned");
        let (stopped, _) = self
            .condvar
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .expect("stop signal poisoned");
        *stopped
    }
}

/// Handle to the spawned tick thread.
pub struct TickSource {
    stop: Arc<StopSignal>,
    handle: thread::JoinHandle<()>,
}

impl TickSource {
    /// Spawn the worker. It sets `latch` every `period` until stopped.
    pub fn spawn(period: Duration, latch: Arc<AtomicBool>) -> std::io::Result<Self> {
        let stop = Arc::new(StopSignal::default());
        let worker_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("controller-tick".into())
            .spawn(move || {
                log::debug!("tick source running with period {period:?}");
                while !worker_stop.wait_timeout(period) {
                    latch.store(true, std::sync::atomic::Ordering::SeqCst);
                }
                log::debug!("tick source stopped");
            })?;
        Ok(Self { stop, handle })
    }

    /// Signal the worker to stop and join it. The worker observes the stop
    /// signal without waiting out its current period.
    pub fn stop(self) -> thread::Result<()> {
        self.stop.raise();
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn produces_ticks_and_stops_promptly() {
        let latch = Arc::new(AtomicBool::new(false));
        let ticker =
            TickSource::spawn(Duration::from_millis(5), Arc::clone(&latch)).unwrap();

        // Wait for at least one tick.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !latch.load(Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "no tick arrived");
            thread::yield_now();
        }

        let started = std::time::Instant::now();
        ticker.stop().unwrap();
        // Joining must not wait anywhere near a full period backlog.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn latch_coalesces_multiple_ticks() {
        let latch = Arc::new(AtomicBool::new(false));
        // Two raises without a consume in between...
        latch.store(true, Ordering::SeqCst);
        latch.store(true, Ordering::SeqCst);
        // ...are observed as exactly one pending tick.
        assert!(latch.swap(false, Ordering::SeqCst));
        assert!(!latch.swap(false, Ordering::SeqCst));
    }
}
