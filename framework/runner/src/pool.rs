use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Cooperative stop flag handed to each client task.
///
/// The flag is only ever checked at an iteration boundary, so a stopped client always
/// finishes the iteration it is in the middle of before exiting.
#[derive(Debug, Clone)]
pub(crate) struct StopSignal {
    stop: Arc<AtomicBool>,
}

impl StopSignal {
    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct ClientHandle {
    stop: Arc<AtomicBool>,
    join: std::thread::JoinHandle<()>,
}

/// The set of currently running simulated-client tasks.
///
/// Each client runs on its own named OS thread. The pool only manages lifecycles; what a
/// client does per iteration is opaque to it.
pub(crate) struct ClientPool {
    clients: Mutex<HashMap<usize, ClientHandle>>,
    running: Arc<AtomicUsize>,
    next_id: AtomicUsize,
}

impl ClientPool {
    pub(crate) fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            running: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Start one client task. The body receives the client's index and stop signal and is
    /// expected to loop until told to stop.
    ///
    /// The running count is incremented before the thread starts, so the pool's view
    /// converges with the scheduler's decisions within the same tick regardless of thread
    /// start latency.
    pub(crate) fn spawn<F>(&self, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(usize, StopSignal) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        let signal = StopSignal { stop: stop.clone() };

        let running = self.running.clone();
        running.fetch_add(1, Ordering::SeqCst);

        let join = std::thread::Builder::new()
            .name(format!("client-{id}"))
            .spawn(move || {
                body(id, signal);
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .inspect_err(|_| {
                self.running.fetch_sub(1, Ordering::SeqCst);
            })?;

        self.clients.lock().insert(id, ClientHandle { stop, join });
        Ok(())
    }

    /// Signal up to `count` arbitrary clients that have not already been told to stop.
    /// Returns how many were actually signalled. No ordering guarantee on which clients
    /// are chosen.
    pub(crate) fn stop(&self, count: usize) -> usize {
        let clients = self.clients.lock();
        let mut stopped = 0;

        for handle in clients.values() {
            if stopped == count {
                break;
            }
            if !handle.stop.swap(true, Ordering::SeqCst) {
                stopped += 1;
            }
        }

        stopped
    }

    /// The number of client tasks currently running, including those that have been told
    /// to stop but are still finishing an iteration.
    pub(crate) fn active_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// The number of clients the pool still intends to keep running. Clients already
    /// signalled to stop, or that exited on their own, are excluded so the scheduler does
    /// not double-stop while a drain is in flight.
    pub(crate) fn commanded_count(&self) -> usize {
        let clients = self.clients.lock();
        clients
            .values()
            .filter(|handle| {
                !handle.stop.load(Ordering::SeqCst) && !handle.join.is_finished()
            })
            .count()
    }

    /// Drop bookkeeping for clients whose threads have exited.
    pub(crate) fn reap(&self) {
        let mut clients = self.clients.lock();
        clients.retain(|_, handle| !handle.join.is_finished());
    }

    /// Signal every client to stop and wait for the pool to empty.
    ///
    /// Returns true if the grace period expired with clients still running; those threads
    /// are discarded rather than joined, since a client cannot be interrupted mid-iteration.
    pub(crate) fn drain(&self, grace: Duration) -> bool {
        self.stop(usize::MAX);

        let deadline = Instant::now() + grace;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                log::warn!(
                    "{} client(s) still running after the {:?} drain grace period, discarding them",
                    self.active_count(),
                    grace
                );
                self.clients.lock().clear();
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        // Joining here cannot block: every thread has already left its loop.
        let clients = std::mem::take(&mut *self.clients.lock());
        for (_, handle) in clients {
            if handle.join.join().is_err() {
                log::error!("A client thread panicked");
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn looping_client(pool: &ClientPool) {
        pool.spawn(|_, signal| {
            while !signal.should_stop() {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
    }

    #[test]
    fn spawn_and_stop_converge_the_counts() {
        let pool = ClientPool::new();
        for _ in 0..5 {
            looping_client(&pool);
        }
        assert_eq!(pool.active_count(), 5);
        assert_eq!(pool.commanded_count(), 5);

        assert_eq!(pool.stop(2), 2);
        assert_eq!(pool.commanded_count(), 3);

        // Already-signalled clients are not signalled again.
        assert_eq!(pool.stop(5), 3);

        assert!(!pool.drain(Duration::from_secs(5)));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn stopped_clients_finish_their_current_iteration() {
        let pool = ClientPool::new();
        let (finished_tx, finished_rx) = mpsc::channel();

        pool.spawn(move |_, signal| {
            loop {
                // One "iteration" of work that must not be interrupted.
                std::thread::sleep(Duration::from_millis(50));
                finished_tx.send(()).unwrap();

                if signal.should_stop() {
                    break;
                }
            }
        })
        .unwrap();

        // Stop mid-iteration; the iteration must still complete and report.
        std::thread::sleep(Duration::from_millis(10));
        pool.stop(1);
        assert!(!pool.drain(Duration::from_secs(5)));

        finished_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("the in-flight iteration should have completed");
    }

    #[test]
    fn drain_times_out_on_a_stuck_client() {
        let pool = ClientPool::new();
        pool.spawn(|_, _| {
            // Ignores its stop signal entirely.
            std::thread::sleep(Duration::from_secs(2));
        })
        .unwrap();

        assert!(pool.drain(Duration::from_millis(100)));
    }

    #[test]
    fn clients_that_exit_on_their_own_are_reaped() {
        let pool = ClientPool::new();
        pool.spawn(|_, _| {}).unwrap();

        // Give the thread a moment to finish.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.commanded_count(), 0);
        pool.reap();
        assert_eq!(pool.active_count(), 0);
    }
}
