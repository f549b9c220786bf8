//! Running a job at a fixed rate on a dedicated thread.
//!
//! [`FixedRateScheduler`] drives recurring work like polling a queue or
//! hitting a health endpoint. Each scheduler owns one named worker thread;
//! the job runs with whatever context it attaches itself, so a job that
//! starts a span per tick produces one trace per tick.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Errors a scheduled task may return. They are logged and the schedule
/// keeps running.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from starting or stopping a [`FixedRateScheduler`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScheduleError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
    /// [`shutdown`](FixedRateScheduler::shutdown) was called twice.
    #[error("scheduler is already shut down")]
    AlreadyShutdown,
    /// The worker thread panicked.
    #[error("scheduler thread panicked")]
    Panicked,
}

/// Runs a task every `interval` on its own named thread.
///
/// The first run happens one full interval after [`start`], and the interval
/// is measured from the start of each run. A task returning `Err` is logged
/// and does not stop the schedule.
///
/// [`shutdown`] cancels future runs and waits for a run already in flight to
/// finish. Dropping the scheduler also cancels future runs, but without
/// waiting for the worker thread to exit.
///
/// [`start`]: FixedRateScheduler::start
/// [`shutdown`]: FixedRateScheduler::shutdown
#[derive(Debug)]
pub struct FixedRateScheduler {
    name: String,
    shutdown_sender: SyncSender<()>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl FixedRateScheduler {
    /// Spawns the worker thread and begins the schedule.
    ///
    /// `name` becomes the thread name, so pick one that reads well in stack
    /// dumps, e.g. `"orders.poller"`.
    pub fn start<F>(
        name: impl Into<String>,
        interval: Duration,
        mut task: F,
    ) -> Result<FixedRateScheduler, ScheduleError>
    where
        F: FnMut() -> Result<(), TaskError> + Send + 'static,
    {
        let name = name.into();
        let (shutdown_sender, shutdown_receiver) = mpsc::sync_channel(1);

        let worker_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!(
                name = %worker_name,
                interval_ms = interval.as_millis() as u64,
                "scheduler started"
            );
            let mut last_run = Instant::now();
            loop {
                let remaining = interval
                    .checked_sub(last_run.elapsed())
                    .unwrap_or(Duration::ZERO);
                match shutdown_receiver.recv_timeout(remaining) {
                    Err(RecvTimeoutError::Timeout) => {
                        last_run = Instant::now();
                        if let Err(error) = task() {
                            tracing::warn!(name = %worker_name, %error, "scheduled task failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!(name = %worker_name, "scheduler stopped");
                        break;
                    }
                }
            }
        })?;

        Ok(FixedRateScheduler {
            name,
            shutdown_sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
        })
    }

    /// The thread name this scheduler was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the schedule and waits for the worker thread to exit. A task
    /// run already in flight completes first.
    pub fn shutdown(&self) -> Result<(), ScheduleError> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ScheduleError::AlreadyShutdown);
        }

        // A send error means the worker is already gone; join still
        // surfaces what happened to it.
        let _ = self.shutdown_sender.send(());

        let handle = self
            .handle
            .lock()
            .map_err(|_| ScheduleError::Panicked)?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| ScheduleError::Panicked)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    const TICK: Duration = Duration::from_millis(5);

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(
                start.elapsed() < deadline,
                "condition not reached within {deadline:?}"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn runs_task_repeatedly() {
        let (tick_tx, tick_rx) = mpsc::channel();
        let scheduler = FixedRateScheduler::start("test.ticker", TICK, move || {
            let _ = tick_tx.send(());
            Ok(())
        })
        .unwrap();

        for _ in 0..3 {
            tick_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("tick should fire");
        }
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn failing_task_keeps_ticking() {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        let scheduler = FixedRateScheduler::start("test.failing", TICK, move || {
            task_count.fetch_add(1, Ordering::SeqCst);
            Err("task failed".into())
        })
        .unwrap();

        wait_until(Duration::from_secs(5), || {
            count.load(Ordering::SeqCst) >= 2
        });
        scheduler.shutdown().unwrap();
    }

    #[test]
    fn shutdown_stops_future_runs() {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        let scheduler = FixedRateScheduler::start("test.stopping", TICK, move || {
            task_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        wait_until(Duration::from_secs(5), || {
            count.load(Ordering::SeqCst) >= 1
        });
        scheduler.shutdown().unwrap();

        let after_shutdown = count.load(Ordering::SeqCst);
        thread::sleep(TICK * 4);
        assert_eq!(count.load(Ordering::SeqCst), after_shutdown);
    }

    #[test]
    fn shutdown_waits_for_run_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let task_started = started.clone();
        let task_completed = completed.clone();
        let scheduler = FixedRateScheduler::start("test.slow", TICK, move || {
            task_started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            task_completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        wait_until(Duration::from_secs(5), || {
            started.load(Ordering::SeqCst) >= 1
        });
        scheduler.shutdown().unwrap();

        let started = started.load(Ordering::SeqCst);
        let completed = completed.load(Ordering::SeqCst);
        assert!(started >= 1);
        assert_eq!(started, completed, "in-flight run must complete");
    }

    #[test]
    fn second_shutdown_errors() {
        let scheduler = FixedRateScheduler::start("test.twice", TICK, || Ok(())).unwrap();
        scheduler.shutdown().unwrap();
        assert!(matches!(
            scheduler.shutdown(),
            Err(ScheduleError::AlreadyShutdown)
        ));
    }

    #[test]
    fn drop_stops_future_runs() {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        let scheduler = FixedRateScheduler::start("test.dropped", TICK, move || {
            task_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        wait_until(Duration::from_secs(5), || {
            count.load(Ordering::SeqCst) >= 1
        });
        drop(scheduler);

        // Let a run already in flight finish, then require quiescence.
        thread::sleep(TICK * 4);
        let settled = count.load(Ordering::SeqCst);
        thread::sleep(TICK * 4);
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn scheduler_reports_name() {
        let scheduler = FixedRateScheduler::start("test.named", TICK, || Ok(())).unwrap();
        assert_eq!(scheduler.name(), "test.named");
        scheduler.shutdown().unwrap();
    }
}
