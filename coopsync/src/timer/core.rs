//! Timer implementation

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::coordinator::{Coordinator, CoordinatorManager, Identifier};
use crate::timeout::Timeout;

use super::config::TimerConfig;
use super::task::{TaskId, Tick, TimerStats, TimerTask};

static GLOBAL: LazyLock<Timer> = LazyLock::new(|| Timer::new(CoordinatorManager::global(), TimerConfig::default()));

/// Internal state protected by mutex
struct TimerInner {
    /// Last id handed out
    last_id: u64,

    /// Tasks not yet cleared, each with the signal that interrupts its wait
    pending: HashMap<TaskId, Arc<Notify>>,

    /// Spawned tasks not yet finished
    num: usize,

    /// See [`TimerStats::round`]
    round: i64,
}

struct Shared {
    manager: Arc<CoordinatorManager>,
    config: TimerConfig,
    default_identifier: Identifier,
    inner: Mutex<TimerInner>,
}

/// Schedules callbacks that run once, repeatedly, or when an identifier is resumed.
///
/// Every scheduled task parks on the Coordinator registered under its
/// identifier, so resuming that identifier wakes all of them at once. By
/// default that is [`Identifier::WORKER_EXIT`], which lets shutdown cancel
/// every default-scoped timer with a single resume.
///
/// Cloning is cheap; clones share tasks and counters. Scheduling must happen
/// inside a tokio runtime.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
}

/// Bookkeeping for one spawned task, settled when the task ends however it ends
struct TaskGuard {
    timer: Timer,
    id: TaskId,
    rounds: u64,
}

impl TaskGuard {
    fn is_pending(&self) -> bool {
        self.timer.is_pending(self.id)
    }

    fn complete_round(&mut self) {
        self.rounds += 1;
        self.timer.lock().round += 1;
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut inner = self.timer.lock();
        inner.pending.remove(&self.id);
        inner.num -= 1;
        inner.round -= self.rounds as i64;
        debug!(task_id = %self.id, rounds = self.rounds, num = inner.num, "TaskGuard::drop: task finished");
    }
}

impl Timer {
    /// Create a timer whose tasks rendezvous through `manager`
    pub fn new(manager: Arc<CoordinatorManager>, config: TimerConfig) -> Self {
        debug!(?config, "Timer::new: called");
        let default_identifier = config.default_identifier().clone();
        Self {
            shared: Arc::new(Shared {
                manager,
                config,
                default_identifier,
                inner: Mutex::new(TimerInner {
                    last_id: 0,
                    pending: HashMap::new(),
                    num: 0,
                    round: 0,
                }),
            }),
        }
    }

    /// The process-wide timer, bound to the global CoordinatorManager
    pub fn global() -> Timer {
        GLOBAL.clone()
    }

    pub fn manager(&self) -> &Arc<CoordinatorManager> {
        &self.shared.manager
    }

    pub fn config(&self) -> &TimerConfig {
        &self.shared.config
    }

    pub fn default_identifier(&self) -> &Identifier {
        &self.shared.default_identifier
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id and count the task before it is spawned
    fn register(&self) -> (TaskGuard, Arc<Notify>) {
        let mut inner = self.lock();
        inner.last_id += 1;
        let id = TaskId::new(inner.last_id);
        let cleared = Arc::new(Notify::new());
        inner.pending.insert(id, cleared.clone());
        inner.num += 1;
        drop(inner);

        let guard = TaskGuard {
            timer: self.clone(),
            id,
            rounds: 0,
        };
        (guard, cleared)
    }

    /// Run `callback` once after `timeout` on the default identifier
    pub fn after<F, Fut>(&self, timeout: Timeout, callback: F) -> TimerTask<eyre::Result<()>>
    where
        F: FnOnce(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.after_on(self.default_identifier().clone(), timeout, callback)
    }

    /// Run `callback` once, after `timeout` or as soon as `identifier` is resumed
    ///
    /// The callback receives whether the identifier's Coordinator was closing.
    /// [`Timeout::Poll`] fires without suspending, [`Timeout::Forever`] waits
    /// for the resume. A callback error is logged and returned as the task's
    /// output, so a detached task still leaves a trace.
    pub fn after_on<F, Fut>(&self, identifier: Identifier, timeout: Timeout, callback: F) -> TimerTask<eyre::Result<()>>
    where
        F: FnOnce(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let (guard, cleared) = self.register();
        let id = guard.id;
        let coord = self.manager().until(&identifier);
        debug!(task_id = %id, %identifier, ?timeout, "Timer::after_on: scheduled");

        let handle = tokio::spawn(async move {
            let guard = guard;
            let closing = match timeout {
                Timeout::Poll => coord.is_closing(),
                _ => wait_or_cleared(&coord, timeout, &cleared).await,
            };
            if !guard.is_pending() {
                debug!(task_id = %guard.id, "Timer task cleared before firing");
                return Ok(());
            }
            debug!(task_id = %guard.id, closing, "Timer task firing");
            let result = callback(closing).await;
            if let Err(e) = &result {
                error!(task_id = %guard.id, error = %e, "Timer callback failed");
            }
            result
        });

        TimerTask::new(id, handle)
    }

    /// Run `callback` when the default identifier is resumed
    pub fn until<F, Fut>(&self, callback: F) -> TimerTask<eyre::Result<()>>
    where
        F: FnOnce(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.until_on(self.default_identifier().clone(), callback)
    }

    /// Run `callback` when `identifier` is resumed
    pub fn until_on<F, Fut>(&self, identifier: Identifier, callback: F) -> TimerTask<eyre::Result<()>>
    where
        F: FnOnce(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.after_on(identifier, Timeout::Forever, callback)
    }

    /// Run `callback` every `interval` on the default identifier
    pub fn tick<F, Fut>(&self, interval: Duration, callback: F) -> TimerTask<u64>
    where
        F: FnMut(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<Tick>> + Send + 'static,
    {
        self.tick_on(self.default_identifier().clone(), interval, callback)
    }

    /// Run `callback` every `interval` until stopped
    ///
    /// Each round waits the interval (floored at the configured minimum) on the
    /// Coordinator currently registered under the identifier, then fires with
    /// whether it was closing. The
    /// loop ends when the callback returns [`Tick::Stop`], when the identifier
    /// is resumed, or when the task is cleared. Callback errors and panics are
    /// logged and the loop carries on. The task outputs its completed rounds.
    pub fn tick_on<F, Fut>(&self, identifier: Identifier, interval: Duration, mut callback: F) -> TimerTask<u64>
    where
        F: FnMut(bool) -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<Tick>> + Send + 'static,
    {
        let interval = interval.max(self.config().min_tick_interval());
        let (guard, cleared) = self.register();
        let id = guard.id;
        let manager = self.manager().clone();
        let mut coord = manager.until(&identifier);
        debug!(task_id = %id, %identifier, ?interval, "Timer::tick_on: scheduled");

        let handle = tokio::spawn(async move {
            let mut guard = guard;
            loop {
                // A closing Coordinator is kept so a resume is never skipped by a renew
                if !coord.is_closing() {
                    coord = manager.until(&identifier);
                }
                let closing = wait_or_cleared(&coord, Timeout::After(interval), &cleared).await;
                if !guard.is_pending() {
                    debug!(task_id = %guard.id, "Tick task cleared");
                    break;
                }

                let outcome = AssertUnwindSafe(async { callback(closing).await })
                    .catch_unwind()
                    .await;
                let stop = match outcome {
                    Ok(Ok(tick)) => tick == Tick::Stop,
                    Ok(Err(e)) => {
                        error!(task_id = %guard.id, error = %e, "Tick callback failed");
                        false
                    }
                    Err(panic) => {
                        error!(task_id = %guard.id, panic = panic_message(&*panic), "Tick callback panicked");
                        false
                    }
                };

                if stop || closing || !guard.is_pending() {
                    debug!(task_id = %guard.id, stop, closing, "Tick task ending");
                    break;
                }
                guard.complete_round();
            }
            guard.rounds
        });

        TimerTask::new(id, handle)
    }

    /// Cancel a task's pending callbacks
    ///
    /// A task still waiting wakes and ends without firing. A callback already
    /// running is not interrupted. Returns `false` if `id` was not pending.
    pub fn clear(&self, id: TaskId) -> bool {
        let cleared = self.lock().pending.remove(&id);
        debug!(task_id = %id, found = cleared.is_some(), "Timer::clear: called");
        match cleared {
            Some(signal) => {
                signal.notify_one();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task without resuming any identifier
    pub fn clear_all(&self) -> usize {
        let signals: Vec<_> = self.lock().pending.drain().map(|(_, signal)| signal).collect();
        for signal in &signals {
            signal.notify_one();
        }
        info!(count = signals.len(), "Cleared all timer tasks");
        signals.len()
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    /// Ids of tasks not yet cleared or finished, sorted
    pub fn pending(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = self.lock().pending.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> TimerStats {
        let inner = self.lock();
        TimerStats {
            num: inner.num,
            round: inner.round,
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("default_identifier", self.default_identifier())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Wait on the Coordinator unless the task is cleared first
///
/// Returns whether the Coordinator is closing; closing wins ties.
async fn wait_or_cleared(coord: &Coordinator, timeout: Timeout, cleared: &Notify) -> bool {
    tokio::select! {
        biased;
        closing = coord.wait(timeout) => closing,
        _ = cleared.notified() => coord.is_closing(),
    }
}

fn panic_message<'a>(panic: &'a (dyn std::any::Any + Send + 'static)) -> &'a str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use eyre::eyre;

    use super::*;

    fn timer() -> Timer {
        Timer::new(Arc::new(CoordinatorManager::new()), TimerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_on_timeout() {
        let timer = timer();
        let task = timer.after(Timeout::After(Duration::from_millis(50)), |closing| async move {
            assert!(!closing);
            Ok(())
        });
        assert_eq!(timer.stats().num, 1);

        task.join().await.unwrap().unwrap();
        assert_eq!(timer.stats().num, 0);
        assert!(timer.pending().is_empty());
    }

    #[tokio::test]
    async fn test_after_poll_reports_closing_state() {
        let timer = timer();
        timer.manager().resume(timer.default_identifier());

        let task = timer.after(Timeout::Poll, |closing| async move {
            if closing { Ok(()) } else { Err(eyre!("expected closing")) }
        });
        task.join().await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_error_propagates_to_join() {
        let timer = timer();
        let task = timer.after(Timeout::Poll, |_| async { Err(eyre!("one-shot failed")) });

        let err = task.join().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "one-shot failed");
        assert_eq!(timer.stats().num, 0);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_after_error_is_logged() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let timer = timer();
        let id = timer.after(Timeout::Poll, |_| async { Err(eyre!("one-shot failed")) }).detach();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(timer.stats().num, 0);
        let output = logs.contents();
        assert!(output.contains("Timer callback failed"), "missing log line: {}", output);
        assert!(output.contains("one-shot failed"));
        assert!(output.contains(&format!("task_id={}", id)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_waits_for_resume() {
        let timer = timer();
        let id = Identifier::from("reload");
        let task = timer.until_on(id.clone(), |closing| async move {
            assert!(closing);
            Ok(())
        });

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!task.is_finished());

        timer.manager().resume(&id);
        task.join().await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_prevents_callback() {
        let timer = timer();
        let fired = Arc::new(AtomicUsize::new(0));
        let task = {
            let fired = fired.clone();
            timer.after(Timeout::After(Duration::from_secs(10)), move |_| async move {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        assert!(timer.clear(task.id()));
        assert!(!timer.clear(task.id()));
        task.join().await.unwrap().unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timer.stats().num, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_monotonic() {
        let timer = timer();
        let a = timer.after(Timeout::Poll, |_| async { Ok(()) });
        let b = timer.tick(Duration::from_millis(1), |_| async { Ok(Tick::Stop) });
        let c = timer.until(|_| async { Ok(()) });
        assert!(a.id() < b.id() && b.id() < c.id());
        timer.clear_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_swallows_errors_and_panics() {
        let timer = timer();
        let calls = Arc::new(AtomicUsize::new(0));
        let task = {
            let calls = calls.clone();
            timer.tick(Duration::from_millis(10), move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    match n {
                        1 => Err(eyre!("transient")),
                        2 => panic!("boom"),
                        _ => Ok(Tick::Stop),
                    }
                }
            })
        };

        let rounds = task.join().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(rounds, 2);
        assert_eq!(timer.stats(), TimerStats { num: 0, round: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_tracks_running_tick_loops() {
        let timer = timer();
        let task = timer.tick(Duration::from_millis(10), |_| async { Ok(Tick::Continue) });

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(timer.stats().round, 3);

        timer.clear(task.id());
        assert_eq!(task.join().await.unwrap(), 3);
        assert_eq!(timer.stats(), TimerStats { num: 0, round: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_ends_on_resume() {
        let timer = timer();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = {
            let seen = seen.clone();
            timer.tick(Duration::from_millis(10), move |closing| {
                seen.lock().unwrap().push(closing);
                async { Ok(Tick::Continue) }
            })
        };

        tokio::time::sleep(Duration::from_millis(25)).await;
        timer.manager().resume(timer.default_identifier());
        assert_eq!(task.join().await.unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_interval_floor() {
        let config = TimerConfig {
            min_tick_interval_ms: 20,
            ..Default::default()
        };
        let timer = Timer::new(Arc::new(CoordinatorManager::new()), config);
        let started = tokio::time::Instant::now();
        let task = timer.tick(Duration::ZERO, |_| async { Ok(Tick::Stop) });
        task.join().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_skips_resume() {
        let timer = timer();
        let tasks: Vec<_> = (0..4)
            .map(|_| timer.until(|_| async { Err(eyre!("must not fire")) }))
            .collect();
        assert_eq!(timer.stats().num, 4);

        assert_eq!(timer.clear_all(), 4);
        for task in tasks {
            task.join().await.unwrap().unwrap();
        }
        assert_eq!(timer.stats().num, 0);
        assert!(!timer.manager().until(timer.default_identifier()).is_closing());
    }
}
