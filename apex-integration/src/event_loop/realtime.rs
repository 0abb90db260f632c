use super::{EventLoop, Task, TimerTask};
use crate::time::Time;
use parking_lot::{Condvar, Mutex};
use std::{
    any::Any,
    collections::{BTreeMap, VecDeque},
    panic::AssertUnwindSafe,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::{error, info};

/// Handler invoked with the payload of a panic caught inside an event-loop callback.
/// Returning `true` terminates the loop.
pub type PanicHandler = Box<dyn Fn(&(dyn Any + Send)) -> bool + Send + Sync>;

enum Work {
    Once(Task),
    Timer(TimerTask),
}

struct State {
    run: bool,
    queue: VecDeque<Work>,
    /// Pending timers keyed by (deadline, insertion seq) so that timers due at the same
    /// instant fire in insertion order.
    timers: BTreeMap<(Instant, u64), TimerTask>,
    next_seq: u64,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
    on_panic: PanicHandler,
}

/// Event thread: a single OS thread draining a FIFO of dispatched tasks and a schedule of
/// timers. All strategy, order and market-data logic runs here.
pub struct RealtimeEventLoop {
    shared: Arc<Shared>,
    thread_id: thread::ThreadId,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEventLoop")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl RealtimeEventLoop {
    /// Spawn the event thread. Panics escaping callbacks are fed to `on_panic`; a `true`
    /// return terminates the loop.
    pub fn new(on_panic: PanicHandler) -> Arc<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                run: true,
                queue: VecDeque::new(),
                timers: BTreeMap::new(),
                next_seq: 0,
            }),
            condvar: Condvar::new(),
            on_panic,
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("ev".into())
            .spawn(move || event_main(worker))
            .expect("failed to spawn event-loop thread");

        let thread_id = handle.thread().id();

        Arc::new(Self {
            shared,
            thread_id,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Construct with the default panic handler, which logs and keeps the loop running.
    pub fn with_default_panic_handler() -> Arc<Self> {
        Self::new(Box::new(|payload| {
            error!(
                reason = panic_message(payload),
                "caught panic in event-loop callback"
            );
            false
        }))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

fn event_main(shared: Arc<Shared>) {
    info!("event loop started");

    loop {
        let mut batch = Vec::new();

        {
            let mut state = shared.state.lock();

            loop {
                if !state.run {
                    break;
                }

                let now = Instant::now();
                while let Some(entry) = state.timers.first_entry() {
                    if entry.key().0 > now {
                        break;
                    }
                    let timer = entry.remove();
                    state.queue.push_back(Work::Timer(timer));
                }

                if !state.queue.is_empty() {
                    break;
                }

                match state.timers.keys().next().map(|(deadline, _)| *deadline) {
                    Some(deadline) => {
                        shared.condvar.wait_until(&mut state, deadline);
                    }
                    None => shared.condvar.wait(&mut state),
                }
            }

            batch.extend(state.queue.drain(..));

            if !state.run && batch.is_empty() {
                break;
            }
        }

        for work in batch {
            let stop = match work {
                Work::Once(task) => run_task(&shared, task),
                Work::Timer(timer) => run_timer(&shared, timer),
            };
            if stop {
                shared.state.lock().run = false;
            }
        }
    }

    info!("event loop stopped");
}

/// Returns whether the loop should terminate.
fn run_task(shared: &Shared, task: Task) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => false,
        Err(payload) => (shared.on_panic)(payload.as_ref()),
    }
}

fn run_timer(shared: &Shared, mut timer: TimerTask) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(&mut timer)) {
        Ok(reschedule) => {
            if !reschedule.is_zero() {
                let mut state = shared.state.lock();
                let seq = state.next_seq;
                state.next_seq += 1;
                state.timers.insert((Instant::now() + reschedule, seq), timer);
            }
            false
        }
        Err(payload) => (shared.on_panic)(payload.as_ref()),
    }
}

impl EventLoop for RealtimeEventLoop {
    fn dispatch_boxed(&self, task: Task) {
        let mut state = self.shared.state.lock();
        state.queue.push_back(Work::Once(task));
        drop(state);
        self.shared.condvar.notify_one();
    }

    fn dispatch_timer_boxed(&self, delay: Duration, task: TimerTask) {
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.insert((Instant::now() + delay, seq), task);
        drop(state);
        self.shared.condvar.notify_one();
    }

    fn this_thread_is_ev(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn time(&self) -> Time {
        Time::realtime_now()
    }

    fn sync_stop(&self) {
        assert!(
            !self.this_thread_is_ev(),
            "sync_stop must not be called from the event-loop thread"
        );

        {
            let mut state = self.shared.state.lock();
            state.run = false;
        }
        self.shared.condvar.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RealtimeEventLoop {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.run = false;
        }
        self.shared.condvar.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if thread::current().id() != self.thread_id {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoopExt;
    use std::sync::mpsc;

    #[test]
    fn test_dispatch_runs_fifo_on_ev_thread() {
        let evloop = RealtimeEventLoop::with_default_panic_handler();
        let (tx, rx) = mpsc::channel();

        for index in 0..10u32 {
            let tx = tx.clone();
            let evloop_ref = Arc::clone(&evloop);
            evloop.dispatch(move || {
                assert!(evloop_ref.this_thread_is_ev());
                tx.send(index).unwrap();
            });
        }

        let received: Vec<u32> = (0..10).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(received, (0..10).collect::<Vec<u32>>());

        evloop.sync_stop();
    }

    #[test]
    fn test_timer_never_fires_before_deadline() {
        let evloop = RealtimeEventLoop::with_default_panic_handler();
        let (tx, rx) = mpsc::channel();

        let scheduled_at = Instant::now();
        let delay = Duration::from_millis(50);
        evloop.dispatch_timer(delay, move || {
            tx.send(Instant::now()).unwrap();
            Duration::ZERO
        });

        let fired_at = rx.recv().unwrap();
        assert!(fired_at.duration_since(scheduled_at) >= delay);

        evloop.sync_stop();
    }

    #[test]
    fn test_timer_reschedules_until_zero_return() {
        let evloop = RealtimeEventLoop::with_default_panic_handler();
        let (tx, rx) = mpsc::channel();

        let mut remaining = 3u32;
        evloop.dispatch_timer(Duration::from_millis(1), move || {
            tx.send(()).unwrap();
            remaining -= 1;
            if remaining == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(1)
            }
        });

        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(1)).unwrap();
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        evloop.sync_stop();
    }

    #[test]
    fn test_panic_in_callback_keeps_loop_running() {
        let evloop = RealtimeEventLoop::with_default_panic_handler();
        let (tx, rx) = mpsc::channel();

        evloop.dispatch(|| panic!("boom"));
        evloop.dispatch(move || tx.send(42).unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);

        evloop.sync_stop();
    }

    #[test]
    fn test_panic_handler_can_terminate_loop() {
        let evloop = RealtimeEventLoop::new(Box::new(|_| true));
        evloop.dispatch(|| panic!("fatal"));

        // sync_stop returns because the handler stopped the loop
        evloop.sync_stop();
    }

    #[test]
    fn test_this_thread_is_ev_false_for_callers() {
        let evloop = RealtimeEventLoop::with_default_panic_handler();
        assert!(!evloop.this_thread_is_ev());
        evloop.sync_stop();
    }
}
