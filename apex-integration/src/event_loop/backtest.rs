use super::{EventLoop, Task, TimerTask};
use crate::time::Time;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, info};

/// Inclusive time range of a backtest run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BacktestPeriod {
    pub from: Time,
    pub upto: Time,
}

impl BacktestPeriod {
    pub fn new(from: Time, upto: Time) -> Result<Self, BacktestLoopError> {
        if !from.is_empty() && !upto.is_empty() && from > upto {
            return Err(BacktestLoopError::BadPeriod { from, upto });
        }
        Ok(Self { from, upto })
    }
}

#[derive(Debug, Clone, Error)]
pub enum BacktestLoopError {
    #[error("bad backtest period, from {from} cannot be later than upto {upto}")]
    BadPeriod { from: Time, upto: Time },

    #[error("backtest time cannot go backwards, from {current} to {next}")]
    TimeWentBackwards { current: Time, next: Time },
}

/// An external source of time-ordered events merged into the [`BacktestEventLoop`], eg/ a
/// tick-file replayer.
pub trait EventSource: Send {
    /// Time of the next available event; empty iff the source is drained.
    fn next_event_time(&mut self) -> Time;

    /// Advance by exactly one event. May schedule further work on the loop.
    fn consume_next_event(&mut self);

    fn init_backtest_time_range(&mut self, _from: Time, _upto: Time) {}
}

struct PendingTimer {
    interval: Duration,
    task: TimerTask,
}

/// Timers scheduled against virtual time. Timers created before the loop has learned its
/// first event time are buffered and attached once it does.
struct BacktestTimers {
    scheduled: BTreeMap<(Time, u64), TimerTask>,
    pending: Vec<PendingTimer>,
    next_seq: u64,
}

impl BacktestTimers {
    fn new() -> Self {
        Self {
            scheduled: BTreeMap::new(),
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    fn add(&mut self, current: Time, interval: Duration, task: TimerTask) {
        if current.is_empty() {
            self.pending.push(PendingTimer { interval, task });
        } else {
            self.schedule(current, interval, task);
        }
    }

    fn schedule(&mut self, current: Time, interval: Duration, task: TimerTask) {
        let due = current + interval;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.scheduled.insert((due, seq), task);
    }

    fn schedule_pending(&mut self, current: Time) {
        for timer in std::mem::take(&mut self.pending) {
            self.schedule(current, timer.interval, timer.task);
        }
    }

    fn next_due(&self) -> Time {
        self.scheduled
            .keys()
            .next()
            .map(|(due, _)| *due)
            .unwrap_or_else(Time::zero)
    }

    fn pop_due(&mut self) -> Option<(Time, TimerTask)> {
        let key = *self.scheduled.keys().next()?;
        let task = self.scheduled.remove(&key)?;
        Some((key.0, task))
    }
}

/// Event loop for backtests. Holds a set of [`EventSource`]s plus an internal timer source,
/// and replays them in merged time order with no OS thread of its own - `run_loop` drives
/// everything synchronously on the caller thread.
pub struct BacktestEventLoop {
    sources: Mutex<Vec<Box<dyn EventSource>>>,
    timers: Mutex<BacktestTimers>,
    /// Current virtual time in epoch micros; 0 until the first event time is known.
    current_us: AtomicI64,
    from: Time,
}

impl std::fmt::Debug for BacktestEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestEventLoop")
            .field("current", &self.time())
            .field("from", &self.from)
            .finish()
    }
}

enum NextEvent {
    Source(usize),
    Timer,
}

impl BacktestEventLoop {
    pub fn new(from: Time) -> Self {
        Self {
            sources: Mutex::new(Vec::new()),
            timers: Mutex::new(BacktestTimers::new()),
            current_us: AtomicI64::new(from.as_epoch_us()),
            from,
        }
    }

    pub fn add_event_source(&self, source: Box<dyn EventSource>) {
        self.sources.lock().push(source);
    }

    /// Run the loop until every source (and timer) is drained, or virtual time passes `upto`.
    ///
    /// Returns the number of events consumed. Virtual time moving backwards is a fatal
    /// error; a panic escaping a callback terminates the loop.
    pub fn run_loop(&self, upto: Time) -> Result<u64, BacktestLoopError> {
        let mut sources = self.sources.lock();

        for source in sources.iter_mut() {
            source.init_backtest_time_range(self.from, upto);
        }

        if !self.from.is_empty() && self.time() < self.from {
            self.update_current_time(self.from)?;
        }

        info!(from = %self.from, %upto, "starting backtest event loop");
        let mut event_count = 0u64;

        loop {
            let (next_time, next_event) = {
                let timer_due = self.timers.lock().next_due();
                let mut earliest = (timer_due, NextEvent::Timer);

                for (index, source) in sources.iter_mut().enumerate() {
                    let t = source.next_event_time();
                    if !t.is_empty() && (earliest.0.is_empty() || t < earliest.0) {
                        earliest = (t, NextEvent::Source(index));
                    }
                }
                earliest
            };

            if next_time.is_empty() {
                info!(event_count, "backtest ran out of data");
                break;
            }

            self.update_current_time(next_time)?;
            event_count += 1;

            let consumed = match next_event {
                NextEvent::Source(index) => {
                    let source = &mut sources[index];
                    std::panic::catch_unwind(AssertUnwindSafe(|| source.consume_next_event()))
                }
                NextEvent::Timer => self.consume_timer(),
            };

            if consumed.is_err() {
                error!("caught panic at backtest event loop; terminating");
                break;
            }

            let current = self.time();
            if !upto.is_empty() && upto < current {
                info!(event_count, "backtest reached end time - backtest complete");
                break;
            }
        }

        Ok(event_count)
    }

    fn consume_timer(&self) -> std::thread::Result<()> {
        let Some((due, mut task)) = self.timers.lock().pop_due() else {
            return Ok(());
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(&mut task));
        match result {
            Ok(reschedule) => {
                if !reschedule.is_zero() {
                    self.timers.lock().schedule(due, reschedule, task);
                }
                Ok(())
            }
            Err(payload) => Err(payload),
        }
    }

    fn update_current_time(&self, next: Time) -> Result<(), BacktestLoopError> {
        let current = self.time();
        if current == next {
            return Ok(());
        }

        if current.is_empty() {
            info!(start = %next, "setting backtest start time");
            self.timers.lock().schedule_pending(next);
        } else if next < current {
            return Err(BacktestLoopError::TimeWentBackwards { current, next });
        }

        self.current_us.store(next.as_epoch_us(), Ordering::Release);
        Ok(())
    }
}

impl EventLoop for BacktestEventLoop {
    fn dispatch_boxed(&self, task: Task) {
        // an immediate callback is modelled as a 1ms timer in virtual time
        let mut task = Some(task);
        self.dispatch_timer_boxed(
            Duration::from_millis(1),
            Box::new(move || {
                if let Some(task) = task.take() {
                    task();
                }
                Duration::ZERO
            }),
        );
    }

    fn dispatch_timer_boxed(&self, delay: Duration, task: TimerTask) {
        let current = self.time();
        self.timers.lock().add(current, delay, task);
    }

    fn this_thread_is_ev(&self) -> bool {
        // single-threaded by construction
        true
    }

    fn time(&self) -> Time {
        Time::from_epoch_us(self.current_us.load(Ordering::Acquire))
    }

    fn sync_stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoopExt;
    use std::sync::{mpsc, Arc};

    /// Fixed series of event times, recording consumption into a shared log.
    struct SeriesSource {
        name: &'static str,
        times: Vec<Time>,
        log: mpsc::Sender<(&'static str, Time)>,
    }

    impl EventSource for SeriesSource {
        fn next_event_time(&mut self) -> Time {
            self.times.first().copied().unwrap_or_else(Time::zero)
        }

        fn consume_next_event(&mut self) {
            let time = self.times.remove(0);
            self.log.send((self.name, time)).unwrap();
        }
    }

    fn us(n: i64) -> Time {
        Time::from_epoch_us(n)
    }

    #[test]
    fn test_sources_consumed_in_merged_time_order() {
        let (tx, rx) = mpsc::channel();
        let base = 1_700_000_000_000_000;

        let evloop = BacktestEventLoop::new(Time::zero());
        evloop.add_event_source(Box::new(SeriesSource {
            name: "a",
            times: vec![us(base), us(base + 1_000)],
            log: tx.clone(),
        }));
        evloop.add_event_source(Box::new(SeriesSource {
            name: "b",
            times: vec![us(base + 500)],
            log: tx,
        }));

        evloop.run_loop(Time::zero()).unwrap();

        let consumed: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            consumed,
            vec![
                ("a", us(base)),
                ("b", us(base + 500)),
                ("a", us(base + 1_000)),
            ]
        );
    }

    #[test]
    fn test_consumption_times_are_non_decreasing() {
        let (tx, rx) = mpsc::channel();
        let base = 1_700_000_000_000_000;

        let evloop = BacktestEventLoop::new(Time::zero());
        evloop.add_event_source(Box::new(SeriesSource {
            name: "a",
            times: (0..50).map(|i| us(base + i * 250)).collect(),
            log: tx.clone(),
        }));
        evloop.add_event_source(Box::new(SeriesSource {
            name: "b",
            times: (0..50).map(|i| us(base + 100 + i * 333)).collect(),
            log: tx,
        }));

        evloop.run_loop(Time::zero()).unwrap();

        let times: Vec<Time> = rx.try_iter().map(|(_, t)| t).collect();
        assert_eq!(times.len(), 100);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_time_backwards_is_fatal() {
        struct BackwardsSource {
            times: Vec<Time>,
        }

        impl EventSource for BackwardsSource {
            fn next_event_time(&mut self) -> Time {
                self.times.first().copied().unwrap_or_else(Time::zero)
            }

            fn consume_next_event(&mut self) {
                self.times.remove(0);
            }
        }

        let base = 1_700_000_000_000_000;
        let evloop = BacktestEventLoop::new(Time::zero());
        // second event is earlier than the first: the merge sort cannot produce this from
        // well-formed sources, so the loop must treat it as fatal
        evloop.add_event_source(Box::new(BackwardsSource {
            times: vec![us(base + 1_000), us(base)],
        }));

        assert!(matches!(
            evloop.run_loop(Time::zero()),
            Err(BacktestLoopError::TimeWentBackwards { .. })
        ));
    }

    #[test]
    fn test_bad_period_rejected() {
        let base = 1_700_000_000_000_000;
        assert!(matches!(
            BacktestPeriod::new(us(base + 1), us(base)),
            Err(BacktestLoopError::BadPeriod { .. })
        ));
        assert!(BacktestPeriod::new(us(base), us(base + 1)).is_ok());
    }

    #[test]
    fn test_dispatch_before_first_event_time_is_buffered() {
        let (tx, rx) = mpsc::channel();
        let base = 1_700_000_000_000_000;

        let evloop = Arc::new(BacktestEventLoop::new(Time::zero()));

        // dispatched before any event time is known: buffered, attached at first event time
        let evloop_ref = Arc::clone(&evloop);
        let tick_tx = tx.clone();
        evloop.dispatch(move || {
            tick_tx.send(("task", evloop_ref.time())).unwrap();
        });

        evloop.add_event_source(Box::new(SeriesSource {
            name: "a",
            times: vec![us(base), us(base + 10_000)],
            log: tx,
        }));

        evloop.run_loop(Time::zero()).unwrap();

        let consumed: Vec<_> = rx.try_iter().collect();
        assert_eq!(consumed[0], ("a", us(base)));
        // the buffered dispatch fires 1ms after the first event time
        assert_eq!(consumed[1], ("task", us(base + 1_000)));
        assert_eq!(consumed[2], ("a", us(base + 10_000)));
    }

    #[test]
    fn test_timer_reschedules_in_virtual_time() {
        let (tx, rx) = mpsc::channel();
        let base = 1_700_000_000_000_000;

        let evloop = Arc::new(BacktestEventLoop::new(us(base)));
        evloop.add_event_source(Box::new(SeriesSource {
            name: "a",
            times: vec![us(base + 1), us(base + 30_000)],
            log: tx.clone(),
        }));

        let evloop_ref = Arc::clone(&evloop);
        let mut fires = 0;
        evloop.dispatch_timer(Duration::from_millis(10), move || {
            tx.send(("timer", evloop_ref.time())).unwrap();
            fires += 1;
            if fires < 2 {
                Duration::from_millis(10)
            } else {
                Duration::ZERO
            }
        });

        evloop.run_loop(Time::zero()).unwrap();

        let consumed: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            consumed,
            vec![
                ("a", us(base + 1)),
                ("timer", us(base + 10_000)),
                ("timer", us(base + 20_000)),
                ("a", us(base + 30_000)),
            ]
        );
    }

    #[test]
    fn test_run_loop_stops_past_upto() {
        let (tx, rx) = mpsc::channel();
        let base = 1_700_000_000_000_000;

        let evloop = BacktestEventLoop::new(Time::zero());
        evloop.add_event_source(Box::new(SeriesSource {
            name: "a",
            times: vec![us(base), us(base + 1_000), us(base + 2_000_000)],
            log: tx,
        }));

        evloop.run_loop(us(base + 10_000)).unwrap();

        // the event past `upto` is still consumed before the bound check terminates the loop
        let consumed: Vec<_> = rx.try_iter().collect();
        assert_eq!(consumed.len(), 3);
    }
}
