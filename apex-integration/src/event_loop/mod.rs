use crate::time::Time;
use std::time::Duration;

mod backtest;
mod realtime;

pub use backtest::{BacktestEventLoop, BacktestLoopError, BacktestPeriod, EventSource};
pub use realtime::{PanicHandler, RealtimeEventLoop};

/// A function object dispatched onto the event loop, run exactly once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A timer function. Returning a non-zero [`Duration`] reschedules the timer with that delay;
/// returning [`Duration::ZERO`] retires it.
pub type TimerTask = Box<dyn FnMut() -> Duration + Send + 'static>;

/// The single-threaded cooperative scheduler on which all strategy, order, market-data and
/// matching logic runs.
///
/// Two implementations exist behind this contract:
/// * [`RealtimeEventLoop`] - owns one OS thread; used in live and paper modes.
/// * [`BacktestEventLoop`] - no thread; virtual time driven by [`EventSource`]s.
///
/// Strategy code must not know which one it is running on.
pub trait EventLoop: Send + Sync {
    /// Run `task` on the loop thread, FIFO with respect to other dispatched tasks.
    fn dispatch_boxed(&self, task: Task);

    /// Run `task` after `delay`. A non-zero return value reschedules with that delay.
    fn dispatch_timer_boxed(&self, delay: Duration, task: TimerTask);

    /// Whether the calling thread is the event-loop thread.
    fn this_thread_is_ev(&self) -> bool;

    /// The authoritative "now": wall clock in live/paper, virtual time in backtest.
    fn time(&self) -> Time;

    /// Block until the loop has drained and exited. Must not be called from the loop thread.
    fn sync_stop(&self);
}

/// Closure-friendly sugar over the object-safe [`EventLoop`] core.
pub trait EventLoopExt: EventLoop {
    fn dispatch<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_boxed(Box::new(f))
    }

    fn dispatch_timer<F>(&self, delay: Duration, f: F)
    where
        F: FnMut() -> Duration + Send + 'static,
    {
        self.dispatch_timer_boxed(delay, Box::new(f))
    }
}

impl<T: EventLoop + ?Sized> EventLoopExt for T {}
