//! Background receive loop shared by both channel kinds.
//!
//! One thread per open channel. The thread polls its [`UnitSource`] with a
//! bounded timeout, hands every received unit to the callback, and exits on
//! a stop request or the first fatal read. It never reconnects.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::state::StateCell;

/// Something a receive loop can pull whole units (messages, packets) from.
pub trait UnitSource: Send + 'static {
    /// One delivered message or packet.
    type Unit: Send + 'static;
    /// Fatal receive condition.
    type Error: fmt::Display;

    /// Wait at most one poll interval for a unit.
    ///
    /// `Ok(None)` means nothing was ready this cycle. Any `Err` ends the loop.
    fn poll_unit(&mut self) -> Result<Option<Self::Unit>, Self::Error>;

    /// Whether `err` is an orderly close by the peer rather than a failure.
    fn is_peer_closed(_err: &Self::Error) -> bool {
        false
    }
}

/// Handle to a running receive loop thread.
pub struct ReceiveLoop {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Start a loop thread named `name` that feeds `on_unit`.
    ///
    /// `state` is marked closed when the loop exits for any reason.
    pub fn spawn<S, F>(
        name: impl Into<String>,
        mut source: S,
        state: StateCell,
        mut on_unit: F,
    ) -> std::io::Result<Self>
    where
        S: UnitSource,
        F: FnMut(S::Unit) + Send + 'static,
    {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _closed = CloseOnExit(state);
            while !thread_stop.load(Ordering::Acquire) {
                match source.poll_unit() {
                    Ok(Some(unit)) => on_unit(unit),
                    Ok(None) => continue,
                    Err(err) if S::is_peer_closed(&err) => {
                        debug!(channel = %thread_name, "connection closed by peer");
                        return;
                    }
                    Err(err) if thread_stop.load(Ordering::Acquire) => {
                        debug!(channel = %thread_name, error = %err, "receive loop stopped mid-read");
                        return;
                    }
                    Err(err) => {
                        warn!(channel = %thread_name, error = %err, "receive loop terminated");
                        return;
                    }
                }
            }
            debug!(channel = %thread_name, "receive loop stopped");
        })?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the loop to exit after its current poll.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the loop thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Stop the loop and wait for it.
    ///
    /// Waits at most about one poll interval. When called from the loop's
    /// own thread (i.e. from inside the callback) it only raises the stop
    /// flag; the loop exits once the callback returns. Repeated calls are
    /// no-ops.
    pub fn stop(&mut self) {
        self.request_stop();
        let Some(handle) = self.handle.take() else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            debug!(channel = %self.name, "stop requested from receive callback; not joining");
            return;
        }

        if handle.join().is_err() {
            warn!(channel = %self.name, "receive loop panicked");
        }
    }

    /// Thread name of this loop.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ReceiveLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveLoop")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct CloseOnExit(StateCell);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::state::ChannelState;

    #[derive(Debug)]
    enum Step {
        Unit(u32),
        Idle,
        Closed,
        Fail,
    }

    #[derive(Debug)]
    enum ScriptError {
        Closed,
        Fail,
    }

    impl fmt::Display for ScriptError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    struct Scripted {
        steps: VecDeque<Step>,
        polls: Arc<Mutex<usize>>,
    }

    impl UnitSource for Scripted {
        type Unit = u32;
        type Error = ScriptError;

        fn poll_unit(&mut self) -> Result<Option<u32>, ScriptError> {
            *self.polls.lock().unwrap() += 1;
            match self.steps.pop_front() {
                Some(Step::Unit(n)) => Ok(Some(n)),
                Some(Step::Closed) => Err(ScriptError::Closed),
                Some(Step::Fail) => Err(ScriptError::Fail),
                Some(Step::Idle) | None => {
                    thread::sleep(Duration::from_millis(5));
                    Ok(None)
                }
            }
        }

        fn is_peer_closed(err: &ScriptError) -> bool {
            matches!(err, ScriptError::Closed)
        }
    }

    fn scripted(steps: Vec<Step>) -> (Scripted, Arc<Mutex<usize>>) {
        let polls = Arc::new(Mutex::new(0));
        (
            Scripted {
                steps: steps.into(),
                polls: Arc::clone(&polls),
            },
            polls,
        )
    }

    fn wait_for(state: &StateCell, expected: ChannelState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while state.get() != expected {
            assert!(Instant::now() < deadline, "state never became {expected}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn delivers_units_and_skips_idle_cycles() {
        let (source, _) = scripted(vec![Step::Unit(1), Step::Idle, Step::Unit(2), Step::Closed]);
        let state = StateCell::new();
        let (tx, rx) = mpsc::channel();

        let _rl = ReceiveLoop::spawn("test-deliver", source, state.clone(), move |n| {
            tx.send(n).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
        wait_for(&state, ChannelState::Closed);
    }

    #[test]
    fn fatal_error_ends_loop_and_closes_state() {
        let (source, polls) = scripted(vec![Step::Fail, Step::Unit(9)]);
        let state = StateCell::new();

        let rl = ReceiveLoop::spawn("test-fatal", source, state.clone(), |_| {
            panic!("no unit should be delivered after a fatal read")
        })
        .unwrap();

        wait_for(&state, ChannelState::Closed);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !rl.is_finished() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*polls.lock().unwrap(), 1);
    }

    #[test]
    fn stop_joins_idle_loop_and_is_repeatable() {
        let (source, _) = scripted(vec![]);
        let state = StateCell::new();
        let mut rl = ReceiveLoop::spawn("test-stop", source, state.clone(), |_| {}).unwrap();

        let start = Instant::now();
        rl.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(rl.is_finished());
        assert_eq!(state.get(), ChannelState::Closed);

        rl.stop();
    }

    #[test]
    fn stop_from_callback_does_not_deadlock() {
        let (source, _) = scripted(vec![Step::Unit(1), Step::Unit(2)]);
        let state = StateCell::new();
        let slot: Arc<Mutex<Option<ReceiveLoop>>> = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel();

        let callback_slot = Arc::clone(&slot);
        let rl = ReceiveLoop::spawn("test-reentrant", source, state.clone(), move |n| {
            if let Some(mut rl) = callback_slot.lock().unwrap().take() {
                rl.stop();
            }
            tx.send(n).unwrap();
        })
        .unwrap();
        *slot.lock().unwrap() = Some(rl);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);
        wait_for(&state, ChannelState::Closed);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
