use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a single channel.
///
/// `Unstarted → Connecting → Open → Closed`, or `Connecting → Closed` when
/// the connect fails. Nothing leaves `Closed`; a channel is single-use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Unstarted = 0,
    Connecting = 1,
    Open = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelState::Unstarted,
            1 => ChannelState::Connecting,
            2 => ChannelState::Open,
            _ => ChannelState::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Unstarted => "unstarted",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Channel state shared between the owner and its receive loop.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ChannelState::Unstarted as u8)))
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from → to` atomically; on mismatch returns the actual state.
    pub fn transition(&self, from: ChannelState, to: ChannelState) -> Result<(), ChannelState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ChannelState::from_u8)
    }

    /// Mark closed, returning the previous state.
    pub fn close(&self) -> ChannelState {
        ChannelState::from_u8(self.0.swap(ChannelState::Closed as u8, Ordering::AcqRel))
    }

    /// Mark open unless something already closed the channel.
    pub(crate) fn open(&self) -> bool {
        self.transition(ChannelState::Connecting, ChannelState::Open)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unstarted() {
        assert_eq!(StateCell::new().get(), ChannelState::Unstarted);
    }

    #[test]
    fn transition_follows_lifecycle() {
        let state = StateCell::new();
        state
            .transition(ChannelState::Unstarted, ChannelState::Connecting)
            .unwrap();
        assert!(state.open());
        assert_eq!(state.get(), ChannelState::Open);
        assert_eq!(state.close(), ChannelState::Open);
        assert_eq!(state.get(), ChannelState::Closed);
    }

    #[test]
    fn closed_is_terminal() {
        let state = StateCell::new();
        state.close();
        let err = state
            .transition(ChannelState::Unstarted, ChannelState::Connecting)
            .unwrap_err();
        assert_eq!(err, ChannelState::Closed);
        assert!(!state.open());
    }

    #[test]
    fn clones_share_state() {
        let state = StateCell::new();
        let loop_view = state.clone();
        loop_view.close();
        assert_eq!(state.get(), ChannelState::Closed);
    }
}
