#[cfg(loom)]
use loom::sync::atomic::{AtomicU8, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a server.
///
/// Legal transitions are `Stopped -> Started` and `Started -> Stopping -> Stopped`.
/// Once stopping has begun the cell is sealed and never starts again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Stopped = 0,
    Started = 1,
    Stopping = 2,
}

const SEALED: u8 = 0x80;

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v & !SEALED {
            1 => Self::Started,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Started => write!(f, "started"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Tri-state lifecycle cell guarded by compare-and-swap.
///
/// The server is the only writer. Concurrent `Start` callers are resolved by the
/// CAS: exactly one of them observes `try_start() == true`. The high bit marks the
/// cell sealed, so a start racing a stop can never win after the stop began.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Stopped as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Stopped -> Started`. Returns `false` (and changes nothing) from any other
    /// state, and always once the cell is sealed.
    pub fn try_start(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Stopped as u8,
                LifecycleState::Started as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks shutdown intent and seals the cell. Unconditional, so a stop issued
    /// before start still passes through `Stopping`.
    ///
    /// Returns `true` for the call that sealed it.
    pub fn begin_stop(&self) -> bool {
        let prev = self
            .state
            .swap(LifecycleState::Stopping as u8 | SEALED, Ordering::AcqRel);
        prev & SEALED == 0
    }

    pub fn finish_stop(&self) {
        self.state
            .store(LifecycleState::Stopped as u8 | SEALED, Ordering::Release);
    }

    /// Whether a stop has begun. A sealed cell refuses `try_start`.
    pub fn is_sealed(&self) -> bool {
        self.state.load(Ordering::Acquire) & SEALED != 0
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
