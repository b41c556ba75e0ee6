//! Network clock implementations
//!
//! Every replica reads the same `NetworkClock` contract. Readings are seconds
//! and MUST be monotonically non-decreasing for one clock instance.

use std::sync::Arc;
use std::time::Instant;

use lockstep_core::NetworkTime;
use parking_lot::{Mutex, RwLock};

use crate::ClockOffsetEstimator;

/// Shared monotonic clock consumed by the synchronization core
pub trait NetworkClock: Send + Sync {
    /// Current reading in seconds
    fn now(&self) -> NetworkTime;
}

impl<T: NetworkClock + ?Sized> NetworkClock for Arc<T> {
    fn now(&self) -> NetworkTime {
        (**self).now()
    }
}

/// Local monotonic clock - seconds since the clock was created
pub struct LocalClock {
    reference: Instant,
}

impl LocalClock {
    pub fn new() -> Self {
        LocalClock {
            reference: Instant::now(),
        }
    }

    #[inline]
    pub fn seconds(&self) -> f64 {
        self.reference.elapsed().as_secs_f64()
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClock for LocalClock {
    fn now(&self) -> NetworkTime {
        NetworkTime::from_secs_f64(self.seconds())
    }
}

/// Externally driven clock, for host loops that own their notion of time
/// and for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    value: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock {
            value: Mutex::new(start),
        }
    }

    pub fn set(&self, secs: f64) {
        *self.value.lock() = secs;
    }

    pub fn advance(&self, secs: f64) {
        *self.value.lock() += secs;
    }
}

impl NetworkClock for ManualClock {
    fn now(&self) -> NetworkTime {
        NetworkTime::from_secs_f64(*self.value.lock())
    }
}

struct SessionState {
    joined: bool,
    estimator: ClockOffsetEstimator,
}

/// Session clock - local monotonic time shifted onto the session's clock.
///
/// While no session is joined, or before the first timing sample arrives, the
/// reading falls back to the local clock. Readings never go backwards, even
/// when the offset estimate moves or the session is left.
pub struct SessionClock {
    local: LocalClock,
    state: RwLock<SessionState>,
    last: Mutex<f64>,
}

impl SessionClock {
    pub fn new() -> Self {
        SessionClock {
            local: LocalClock::new(),
            state: RwLock::new(SessionState {
                joined: false,
                estimator: ClockOffsetEstimator::new(),
            }),
            last: Mutex::new(f64::NEG_INFINITY),
        }
    }

    /// Start using session timing samples
    pub fn join_session(&self) {
        let mut state = self.state.write();
        state.joined = true;
        state.estimator.reset();
        tracing::info!("session clock joined, awaiting timing samples");
    }

    /// Fall back to the local clock
    pub fn leave_session(&self) {
        let mut state = self.state.write();
        state.joined = false;
        state.estimator.reset();
        tracing::info!("session clock left, using local clock");
    }

    pub fn in_session(&self) -> bool {
        self.state.read().joined
    }

    /// Record a session clock reading taken "now" on the local clock
    pub fn observe_remote(&self, remote_secs: f64) {
        let local = self.local.seconds();
        self.observe(local, remote_secs);
    }

    /// Record a `(local, remote)` timing pair. Ignored outside a session.
    pub fn observe(&self, local_secs: f64, remote_secs: f64) {
        let mut state = self.state.write();
        if !state.joined {
            return;
        }
        state.estimator.observe(local_secs, remote_secs);
        tracing::trace!(
            offset = ?state.estimator.offset(),
            jitter = state.estimator.jitter_envelope(),
            "session clock sample"
        );
    }

    /// Current `session - local` offset, if the session clock is usable
    pub fn offset(&self) -> Option<f64> {
        let state = self.state.read();
        if state.joined {
            state.estimator.offset()
        } else {
            None
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClock for SessionClock {
    fn now(&self) -> NetworkTime {
        let local = self.local.seconds();
        let reading = match self.offset() {
            Some(offset) => local + offset,
            None => local,
        };

        let mut last = self.last.lock();
        if reading > *last {
            *last = reading;
        }
        NetworkTime::from_secs_f64(*last)
    }
}
