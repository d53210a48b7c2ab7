//! Time base of the frame graph: a monotonic robot clock and the validity windows of transforms.
use bincode::{Decode, Encode};
pub use quanta::Instant;
use quanta::{Clock, Mock};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::Duration;

/// Nanoseconds since the reference of a [`RobotClock`].
/// It is always positive to simplify the reasoning on the user side.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Encode,
    Decode,
)]
pub struct ClockTime(pub u64);

impl ClockTime {
    pub const MIN: ClockTime = ClockTime(0);
    pub const MAX: ClockTime = ClockTime(u64::MAX);

    pub fn saturating_add(self, duration: Duration) -> Self {
        ClockTime(self.0.saturating_add(duration_to_nanos(duration)))
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl From<Duration> for ClockTime {
    fn from(duration: Duration) -> Self {
        ClockTime(duration_to_nanos(duration))
    }
}

impl From<ClockTime> for Duration {
    fn from(time: ClockTime) -> Self {
        Duration::from_nanos(time.0)
    }
}

impl From<u64> for ClockTime {
    fn from(nanos: u64) -> Self {
        ClockTime(nanos)
    }
}

impl Add<Duration> for ClockTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub for ClockTime {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration::from_nanos(self.0.saturating_sub(rhs.0))
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let nanos = self.0;
        if nanos == u64::MAX {
            write!(f, "end of time")
        } else if nanos >= 86_400_000_000_000 {
            write!(f, "{:.3} d", nanos as f64 / 86_400_000_000_000.0)
        } else if nanos >= 3_600_000_000_000 {
            write!(f, "{:.3} h", nanos as f64 / 3_600_000_000_000.0)
        } else if nanos >= 60_000_000_000 {
            write!(f, "{:.3} m", nanos as f64 / 60_000_000_000.0)
        } else if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1_000_000_000.0)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1_000_000.0)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1_000.0)
        } else {
            write!(f, "{nanos} ns")
        }
    }
}

/// A running robot clock.
/// The clock is monotonic and starts at an arbitrary reference time.
/// A clone is the same clock, even when mocked.
#[derive(Clone, Debug)]
pub struct RobotClock {
    inner: Clock,
    ref_time: Instant,
}

/// Controls every clone of a mocked [`RobotClock`].
#[derive(Debug, Clone)]
pub struct RobotClockMock(Arc<Mock>);

impl RobotClockMock {
    pub fn increment(&self, amount: Duration) {
        self.0.increment(amount);
    }

    /// Decrements the time by the given amount.
    /// Be careful this breaks the monotonicity of the clock.
    pub fn decrement(&self, amount: Duration) {
        self.0.decrement(amount);
    }

    pub fn value(&self) -> u64 {
        self.0.value()
    }

    /// Sets the absolute value of the time.
    pub fn set_value(&self, value: u64) {
        let current = self.0.value();
        if current < value {
            self.increment(Duration::from_nanos(value - current));
        } else {
            self.decrement(Duration::from_nanos(current - value));
        }
    }
}

impl RobotClock {
    /// Creates a clock using now as its reference time.
    pub fn new() -> Self {
        let clock = Clock::new();
        let ref_time = clock.now();
        RobotClock {
            inner: clock,
            ref_time,
        }
    }

    /// A fake clock with a reference time of 0, driven through the returned mock.
    pub fn mock() -> (Self, RobotClockMock) {
        let (clock, mock) = Clock::mock();
        let ref_time = clock.now();
        (
            RobotClock {
                inner: clock,
                ref_time,
            },
            RobotClockMock(mock),
        )
    }

    #[inline]
    pub fn now(&self) -> ClockTime {
        (self.inner.now() - self.ref_time).into()
    }
}

impl Default for RobotClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The time window during which a transform can be trusted: `start <= t < expiration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Validity {
    pub start: ClockTime,
    pub expiration: ClockTime,
}

impl Validity {
    pub fn starting_at(start: ClockTime, duration: Duration) -> Self {
        Validity {
            start,
            expiration: start + duration,
        }
    }

    pub fn starting_now(clock: &RobotClock, duration: Duration) -> Self {
        Self::starting_at(clock.now(), duration)
    }

    /// The longest possible window, used for static relationships.
    pub fn forever() -> Self {
        Validity {
            start: ClockTime::MIN,
            expiration: ClockTime::MAX,
        }
    }

    pub fn is_valid_at(&self, time: ClockTime) -> bool {
        self.start <= time && time < self.expiration
    }

    pub fn is_valid_now(&self, clock: &RobotClock) -> bool {
        self.is_valid_at(clock.now())
    }

    pub fn is_empty(&self) -> bool {
        self.expiration <= self.start
    }

    pub fn duration(&self) -> Duration {
        self.expiration - self.start
    }

    /// Intersection of two windows. Disjoint windows give an empty window.
    pub fn overlap(&self, other: &Validity) -> Validity {
        let start = self.start.max(other.start);
        let expiration = self.expiration.min(other.expiration).max(start);
        Validity { start, expiration }
    }
}

impl Default for Validity {
    fn default() -> Self {
        Self::forever()
    }
}

impl Display for Validity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.expiration)
    }
}
