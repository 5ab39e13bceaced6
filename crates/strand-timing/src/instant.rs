use std::ops::{Add, AddAssign, Sub};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static CLOCK: Lazy<quanta::Clock> = Lazy::new(quanta::Clock::new);
static EPOCH: Lazy<quanta::Instant> = Lazy::new(|| CLOCK.now());

/// A span of milliseconds.
///
/// Every blocking primitive in the runtime takes a `Millis` timeout:
/// `ZERO` means non-blocking, [`Millis::INFINITE`] means wait forever.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct Millis(pub u64);

impl Millis {
    pub const INFINITE: Self = Self(u64::MAX);
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s * 1_000)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Millis) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn saturating_add(self, rhs: Millis) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn clamp_to(self, min: Millis, max: Millis) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl From<Millis> for std::time::Duration {
    fn from(m: Millis) -> Self {
        std::time::Duration::from_millis(m.0)
    }
}

impl Add for Millis {
    type Output = Millis;

    fn add(self, rhs: Millis) -> Millis {
        Millis(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Millis {
    type Output = Millis;

    fn sub(self, rhs: Millis) -> Millis {
        Millis(self.0.saturating_sub(rhs.0))
    }
}

/// A monotonic point in time, in milliseconds since the process clock
/// epoch (first use of the clock).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct Instant(pub u64);

impl Instant {
    pub const MAX: Self = Self(u64::MAX);
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn now() -> Self {
        Instant(CLOCK.now().duration_since(*EPOCH).as_millis() as u64)
    }

    #[inline]
    pub fn elapsed(&self) -> Millis {
        Instant::now().saturating_sub(*self)
    }

    #[inline]
    pub fn saturating_sub(&self, other: Instant) -> Millis {
        Millis(self.0.saturating_sub(other.0))
    }
}

impl Sub for Instant {
    type Output = Millis;

    fn sub(self, rhs: Instant) -> Millis {
        self.saturating_sub(rhs)
    }
}

impl Add<Millis> for Instant {
    type Output = Instant;

    fn add(self, rhs: Millis) -> Instant {
        Instant(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<Millis> for Instant {
    fn add_assign(&mut self, rhs: Millis) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}
