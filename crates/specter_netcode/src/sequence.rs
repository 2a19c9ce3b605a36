//! # Sequence Arithmetic
//!
//! Ticks and packet sequence numbers are fixed-width counters that wrap.
//! Ordering is defined on the circle, never on the raw integers:
//!
//! ```text
//!              b
//!        ┌─────●─────┐        a is newer than b iff (a - b) mod 2^w
//!       /             \       lies in (0, 2^(w-1)).
//!      ●a   "newer"    │
//!       \   half      /       Exactly half a turn apart: neither is newer.
//!        └───────────┘
//! ```
//!
//! Every comparison of ticks in this crate goes through this module.

use std::fmt;

/// Wraparound-safe ordering for unsigned counters of any width.
pub trait SequenceNumber: Copy + Eq {
    /// Returns true iff `self` is ahead of `other` on the wrapping counter.
    ///
    /// `a.is_newer(a)` is always false. When the two values are exactly
    /// half the range apart neither is newer than the other.
    fn is_newer(self, other: Self) -> bool;

    /// Returns the newer of two values (ties keep `self`).
    #[inline]
    #[must_use]
    fn newest(self, other: Self) -> Self {
        if other.is_newer(self) {
            other
        } else {
            self
        }
    }

    /// Returns the older of two values (ties keep `self`).
    #[inline]
    #[must_use]
    fn oldest(self, other: Self) -> Self {
        if self.is_newer(other) {
            other
        } else {
            self
        }
    }
}

macro_rules! impl_sequence_number {
    ($($t:ty),*) => {
        $(
            impl SequenceNumber for $t {
                #[inline]
                fn is_newer(self, other: Self) -> bool {
                    const HALF: $t = 1 << (<$t>::BITS - 1);
                    let diff = self.wrapping_sub(other);
                    diff != 0 && diff < HALF
                }
            }
        )*
    };
}

impl_sequence_number!(u8, u16, u32, u64);

/// Returns true iff `a` is ahead of `b` on the wrapping counter.
#[inline]
#[must_use]
pub fn is_newer<S: SequenceNumber>(a: S, b: S) -> bool {
    a.is_newer(b)
}

/// A simulation tick.
///
/// `Tick::NONE` (0) means "no tick"; [`Tick::next`] skips it so a running
/// tick counter never lands on the sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Tick(u32);

impl Tick {
    /// The "no tick" sentinel.
    pub const NONE: Self = Self(0);

    /// Wraps a raw tick value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for the sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns true iff `self` is ahead of `other`.
    #[inline]
    #[must_use]
    pub fn is_newer_than(self, other: Self) -> bool {
        self.0.is_newer(other.0)
    }

    /// Returns the following tick, skipping the sentinel on wrap.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            value => Self(value),
        }
    }

    /// Signed number of ticks from `earlier` to `self` on the circle.
    ///
    /// Positive when `self` is newer.
    #[inline]
    #[must_use]
    pub const fn distance_from(self, earlier: Self) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Unsigned number of ticks `self` is ahead of `earlier`, modulo 2^32.
    #[inline]
    #[must_use]
    pub const fn ticks_since(self, earlier: Self) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl SequenceNumber for Tick {
    #[inline]
    fn is_newer(self, other: Self) -> bool {
        self.is_newer_than(other)
    }
}

impl From<u32> for Tick {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "tick(none)")
        } else {
            write!(f, "tick({})", self.0)
        }
    }
}
