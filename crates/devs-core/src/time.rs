//! Simulated time model.
//!
//! # Design
//!
//! Simulated instants ([`Time`]) and spans ([`Duration`]) are integer tick
//! counts tagged with a [`TimeUnit`].  Using integer ticks as the canonical
//! representation means all clock arithmetic is exact: the kernel's
//! consistency checks (`tol + elapsed == coordinator.tol`, `nta == tne - tol`)
//! are plain equalities with no floating-point tolerance.
//!
//! Values expressed in different units compare by their nanosecond value.
//! Arithmetic between different units yields a result in the finer of the two
//! units, so no precision is lost.
//!
//! `u64::MAX` ticks is reserved as the `INFINITY` sentinel: a model that is
//! passive has an infinite time advance, and a coordinator with only passive
//! children has an infinite time of next event.  Infinity absorbs addition.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Sub};

/// Raw tick value reserved for infinity.
const INFINITE: u64 = u64::MAX;

// ── TimeUnit ──────────────────────────────────────────────────────────────────

/// Resolution of one tick.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Nanoseconds represented by one tick of this unit.
    #[inline]
    pub const fn nanos_per_tick(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds  => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds      => 1_000_000_000,
            TimeUnit::Minutes      => 60_000_000_000,
            TimeUnit::Hours        => 3_600_000_000_000,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds  => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds      => "s",
            TimeUnit::Minutes      => "min",
            TimeUnit::Hours        => "h",
        }
    }

    /// The finer (smaller tick) of two units.
    #[inline]
    pub fn finer(self, other: TimeUnit) -> TimeUnit {
        if self.nanos_per_tick() <= other.nanos_per_tick() { self } else { other }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Convert a finite tick count between units.  Conversion to a coarser unit
/// truncates; results that would overflow saturate just below infinity.
fn convert_ticks(ticks: u64, from: TimeUnit, to: TimeUnit) -> u64 {
    if ticks == INFINITE || from == to {
        return ticks;
    }
    let nanos = ticks as u128 * from.nanos_per_tick() as u128;
    let converted = nanos / to.nanos_per_tick() as u128;
    u64::try_from(converted).map_or(INFINITE - 1, |t| t.min(INFINITE - 1))
}

#[inline]
fn nanos_of(ticks: u64, unit: TimeUnit) -> u128 {
    ticks as u128 * unit.nanos_per_tick() as u128
}

/// Total order on (ticks, unit) pairs with infinity greater than everything.
fn compare(a_ticks: u64, a_unit: TimeUnit, b_ticks: u64, b_unit: TimeUnit) -> Ordering {
    match (a_ticks == INFINITE, b_ticks == INFINITE) {
        (true, true)   => Ordering::Equal,
        (true, false)  => Ordering::Greater,
        (false, true)  => Ordering::Less,
        (false, false) if a_unit == b_unit => a_ticks.cmp(&b_ticks),
        (false, false) => nanos_of(a_ticks, a_unit).cmp(&nanos_of(b_ticks, b_unit)),
    }
}

fn hash_ticks<H: Hasher>(ticks: u64, unit: TimeUnit, state: &mut H) {
    if ticks == INFINITE {
        u128::MAX.hash(state);
    } else {
        nanos_of(ticks, unit).hash(state);
    }
}

// ── Duration ──────────────────────────────────────────────────────────────────

/// A span of simulated time, possibly infinite.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Duration {
    ticks: u64,
    unit:  TimeUnit,
}

impl Duration {
    /// The distinguished infinite duration (time advance of a passive model).
    pub const INFINITY: Duration = Duration { ticks: INFINITE, unit: TimeUnit::Seconds };

    #[inline]
    pub const fn new(ticks: u64, unit: TimeUnit) -> Self {
        Self { ticks, unit }
    }

    #[inline]
    pub const fn zero(unit: TimeUnit) -> Self {
        Self { ticks: 0, unit }
    }

    #[inline]
    pub const fn infinity(unit: TimeUnit) -> Self {
        Self { ticks: INFINITE, unit }
    }

    #[inline]
    pub const fn seconds(secs: u64) -> Self {
        Self::new(secs, TimeUnit::Seconds)
    }

    #[inline]
    pub const fn millis(ms: u64) -> Self {
        Self::new(ms, TimeUnit::Milliseconds)
    }

    /// Nearest duration to `secs` seconds expressed in `unit`.
    ///
    /// Non-finite input yields infinity; negative input yields zero.
    pub fn from_secs_f64(secs: f64, unit: TimeUnit) -> Self {
        if !secs.is_finite() {
            return Self::infinity(unit);
        }
        let ticks = (secs * 1e9 / unit.nanos_per_tick() as f64).round();
        if ticks <= 0.0 {
            Self::zero(unit)
        } else if ticks >= (INFINITE - 1) as f64 {
            Self::new(INFINITE - 1, unit)
        } else {
            Self::new(ticks as u64, unit)
        }
    }

    #[inline]
    pub const fn ticks(self) -> u64 {
        self.ticks
    }

    #[inline]
    pub const fn unit(self) -> TimeUnit {
        self.unit
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.ticks == INFINITE
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }

    /// Re-express in `unit` (truncating when `unit` is coarser).
    pub fn to_unit(self, unit: TimeUnit) -> Duration {
        Duration::new(convert_ticks(self.ticks, self.unit, unit), unit)
    }

    /// Length in nanoseconds, `None` if infinite.
    pub fn as_nanos(self) -> Option<u128> {
        (!self.is_infinite()).then(|| nanos_of(self.ticks, self.unit))
    }

    /// Length in seconds; `f64::INFINITY` if infinite.
    pub fn as_secs_f64(self) -> f64 {
        match self.as_nanos() {
            None        => f64::INFINITY,
            Some(nanos) => nanos as f64 / 1e9,
        }
    }

    /// Convert to a wall-clock `std::time::Duration`, `None` if infinite.
    pub fn to_std(self) -> Option<std::time::Duration> {
        let nanos = self.as_nanos()?;
        let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
        Some(std::time::Duration::new(secs, (nanos % 1_000_000_000) as u32))
    }

    /// `self - rhs`, or `None` when the result would be negative or when
    /// `rhs` is infinite.  `INFINITY - finite` is `INFINITY`.
    pub fn checked_sub(self, rhs: Duration) -> Option<Duration> {
        if rhs.is_infinite() {
            return None;
        }
        if self.is_infinite() {
            return Some(self);
        }
        let unit = self.unit.finer(rhs.unit);
        let a = convert_ticks(self.ticks, self.unit, unit);
        let b = convert_ticks(rhs.ticks, rhs.unit, unit);
        a.checked_sub(b).map(|t| Duration::new(t, unit))
    }

    /// Scale by a non-negative factor, rounding to the nearest tick.
    pub fn mul_f64(self, factor: f64) -> Duration {
        if self.is_infinite() {
            return self;
        }
        Duration::from_secs_f64(self.as_secs_f64() * factor, self.unit)
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::zero(TimeUnit::Seconds)
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        compare(self.ticks, self.unit, other.ticks, other.unit) == Ordering::Equal
    }
}

impl Eq for Duration {}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.ticks, self.unit, other.ticks, other.unit)
    }
}

impl Hash for Duration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_ticks(self.ticks, self.unit, state);
    }
}

impl Add for Duration {
    type Output = Duration;

    /// Infinity absorbs; overflow saturates to infinity.
    fn add(self, rhs: Duration) -> Duration {
        if self.is_infinite() || rhs.is_infinite() {
            return Duration::infinity(self.unit.finer(rhs.unit));
        }
        let unit = self.unit.finer(rhs.unit);
        let a = convert_ticks(self.ticks, self.unit, unit);
        let b = convert_ticks(rhs.ticks, rhs.unit, unit);
        match a.checked_add(b) {
            Some(t) if t < INFINITE => Duration::new(t, unit),
            _ => Duration::infinity(unit),
        }
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    /// # Panics
    /// Panics if `rhs > self` or `rhs` is infinite; use
    /// [`checked_sub`][Duration::checked_sub] where that can happen.
    fn sub(self, rhs: Duration) -> Duration {
        match self.checked_sub(rhs) {
            Some(d) => d,
            None => panic!("duration underflow: {self} - {rhs}"),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("inf")
        } else {
            write!(f, "{}{}", self.ticks, self.unit)
        }
    }
}

// ── Time ──────────────────────────────────────────────────────────────────────

/// An instant on the simulated clock, possibly infinite ("never").
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time {
    ticks: u64,
    unit:  TimeUnit,
}

impl Time {
    /// The instant that never arrives.
    pub const INFINITY: Time = Time { ticks: INFINITE, unit: TimeUnit::Seconds };

    #[inline]
    pub const fn new(ticks: u64, unit: TimeUnit) -> Self {
        Self { ticks, unit }
    }

    #[inline]
    pub const fn zero(unit: TimeUnit) -> Self {
        Self { ticks: 0, unit }
    }

    #[inline]
    pub const fn infinity(unit: TimeUnit) -> Self {
        Self { ticks: INFINITE, unit }
    }

    #[inline]
    pub const fn ticks(self) -> u64 {
        self.ticks
    }

    #[inline]
    pub const fn unit(self) -> TimeUnit {
        self.unit
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.ticks == INFINITE
    }

    pub fn to_unit(self, unit: TimeUnit) -> Time {
        Time::new(convert_ticks(self.ticks, self.unit, unit), unit)
    }

    /// Offset from time zero as a duration in the same unit.
    #[inline]
    pub const fn since_origin(self) -> Duration {
        Duration::new(self.ticks, self.unit)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.since_origin().as_secs_f64()
    }

    /// Span from `earlier` to `self`.
    ///
    /// Returns `None` if `earlier` is after `self` or if `earlier` is
    /// infinite.  `INFINITY - finite` is an infinite duration.
    pub fn checked_duration_since(self, earlier: Time) -> Option<Duration> {
        self.since_origin().checked_sub(earlier.since_origin())
    }
}

impl Default for Time {
    fn default() -> Self {
        Time::zero(TimeUnit::Seconds)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        compare(self.ticks, self.unit, other.ticks, other.unit) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.ticks, self.unit, other.ticks, other.unit)
    }
}

impl Hash for Time {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_ticks(self.ticks, self.unit, state);
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    /// Infinity absorbs; overflow saturates to infinity.
    fn add(self, rhs: Duration) -> Time {
        let d = self.since_origin() + rhs;
        Time::new(d.ticks(), d.unit())
    }
}

impl Sub for Time {
    type Output = Duration;

    /// # Panics
    /// Panics if `rhs` is after `self`; use
    /// [`checked_duration_since`][Time::checked_duration_since] where that can
    /// happen.
    fn sub(self, rhs: Time) -> Duration {
        match self.checked_duration_since(rhs) {
            Some(d) => d,
            None => panic!("time underflow: {self} - {rhs}"),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("t=inf")
        } else {
            write!(f, "t={}{}", self.ticks, self.unit)
        }
    }
}
