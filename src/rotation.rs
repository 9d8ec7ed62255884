//! When to rotate: the size trigger and the local-midnight trigger.

use time::{OffsetDateTime, UtcOffset};

/// Source of wall-clock time used for timestamps, segment dates and the
/// midnight timer.
pub trait Clock: Send + Sync {
    /// Current time in the offset segment dates are computed in.
    fn now(&self) -> OffsetDateTime;
}

/// [`Clock`] reading the system time in the local offset.
///
/// The local offset is resolved once; if the platform cannot determine it,
/// UTC is used. On Unix this is the common case in a process that already
/// runs several threads, so prefer [`SystemClock::with_offset`] there.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        let offset = UtcOffset::current_local_offset().unwrap_or_else(|_| {
            tracing::debug!("local UTC offset unavailable, using UTC");
            UtcOffset::UTC
        });
        Self { offset }
    }

    /// A clock fixed to `offset` instead of the local one.
    pub fn with_offset(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// First midnight strictly after `now`, in `now`'s offset.
pub fn next_midnight(now: OffsetDateTime) -> OffsetDateTime {
    let date = now.date();
    match date.next_day() {
        Some(tomorrow) => tomorrow.midnight().assume_offset(now.offset()),
        // End of the representable calendar; never fires in practice.
        None => date.midnight().assume_offset(now.offset()) + time::Duration::days(1),
    }
}

/// Why a rotation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The next write would push the segment past its size limit.
    Size,
    /// The calendar day changed.
    Midnight,
    /// Requested through [`crate::Logger::rotate`].
    Manual,
}

impl RotationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Midnight => "midnight",
            Self::Manual => "manual",
        }
    }
}

/// Rotation state machine: the size limit plus the next midnight deadline.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    max_size_bytes: u64,
    deadline: OffsetDateTime,
}

impl RotationPolicy {
    /// Create a policy whose timer is armed for the midnight after `now`.
    pub fn new(max_size_bytes: u64, now: OffsetDateTime) -> Self {
        Self {
            max_size_bytes,
            deadline: next_midnight(now),
        }
    }

    /// Size trigger, evaluated before a write of `pending` bytes.
    ///
    /// An empty segment never rotates, so a single event larger than the
    /// limit lands alone in a fresh segment.
    pub fn exceeds_size(&self, current_size: u64, pending: u64) -> bool {
        current_size > 0 && current_size.saturating_add(pending) > self.max_size_bytes
    }

    /// Instant the midnight timer fires at.
    pub fn deadline(&self) -> OffsetDateTime {
        self.deadline
    }

    /// Time left until the deadline, zero if it already passed.
    pub fn until_deadline(&self, now: OffsetDateTime) -> std::time::Duration {
        std::time::Duration::try_from(self.deadline - now).unwrap_or(std::time::Duration::ZERO)
    }

    /// Handle the timer firing at `now`.
    ///
    /// Returns the instant the rotation is attributed to (never before the
    /// deadline, so an early wake-up cannot reuse the old date) and re-arms the
    /// timer for the following midnight. Returns `None` without re-arming when
    /// `now` is too early to be a real wake-up.
    pub fn on_timer(&mut self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        if self.deadline - now > TIMER_SLACK {
            return None;
        }
        let at = now.max(self.deadline);
        self.deadline = next_midnight(at);
        Some(at)
    }
}

/// How early a timer wake-up may be and still count as the deadline.
const TIMER_SLACK: time::Duration = time::Duration::milliseconds(50);
