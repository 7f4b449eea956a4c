//! Wall-clock source for the schedule executor.
//!
//! Time synchronisation (NTP) belongs to the host; this module only reads
//! the system clock at a fixed UTC offset and refuses to answer while the
//! clock is obviously unset.

use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::command::Timestamp;
use crate::error::ErrorKind;

/// Anything earlier than this means the RTC was never set.
const MIN_SYNCED_YEAR: i32 = 2016;

pub trait Clock {
    fn now(&self) -> Result<Timestamp, ErrorKind>;
}

pub struct LocalClock {
    offset: UtcOffset,
}

impl LocalClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn from_hours(hours: i8) -> Result<Self, ErrorKind> {
        let offset = UtcOffset::from_hms(hours, 0, 0).map_err(|_| ErrorKind::ClockUnavailable)?;
        Ok(Self::new(offset))
    }

    fn local(&self, utc: OffsetDateTime) -> Result<Timestamp, ErrorKind> {
        let local = utc.to_offset(self.offset);
        if local.year() < MIN_SYNCED_YEAR {
            return Err(ErrorKind::ClockUnavailable);
        }
        Timestamp::from_datetime(PrimitiveDateTime::new(local.date(), local.time()))
    }
}

impl Clock for LocalClock {
    fn now(&self) -> Result<Timestamp, ErrorKind> {
        self.local(OffsetDateTime::now_utc())
    }
}

/// Test clock pinned to a single instant, or permanently unsynchronised.
#[cfg(test)]
pub(crate) struct FixedClock(pub(crate) Option<Timestamp>);

#[cfg(test)]
impl FixedClock {
    pub(crate) fn at(s: &str) -> Self {
        Self(Some(Timestamp::parse(s).unwrap()))
    }

    pub(crate) fn unsynced() -> Self {
        Self(None)
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> Result<Timestamp, ErrorKind> {
        self.0.clone().ok_or(ErrorKind::ClockUnavailable)
    }
}
