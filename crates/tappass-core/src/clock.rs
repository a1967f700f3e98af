//! Time sources and the facility timezone.
//!
//! Policy windows are expressed in facility-local hours. The facility's
//! timezone is a fixed UTC offset chosen once per deployment; it does not
//! follow the operator device's locale and does not observe DST.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};

use crate::{Error, Result};

/// Source of "now" for the scan controller.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}

/// Converts UTC instants to the facility's local hour-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacilityClock {
  offset: FixedOffset,
}

impl FacilityClock {
  /// A facility whose local time is UTC.
  pub fn utc() -> Self {
    Self { offset: Utc.fix() }
  }

  /// A facility `minutes` east of UTC (negative for west).
  pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
    let offset = minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .ok_or(Error::InvalidOffset(minutes))?;
    Ok(Self { offset })
  }

  pub fn offset(&self) -> FixedOffset { self.offset }

  /// The facility-local hour (0..=23) at `instant`.
  pub fn local_hour(&self, instant: DateTime<Utc>) -> u32 {
    instant.with_timezone(&self.offset).hour()
  }
}

impl Default for FacilityClock {
  fn default() -> Self { Self::utc() }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn local_hour_applies_offset() {
    let noon_utc = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(FacilityClock::utc().local_hour(noon_utc), 12);
    assert_eq!(FacilityClock::from_offset_minutes(-300).unwrap().local_hour(noon_utc), 7);
    assert_eq!(FacilityClock::from_offset_minutes(330).unwrap().local_hour(noon_utc), 17);
  }

  #[test]
  fn out_of_range_offset_is_rejected() {
    assert!(matches!(
      FacilityClock::from_offset_minutes(24 * 60),
      Err(Error::InvalidOffset(1440))
    ));
  }
}
