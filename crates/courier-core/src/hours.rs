// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-hours windows evaluated in a campaign's local timezone.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CourierError;

/// Local sending window for a campaign.
///
/// `start == end` means the window is open all day on the listed weekdays.
/// `start > end` wraps past midnight (e.g. 20:00–02:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// IANA timezone name, e.g. `America/Chicago`.
    pub timezone: String,
    /// Local opening time.
    pub start: NaiveTime,
    /// Local closing time, exclusive.
    pub end: NaiveTime,
    /// Local days the window opens on.
    pub weekdays: Vec<Weekday>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl BusinessHours {
    /// A window that is open at every instant.
    pub fn always(timezone: &str) -> Self {
        Self {
            timezone: timezone.to_string(),
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }

    /// Resolve the configured timezone.
    pub fn tz(&self) -> Result<Tz, CourierError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| CourierError::Config(format!("unknown timezone `{}`", self.timezone)))
    }

    /// Whether sending is allowed at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> Result<bool, CourierError> {
        let local = now.with_timezone(&self.tz()?);
        if !self.weekdays.contains(&local.weekday()) {
            return Ok(false);
        }
        let t = local.time();
        let open = if self.start == self.end {
            true
        } else if self.start < self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        };
        Ok(open)
    }

    /// Start of the local calendar day containing `now`, as UTC.
    ///
    /// Daily caps reset at this instant.
    pub fn day_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CourierError> {
        let tz = self.tz()?;
        let date = now.with_timezone(&tz).date_naive();
        // Midnight can fall inside a DST gap; the first valid hour is the day start then.
        (0..3)
            .filter_map(|h| date.and_hms_opt(h, 0, 0))
            .find_map(|naive| tz.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CourierError::Internal(format!("no valid local midnight on {date}")))
    }
}
