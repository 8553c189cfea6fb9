// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock abstraction and the canonical timestamp text format.
//!
//! Every timestamp persisted by Courier is RFC 3339 UTC with millisecond
//! precision and a `Z` suffix, so lexical order in SQL equals time order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::CourierError;

/// Source of the current time. Engine components never call `Utc::now()`
/// directly so that caps, windows and backoff can be tested deterministically.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Format a timestamp in the canonical storage format.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_ts`] (or any RFC 3339 string).
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>, CourierError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CourierError::MalformedPayload(format!("invalid timestamp `{raw}`: {e}")))
}
