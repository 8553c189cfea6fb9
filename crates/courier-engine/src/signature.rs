// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature and freshness verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 and sends the
//! hex digest in `X-Signature` (optionally prefixed `sha256=`), plus the
//! send time in `X-Timestamp` as unix seconds or RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use courier_core::CourierError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook authenticity and freshness.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
    freshness_window_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .field("freshness_window_secs", &self.freshness_window_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, freshness_window_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            freshness_window_secs,
        }
    }

    /// Checks the signature first, then the timestamp.
    pub fn verify(
        &self,
        body: &[u8],
        signature_header: &str,
        timestamp_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        self.verify_signature(body, signature_header)?;
        self.verify_freshness(timestamp_header, now)
    }

    /// Constant-time comparison of the expected and presented digests.
    pub fn verify_signature(&self, body: &[u8], signature_header: &str) -> Result<(), CourierError> {
        let presented = signature_header.trim();
        let presented = presented.strip_prefix("sha256=").unwrap_or(presented);
        let presented = hex::decode(presented).map_err(|_| CourierError::InvalidSignature)?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CourierError::InvalidSignature)?;
        mac.update(body);
        mac.verify_slice(&presented)
            .map_err(|_| CourierError::InvalidSignature)
    }

    pub fn verify_freshness(
        &self,
        timestamp_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let sent_at = parse_timestamp_header(timestamp_header, self.freshness_window_secs)?;
        let skew_secs = (now - sent_at).num_seconds().abs();
        if skew_secs as u64 > self.freshness_window_secs {
            return Err(CourierError::StalePayload {
                skew_secs,
                window_secs: self.freshness_window_secs,
            });
        }
        Ok(())
    }

    /// Hex signature for `body`, as the provider would send it.
    pub fn sign(&self, body: &[u8]) -> String {
        match HmacSha256::new_from_slice(&self.secret) {
            Ok(mut mac) => {
                mac.update(body);
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }
}

/// Unix seconds or RFC 3339. Anything else fails freshness with an
/// unbounded skew.
fn parse_timestamp_header(raw: &str, window_secs: u64) -> Result<DateTime<Utc>, CourierError> {
    let raw = raw.trim();
    let unreadable = CourierError::StalePayload {
        skew_secs: i64::MAX,
        window_secs,
    };
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single().ok_or(unreadable);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| unreadable)
}
