// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier messaging engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Courier workspace. Storage, provider and
//! alerting adapters implement traits defined here.

pub mod clock;
pub mod error;
pub mod hours;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{format_ts, parse_ts, Clock, SystemClock};
pub use error::{CourierError, ErrorClass};
pub use hours::BusinessHours;
pub use types::{AdapterType, HealthStatus};

// Re-export all adapter traits at crate root.
pub use traits::{AlertSink, MessagingProvider, PluginAdapter, StorageAdapter};
