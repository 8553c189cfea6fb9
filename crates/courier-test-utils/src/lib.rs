// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - scripted messaging provider that records every send
//! - [`ManualClock`] - clock that only moves when told to
//! - [`RecordingAlertSink`] - alert sink that keeps every alert
//! - [`TestHarness`] - the full service graph on a temp SQLite database

pub mod clock;
pub mod harness;
pub mod mock_alerts;
pub mod mock_provider;

pub use clock::ManualClock;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_alerts::RecordingAlertSink;
pub use mock_provider::{MockProvider, ScriptedSend};
