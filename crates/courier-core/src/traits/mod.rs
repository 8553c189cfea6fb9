// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Components depend on these traits rather than concrete adapters; the
//! binary wires concrete implementations at process start.

pub mod adapter;
pub mod alert;
pub mod provider;
pub mod storage;

pub use adapter::PluginAdapter;
pub use alert::AlertSink;
pub use provider::MessagingProvider;
pub use storage::StorageAdapter;
