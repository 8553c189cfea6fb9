// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Courier.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection via
//! `tokio-rusqlite`. Holds every piece of coordination state the engine relies
//! on: events, activities, opt-out flags, campaign cursors, retry claims,
//! leases and checkpoints.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use models::*;
