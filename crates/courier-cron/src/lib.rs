// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic task scheduling for Courier.
//!
//! Every engine component that runs on a cadence (dispatch ticks, the retry
//! drain, reconciliation, health checks, archival) is wrapped in a
//! [`ScheduledJob`] and driven by the [`Scheduler`]. Each firing takes the
//! store lease `task:{name}` first, so a slow run never overlaps its next
//! firing, in this process or any other.

pub mod jobs;
pub mod scheduler;

pub use jobs::{ArchiveJob, DispatchJob, HealthCheckJob, ReconcileJob, RetryDrainJob};
pub use scheduler::{task_lease, ScheduledJob, Scheduler, TaskRun};
