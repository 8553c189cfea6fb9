// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs on the
//! single writer connection.

pub mod activities;
pub mod campaigns;
pub mod checkpoints;
pub mod compliance;
pub mod events;
pub mod health;
pub mod leases;
pub mod members;
pub mod retry;
pub mod status;
