// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of Courier.
//!
//! - `POST /webhooks/provider`: signed provider callbacks
//! - `/v1/*`: bearer-protected administrative triggers
//! - `GET /health`, `GET /metrics`: unauthenticated checks

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{auth_middleware, AuthConfig};
pub use server::{router, start_server, GatewayState, HealthState, ServerConfig};
