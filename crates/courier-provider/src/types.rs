// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types specific to the provider REST API.

use serde::Deserialize;

/// Error envelope returned by the provider on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl ApiErrorResponse {
    /// Human-readable summary, `code: message` when a code is present.
    pub fn summary(&self) -> String {
        match &self.error.code {
            Some(code) => format!("{code}: {}", self.error.message),
            None => self.error.message.clone(),
        }
    }
}
