// ABOUTME: Structured logging initialization over tracing-subscriber
// ABOUTME: Env-filtered fmt output with optional JSON formatting for production
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use std::env;

use tracing_subscriber::EnvFilter;

use crate::errors::{AppError, AppResult};

/// Environment variable selecting the log format ("json" or "text")
const LOG_FORMAT_VAR: &str = "LINKVAULT_LOG_FORMAT";

/// Initialize structured logging. Filtering follows `RUST_LOG`, defaulting
/// to `info`; set `LINKVAULT_LOG_FORMAT=json` for machine-readable output.
///
/// # Errors
///
/// Returns an internal error if a global subscriber is already installed.
pub fn init() -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var(LOG_FORMAT_VAR).is_ok_and(|format| format == "json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| AppError::internal(format!("failed to initialize logging: {e}")))
}
