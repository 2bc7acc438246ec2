// ABOUTME: Small shared utilities: injectable clock and CSRF state generation
// ABOUTME: Clock trait decouples expiry checks and retention windows from wall time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use chrono::{DateTime, Utc};
use rand::RngCore;

/// Source of the current time. Injected wherever staleness or retention is
/// decided so tests can pin the clock.
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generate an opaque CSRF state token: 32 random bytes, hex encoded.
///
/// The caller (route layer) is responsible for binding the token to a user
/// identity in an expiring store and verifying it at callback time.
#[must_use]
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
