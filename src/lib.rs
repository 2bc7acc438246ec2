// ABOUTME: Library entry point for the linkvault credential and sync engine
// ABOUTME: Aggregates connected-account data behind encrypted, self-refreshing credentials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

#![deny(unsafe_code)]

//! # Linkvault
//!
//! Credential lifecycle manager and background synchronization engine for a
//! personal-data aggregation platform. Users connect third-party accounts
//! (music, fitness, calendar, banking, workspace) via OAuth; this crate
//! stores their tokens under authenticated encryption, refreshes them
//! before use, drives five provider adapters through one contract, and
//! keeps a TTL-bounded cache of normalized data fresh through a retrying
//! job queue — with an append-only audit trail of every credential and
//! sync event.
//!
//! ## Architecture
//!
//! - **vault**: AES-256-GCM encryption of token material, fresh IV per call
//! - **config**: immutable per-provider OAuth registry, validated at boot
//! - **oauth**: authorization flow control and transparent token refresh
//! - **providers**: five adapters behind the `DataAdapter` capability trait
//! - **sync**: job queue with exponential backoff, recurring schedules,
//!   per-job deadlines, and per-(user, provider) locking
//! - **cache** / **audit** / **storage**: the collaborator contracts
//! - **service**: the facade the HTTP route layer consumes
//!
//! ## Example
//!
//! ```rust,no_run
//! use linkvault::service::SyncService;
//!
//! # fn main() -> linkvault::errors::AppResult<()> {
//! linkvault::logging::init()?;
//! let service = SyncService::from_env()?;
//! let auth = service.initiate_auth(linkvault::models::Provider::Spotify)?;
//! println!("redirect the user to {}", auth.authorization_url);
//! # Ok(())
//! # }
//! ```

/// Best-effort audit trail for lifecycle events
pub mod audit;

/// TTL-bounded read-through cache for normalized payloads
pub mod cache;

/// Immutable per-provider OAuth configuration
pub mod config;

/// Unified error taxonomy and retryability classification
pub mod errors;

/// Structured logging initialization
pub mod logging;

/// Core data models: providers, connected services, token material
pub mod models;

/// OAuth flow control and token refresh management
pub mod oauth;

/// Provider adapters behind one capability trait
pub mod providers;

/// The facade consumed by the route layer
pub mod service;

/// Row-store and audit-store collaborator contracts
pub mod storage;

/// Job queue, worker pool, and scheduling
pub mod sync;

/// Injectable clock and CSRF state generation
pub mod utils;

/// Authenticated encryption for token secrets
pub mod vault;
