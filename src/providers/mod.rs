// ABOUTME: Provider adapter system: one uniform contract over five provider APIs
// ABOUTME: Re-exports the DataAdapter trait, registry, and concrete adapters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # Provider Adapters
//!
//! Each adapter fetches a user's data from one provider and maps it into a
//! stable normalized schema (profile, primary records, derived aggregates)
//! behind the single [`core::DataAdapter`] capability trait. Adapters are
//! selected through [`core::AdapterRegistry`] keyed by provider id; there is
//! no provider switch statement anywhere else in the crate.
//!
//! Independent sub-fetches within one adapter run concurrently. Derived
//! statistics are computed with explicit numeric rules: an empty collection
//! always yields zero, never NaN.

/// Trait, registry, and shared HTTP plumbing
pub mod core;
/// Fitness tracking: activity, heart rate, sleep
pub mod fitbit;
/// Calendar: events and meeting-load summary
pub mod google_calendar;
/// Workspace: pages, databases, edit recency
pub mod notion;
/// Banking: accounts, transactions, spending summary
pub mod plaid;
/// Music: top tracks, listening history
pub mod spotify;

pub use core::{AdapterRegistry, DataAdapter, FetchOptions};
pub use fitbit::FitbitAdapter;
pub use google_calendar::GoogleCalendarAdapter;
pub use notion::NotionAdapter;
pub use plaid::PlaidAdapter;
pub use spotify::SpotifyAdapter;
