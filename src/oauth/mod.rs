// ABOUTME: OAuth module: authorization flow control and token refresh management
// ABOUTME: Re-exports the flow controller, exchanger trait, and refresh manager
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

//! # OAuth Credential Lifecycle
//!
//! Two layers: [`flow::AuthorizationFlowController`] speaks the wire
//! protocol (authorization URLs, code exchange, refresh grants, user info,
//! the Plaid public-token exchange), and [`refresh::TokenRefreshManager`]
//! decides when a stored token is stale and persists the refreshed,
//! re-encrypted result. The [`flow::TokenExchanger`] trait is the seam
//! between them so refresh logic is testable without a network.

/// Wire-level OAuth operations
pub mod flow;
/// Staleness detection and transparent refresh
pub mod refresh;

pub use flow::{AuthorizationFlowController, TokenExchanger};
pub use refresh::{TokenRefreshManager, ValidToken};
