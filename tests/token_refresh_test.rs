// ABOUTME: Tests for the token refresh manager: staleness gate, rotation, persistence
// ABOUTME: Verifies refresh happens iff expired, and old refresh tokens are retained
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::Duration as ChronoDuration;
use linkvault::errors::AppError;
use linkvault::models::{AuditAction, Provider};
use linkvault::storage::{AuditStore as _, ServiceStore as _};
use linkvault::utils::Clock;
use uuid::Uuid;

use common::{harness_with, seed_service, tokens_with_refresh, CountingAdapter, MockExchanger};

#[tokio::test]
async fn valid_token_is_returned_without_refreshing() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("new-access", Some("new-refresh"))),
    );
    let user = Uuid::new_v4();
    let future = harness.clock.now() + ChronoDuration::hours(1);
    seed_service(
        &harness,
        user,
        Provider::Spotify,
        "stored-access",
        Some("stored-refresh"),
        Some(future),
    )
    .await;

    let token = harness
        .service
        .get_valid_access_token(user, Provider::Spotify)
        .await
        .unwrap();

    assert_eq!(token, "stored-access");
    assert_eq!(harness.exchanger.refreshes(), 0);
}

#[tokio::test]
async fn token_without_expiry_never_refreshes() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Plaid),
        MockExchanger::returning(tokens_with_refresh("new-access", None)),
    );
    let user = Uuid::new_v4();
    seed_service(&harness, user, Provider::Plaid, "plaid-access", None, None).await;

    let token = harness
        .service
        .get_valid_access_token(user, Provider::Plaid)
        .await
        .unwrap();

    assert_eq!(token, "plaid-access");
    assert_eq!(harness.exchanger.refreshes(), 0);
}

#[tokio::test]
async fn expired_token_with_refresh_is_rotated_and_persisted() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("new-access", Some("new-refresh"))),
    );
    let user = Uuid::new_v4();
    let past = harness.clock.now() - ChronoDuration::minutes(5);
    let seeded = seed_service(
        &harness,
        user,
        Provider::Spotify,
        "stale-access",
        Some("old-refresh"),
        Some(past),
    )
    .await;

    let token = harness
        .service
        .get_valid_access_token(user, Provider::Spotify)
        .await
        .unwrap();

    assert_eq!(token, "new-access");
    assert_eq!(harness.exchanger.refreshes(), 1);

    // The row's ciphertext, IV, and tag were all rewritten for both tokens.
    let row = harness
        .services
        .find_by_id(seeded.id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(row.access_token, seeded.access_token);
    assert_ne!(row.access_token.iv, seeded.access_token.iv);
    assert_ne!(row.access_token.auth_tag, seeded.access_token.auth_tag);
    assert_ne!(row.refresh_token, seeded.refresh_token);
    assert!(row.token_expires_at.unwrap() > harness.clock.now());

    assert_eq!(harness.vault.decrypt(&row.access_token).unwrap(), "new-access");
    assert_eq!(
        harness
            .vault
            .decrypt(row.refresh_token.as_ref().unwrap())
            .unwrap(),
        "new-refresh"
    );

    // The two ciphertexts never share an IV.
    assert_ne!(row.access_token.iv, row.refresh_token.as_ref().unwrap().iv);

    let entries = harness.audit.list_for_user(user).await.unwrap();
    assert!(entries
        .iter()
        .any(|entry| entry.action == AuditAction::OauthRefresh));
}

#[tokio::test]
async fn provider_that_omits_refresh_token_keeps_the_old_one() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Google),
        MockExchanger::returning(tokens_with_refresh("new-access", None)),
    );
    let user = Uuid::new_v4();
    let past = harness.clock.now() - ChronoDuration::minutes(5);
    let seeded = seed_service(
        &harness,
        user,
        Provider::Google,
        "stale-access",
        Some("old-refresh"),
        Some(past),
    )
    .await;

    harness
        .service
        .get_valid_access_token(user, Provider::Google)
        .await
        .unwrap();

    let row = harness
        .services
        .find_by_id(seeded.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        harness
            .vault
            .decrypt(row.refresh_token.as_ref().unwrap())
            .unwrap(),
        "old-refresh"
    );
}

#[tokio::test]
async fn expired_token_without_refresh_is_an_auth_error() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("new-access", None)),
    );
    let user = Uuid::new_v4();
    let past = harness.clock.now() - ChronoDuration::minutes(5);
    seed_service(&harness, user, Provider::Spotify, "stale", None, Some(past)).await;

    let result = harness
        .service
        .get_valid_access_token(user, Provider::Spotify)
        .await;

    assert!(matches!(result, Err(AppError::Auth(_))));
    assert_eq!(harness.exchanger.refreshes(), 0);
}

#[tokio::test]
async fn clock_advance_flips_the_staleness_decision() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Fitbit),
        MockExchanger::returning(tokens_with_refresh("new-access", Some("r2"))),
    );
    let user = Uuid::new_v4();
    let expiry = harness.clock.now() + ChronoDuration::minutes(10);
    seed_service(
        &harness,
        user,
        Provider::Fitbit,
        "short-lived",
        Some("r1"),
        Some(expiry),
    )
    .await;

    harness
        .service
        .get_valid_access_token(user, Provider::Fitbit)
        .await
        .unwrap();
    assert_eq!(harness.exchanger.refreshes(), 0);

    harness.clock.advance(ChronoDuration::minutes(11));
    let token = harness
        .service
        .get_valid_access_token(user, Provider::Fitbit)
        .await
        .unwrap();
    assert_eq!(token, "new-access");
    assert_eq!(harness.exchanger.refreshes(), 1);
}

#[tokio::test]
async fn reconnect_reactivates_the_disconnected_row() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Notion),
        MockExchanger::returning(tokens_with_refresh("a", None)),
    );
    let user = Uuid::new_v4();
    let seeded = seed_service(&harness, user, Provider::Notion, "t", None, None).await;

    harness.services.mark_inactive(seeded.id).await.unwrap();
    let reconnected = seed_service(&harness, user, Provider::Notion, "t2", None, None).await;

    assert_eq!(reconnected.id, seeded.id);
    assert!(reconnected.is_active);
}
