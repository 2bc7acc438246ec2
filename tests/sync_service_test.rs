// ABOUTME: End-to-end facade tests: callback upsert, cached reads, disconnect semantics
// ABOUTME: Covers the full refresh-then-sync scenario with audit ordering
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
use linkvault::sync::JobStatus;
use linkvault::utils::Clock;
use serde_json::json;
use uuid::Uuid;

use common::{
    harness_with, seed_service, tokens_with_refresh, wait_for_job, CountingAdapter, MockExchanger,
};

#[tokio::test]
async fn initiate_auth_embeds_a_fresh_state() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("a", None)),
    );

    let first = harness.service.initiate_auth(Provider::Spotify).unwrap();
    let second = harness.service.initiate_auth(Provider::Spotify).unwrap();

    assert!(first.authorization_url.contains(&first.state));
    assert_ne!(first.state, second.state);
}

#[tokio::test]
async fn callback_creates_a_service_with_encrypted_tokens() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("cb-access", Some("cb-refresh")))
            .with_user_info(json!({ "id": "spotify-user-9", "email": "u@example.com" })),
    );
    let user = Uuid::new_v4();

    let summary = harness
        .service
        .handle_callback(user, Provider::Spotify, "auth-code")
        .await
        .unwrap();

    assert_eq!(summary.provider, Provider::Spotify);
    assert_eq!(summary.provider_user_id, "spotify-user-9");
    assert!(summary.is_active);

    let row = harness
        .services
        .find_by_user_and_provider(user, Provider::Spotify)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harness.vault.decrypt(&row.access_token).unwrap(), "cb-access");
    assert_eq!(
        harness
            .vault
            .decrypt(row.refresh_token.as_ref().unwrap())
            .unwrap(),
        "cb-refresh"
    );
    // Access and refresh ciphertexts carry independent IVs.
    assert_ne!(row.access_token.iv, row.refresh_token.as_ref().unwrap().iv);
    assert_eq!(row.metadata["email"], json!("u@example.com"));

    let entries = harness.audit.list_for_user(user).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::ServiceConnected));
}

#[tokio::test]
async fn plaid_connects_through_the_public_token_exchange() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Plaid),
        MockExchanger::returning(tokens_with_refresh("unused", None)),
    );
    let user = Uuid::new_v4();

    assert!(matches!(
        harness
            .service
            .handle_callback(user, Provider::Plaid, "code")
            .await,
        Err(AppError::Configuration(_))
    ));

    let summary = harness
        .service
        .connect_plaid(user, "public-token")
        .await
        .unwrap();
    assert_eq!(summary.provider_user_id, "item-1");
    assert!(summary.token_expires_at.is_none());
}

#[tokio::test]
async fn cache_hit_never_calls_the_adapter() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("a", None)),
    );
    let user = Uuid::new_v4();
    let expiry = harness.clock.now() + ChronoDuration::hours(1);
    seed_service(&harness, user, Provider::Spotify, "tok", None, Some(expiry)).await;

    let fresh = harness
        .service
        .get_data(user, Provider::Spotify, 30)
        .await
        .unwrap();
    assert!(!fresh.cached);
    assert_eq!(harness.adapter.call_count(), 1);

    let cached = harness
        .service
        .get_data(user, Provider::Spotify, 30)
        .await
        .unwrap();
    assert!(cached.cached);
    assert_eq!(cached.data, fresh.data);
    assert_eq!(harness.adapter.call_count(), 1);

    // A different window is a different key.
    harness
        .service
        .get_data(user, Provider::Spotify, 7)
        .await
        .unwrap();
    assert_eq!(harness.adapter.call_count(), 2);
}

#[tokio::test]
async fn expired_token_sync_refreshes_rotates_and_audits_in_order() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Fitbit),
        MockExchanger::returning(tokens_with_refresh("rotated-access", Some("rotated-refresh"))),
    );
    let user = Uuid::new_v4();
    let past = harness.clock.now() - ChronoDuration::minutes(1);
    let seeded = seed_service(
        &harness,
        user,
        Provider::Fitbit,
        "expired-access",
        Some("old-refresh"),
        Some(past),
    )
    .await;

    let job_id = harness
        .service
        .trigger_sync(user, Provider::Fitbit)
        .await
        .unwrap();
    let status = wait_for_job(harness.service.scheduler(), job_id).await;
    assert_eq!(status, JobStatus::Completed);

    // Token material fully rotated.
    let row = harness
        .services
        .find_by_id(seeded.id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(row.access_token.ciphertext, seeded.access_token.ciphertext);
    assert_ne!(row.access_token.iv, seeded.access_token.iv);
    assert_ne!(row.access_token.auth_tag, seeded.access_token.auth_tag);
    assert_ne!(
        row.refresh_token.as_ref().unwrap().ciphertext,
        seeded.refresh_token.as_ref().unwrap().ciphertext
    );
    assert!(row.last_sync_at.is_some());

    // oauth_refresh precedes data_sync(success=true).
    let entries = harness.audit.list_for_user(user).await.unwrap();
    let refresh_pos = entries
        .iter()
        .position(|e| e.action == AuditAction::OauthRefresh)
        .unwrap();
    let sync_pos = entries
        .iter()
        .position(|e| e.action == AuditAction::DataSync && e.metadata["success"] == json!(true))
        .unwrap();
    assert!(refresh_pos < sync_pos);
}

#[tokio::test]
async fn adapter_500s_leave_cache_empty_and_audit_the_failures() {
    let harness = harness_with(
        CountingAdapter::always_failing(Provider::Google),
        MockExchanger::returning(tokens_with_refresh("a", Some("r"))),
    );
    let user = Uuid::new_v4();
    let expiry = harness.clock.now() + ChronoDuration::hours(1);
    seed_service(&harness, user, Provider::Google, "tok", Some("r"), Some(expiry)).await;

    let job_id = harness
        .service
        .trigger_sync(user, Provider::Google)
        .await
        .unwrap();
    let status = wait_for_job(harness.service.scheduler(), job_id).await;

    assert_eq!(status, JobStatus::Failed);
    assert!(harness.cache.is_empty());
    let entries = harness.audit.list_for_user(user).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::DataSync && e.metadata["success"] == json!(false)));
}

#[tokio::test]
async fn disconnect_soft_deletes_and_blocks_future_syncs() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Notion),
        MockExchanger::returning(tokens_with_refresh("a", None)),
    );
    let user = Uuid::new_v4();
    let seeded = seed_service(&harness, user, Provider::Notion, "tok", None, None).await;

    // Populate the cache, then disconnect.
    harness
        .service
        .get_data(user, Provider::Notion, 30)
        .await
        .unwrap();
    harness.service.disconnect(user, Provider::Notion).await.unwrap();

    // Row preserved, inactive; history still queryable; cache dropped.
    let row = harness
        .services
        .find_by_id(seeded.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!row.is_active);
    assert!(harness.cache.is_empty());
    let entries = harness.audit.list_for_user(user).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::ServiceDisconnected));

    // Interactive reads refuse.
    assert!(matches!(
        harness.service.get_data(user, Provider::Notion, 30).await,
        Err(AppError::Auth(_))
    ));

    // A job aimed at the dormant row fails terminally and records it.
    let job_id =
        harness
            .service
            .scheduler()
            .schedule_sync(user, Provider::Notion, seeded.id);
    let status = wait_for_job(harness.service.scheduler(), job_id).await;
    assert_eq!(status, JobStatus::Failed);
    let entries = harness.audit.list_for_user(user).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.action == AuditAction::DataSync && e.metadata["success"] == json!(false)));

    // Summaries only list active services.
    assert!(harness
        .service
        .connected_services(user)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn trigger_all_schedules_every_active_service() {
    let harness = harness_with(
        CountingAdapter::succeeding(Provider::Spotify),
        MockExchanger::returning(tokens_with_refresh("a", None)),
    );
    let user = Uuid::new_v4();
    let expiry = harness.clock.now() + ChronoDuration::hours(1);
    seed_service(&harness, user, Provider::Spotify, "t1", None, Some(expiry)).await;
    let notion = seed_service(&harness, user, Provider::Notion, "t2", None, None).await;
    harness.services.mark_inactive(notion.id).await.unwrap();

    let scheduled = harness.service.trigger_all_sync(user).await.unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, Provider::Spotify);
}
