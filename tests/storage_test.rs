// ABOUTME: Tests for the in-memory storage backends: upsert uniqueness and CAS updates
// ABOUTME: Verifies conflict detection on concurrent token writes and soft-delete behavior
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::Utc;
use linkvault::errors::AppError;
use linkvault::models::{EncryptedSecret, Provider};
use linkvault::storage::{
    InMemoryServiceStore, NewConnectedService, ServiceStore, TokenUpdate,
};
use serde_json::json;
use uuid::Uuid;

fn secret(tag: &str) -> EncryptedSecret {
    EncryptedSecret {
        ciphertext: format!("ct-{tag}"),
        iv: format!("iv-{tag}"),
        auth_tag: format!("at-{tag}"),
    }
}

fn new_service(user_id: Uuid, provider: Provider) -> NewConnectedService {
    NewConnectedService {
        user_id,
        provider,
        provider_user_id: "puid".to_owned(),
        access_token: secret("a"),
        refresh_token: Some(secret("r")),
        token_expires_at: Some(Utc::now()),
        scope: Some("scope".to_owned()),
        metadata: json!({}),
    }
}

#[tokio::test]
async fn upsert_is_unique_per_user_and_provider() {
    let store = InMemoryServiceStore::new();
    let user = Uuid::new_v4();

    let first = store.upsert(new_service(user, Provider::Spotify)).await.unwrap();
    let second = store.upsert(new_service(user, Provider::Spotify)).await.unwrap();
    assert_eq!(first.id, second.id);

    let other_provider = store.upsert(new_service(user, Provider::Fitbit)).await.unwrap();
    assert_ne!(first.id, other_provider.id);

    let other_user = store
        .upsert(new_service(Uuid::new_v4(), Provider::Spotify))
        .await
        .unwrap();
    assert_ne!(first.id, other_user.id);
}

#[tokio::test]
async fn stale_cas_token_is_a_conflict() {
    let store = InMemoryServiceStore::new();
    let user = Uuid::new_v4();
    let row = store.upsert(new_service(user, Provider::Spotify)).await.unwrap();

    let update = TokenUpdate {
        access_token: secret("a2"),
        refresh_token: Some(secret("r2")),
        token_expires_at: None,
    };

    // First writer wins.
    let winner = store
        .update_tokens(row.id, row.updated_at, &update)
        .await
        .unwrap();
    assert_eq!(winner.access_token, secret("a2"));

    // Second writer carrying the old updated_at loses.
    let loser = store.update_tokens(row.id, row.updated_at, &update).await;
    assert!(matches!(loser, Err(AppError::Conflict(_))));

    // And the stored tokens still reflect the winner.
    let current = store.find_by_id(row.id).await.unwrap().unwrap();
    assert_eq!(current.access_token, secret("a2"));
}

#[tokio::test]
async fn mark_inactive_preserves_the_row() {
    let store = InMemoryServiceStore::new();
    let user = Uuid::new_v4();
    let row = store.upsert(new_service(user, Provider::Notion)).await.unwrap();

    store.mark_inactive(row.id).await.unwrap();

    let stored = store.find_by_id(row.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
    assert!(store.list_active_for_user(user).await.unwrap().is_empty());
    assert!(store
        .find_by_user_and_provider(user, Provider::Notion)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unknown_rows_surface_store_errors() {
    let store = InMemoryServiceStore::new();
    assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    assert!(matches!(
        store.mark_inactive(Uuid::new_v4()).await,
        Err(AppError::Store(_))
    ));
    assert!(matches!(
        store.touch_last_sync(Uuid::new_v4(), Utc::now()).await,
        Err(AppError::Store(_))
    ));
}
