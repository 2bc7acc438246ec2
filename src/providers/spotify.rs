// ABOUTME: Spotify adapter: profile, top tracks, recently played, listening time
// ABOUTME: Normalizes the Web API track shapes and derives listening aggregates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::providers::core::{adapter_client, get_json, DataAdapter, FetchOptions};

const DEFAULT_BASE_URL: &str = "https://api.spotify.com/v1";

/// Top-tracks page size
const TOP_TRACKS_LIMIT: u32 = 20;
/// Recently-played page size (the API maximum)
const RECENTLY_PLAYED_LIMIT: u32 = 50;
/// The recently-played feed covers roughly the last week
const RECENT_WINDOW_DAYS: u64 = 7;

// -- Web API response shapes --------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    id: String,
    display_name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    items: Vec<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: AlbumObject,
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedResponse {
    #[serde(default)]
    items: Vec<PlayHistoryObject>,
}

#[derive(Debug, Deserialize)]
struct PlayHistoryObject {
    track: TrackObject,
    played_at: String,
}

// -- Normalized schema --------------------------------------------------------

/// Normalized Spotify profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProfile {
    /// Spotify user id
    pub id: String,
    /// Display name, empty when withheld
    pub display_name: String,
    /// Account email, empty when the scope was not granted
    pub email: String,
    /// Profile image URLs
    pub image_urls: Vec<String>,
}

/// Normalized track record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    /// Track id, empty for local files
    pub id: String,
    /// Track title
    pub name: String,
    /// Artist names
    pub artists: Vec<String>,
    /// Album title
    pub album: String,
    /// Track length in milliseconds
    pub duration_ms: u64,
    /// Play timestamp, present only for recently played entries
    pub played_at: Option<String>,
}

/// Derived listening-time aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningTime {
    /// Total duration of recently played tracks
    pub total_ms: u64,
    /// Total spread across the recently-played window
    pub average_per_day_ms: u64,
}

/// Normalized Spotify payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyData {
    /// User profile
    pub profile: SpotifyProfile,
    /// Medium-term top tracks
    pub top_tracks: Vec<SpotifyTrack>,
    /// Recently played tracks, newest first
    pub recently_played: Vec<SpotifyTrack>,
    /// Listening-time aggregate over the recently played feed
    pub listening_time: ListeningTime,
}

/// Spotify Web API adapter
pub struct SpotifyAdapter {
    client: Client,
    base_url: String,
}

impl SpotifyAdapter {
    /// Build the adapter against the production API.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the HTTP client cannot be constructed.
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            client: adapter_client()?,
            base_url: DEFAULT_BASE_URL.to_owned(),
        })
    }

    /// Point the adapter at a different base URL (test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_profile(&self, access_token: &str) -> AppResult<SpotifyProfile> {
        let response: ProfileResponse = get_json(
            &self.client,
            Provider::Spotify,
            "profile",
            &format!("{}/me", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(SpotifyProfile {
            id: response.id,
            display_name: response.display_name.unwrap_or_default(),
            email: response.email.unwrap_or_default(),
            image_urls: response.images.into_iter().map(|i| i.url).collect(),
        })
    }

    async fn get_top_tracks(&self, access_token: &str) -> AppResult<Vec<SpotifyTrack>> {
        let response: TopTracksResponse = get_json(
            &self.client,
            Provider::Spotify,
            "top-tracks",
            &format!("{}/me/top/tracks", self.base_url),
            access_token,
            &[
                ("limit", TOP_TRACKS_LIMIT.to_string()),
                ("time_range", "medium_term".to_owned()),
            ],
            &[],
        )
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|track| normalize_track(track, None))
            .collect())
    }

    async fn get_recently_played(&self, access_token: &str) -> AppResult<Vec<SpotifyTrack>> {
        let response: RecentlyPlayedResponse = get_json(
            &self.client,
            Provider::Spotify,
            "recently-played",
            &format!("{}/me/player/recently-played", self.base_url),
            access_token,
            &[("limit", RECENTLY_PLAYED_LIMIT.to_string())],
            &[],
        )
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|item| normalize_track(item.track, Some(item.played_at)))
            .collect())
    }
}

fn normalize_track(track: TrackObject, played_at: Option<String>) -> SpotifyTrack {
    SpotifyTrack {
        id: track.id.unwrap_or_default(),
        name: track.name,
        artists: track.artists.into_iter().map(|a| a.name).collect(),
        album: track.album.name,
        duration_ms: track.duration_ms,
        played_at,
    }
}

/// Sum recently played durations and spread them over the feed's window.
/// An empty feed yields zeros.
fn listening_time(recently_played: &[SpotifyTrack]) -> ListeningTime {
    let total_ms: u64 = recently_played.iter().map(|t| t.duration_ms).sum();
    ListeningTime {
        total_ms,
        average_per_day_ms: total_ms / RECENT_WINDOW_DAYS,
    }
}

#[async_trait]
impl DataAdapter for SpotifyAdapter {
    fn provider(&self) -> Provider {
        Provider::Spotify
    }

    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        _options: &FetchOptions,
    ) -> AppResult<Value> {
        let (profile, top_tracks, recently_played) = tokio::try_join!(
            self.get_profile(access_token),
            self.get_top_tracks(access_token),
            self.get_recently_played(access_token),
        )?;

        let listening_time = listening_time(&recently_played);
        let data = SpotifyData {
            profile,
            top_tracks,
            recently_played,
            listening_time,
        };

        serde_json::to_value(data)
            .map_err(|e| AppError::internal(format!("failed to serialize spotify payload: {e}")))
    }
}
