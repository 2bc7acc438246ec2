// ABOUTME: Fitbit adapter: profile, daily activity, heart rate, sleep, averages
// ABOUTME: Zips the ranged time-series responses by index and derives daily averages
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::providers::core::{adapter_client, get_json, round1, DataAdapter, FetchOptions};

const DEFAULT_BASE_URL: &str = "https://api.fitbit.com/1";

// -- Fitbit API response shapes ----------------------------------------------

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: ProfileUser,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    #[serde(rename = "encodedId")]
    encoded_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(default)]
    age: u32,
    #[serde(default)]
    height: f64,
    #[serde(default)]
    weight: f64,
    #[serde(default)]
    timezone: String,
}

#[derive(Debug, Deserialize)]
struct ActivitiesResponse {
    #[serde(rename = "activities-steps", default)]
    steps: Vec<SeriesPoint>,
    #[serde(rename = "activities-distance", default)]
    distance: Vec<SeriesPoint>,
    #[serde(rename = "activities-calories", default)]
    calories: Vec<SeriesPoint>,
    #[serde(rename = "activities-minutesFairlyActive", default)]
    fairly_active: Vec<SeriesPoint>,
}

#[derive(Debug, Deserialize)]
struct SeriesPoint {
    #[serde(rename = "dateTime")]
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct HeartResponse {
    #[serde(rename = "activities-heart", default)]
    days: Vec<HeartDay>,
}

#[derive(Debug, Deserialize)]
struct HeartDay {
    #[serde(rename = "dateTime")]
    date: String,
    value: Option<HeartValue>,
}

#[derive(Debug, Deserialize)]
struct HeartValue {
    #[serde(rename = "restingHeartRate")]
    resting_heart_rate: Option<u32>,
    #[serde(rename = "heartRateZones", default)]
    heart_rate_zones: Vec<HeartZoneObject>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct HeartZoneObject {
    name: String,
    #[serde(default)]
    minutes: u64,
    #[serde(rename = "caloriesOut", default)]
    calories_out: f64,
}

#[derive(Debug, Deserialize)]
struct SleepResponse {
    #[serde(default)]
    sleep: Vec<SleepEntry>,
}

#[derive(Debug, Deserialize)]
struct SleepEntry {
    #[serde(rename = "dateOfSleep")]
    date_of_sleep: String,
    duration: u64,
    efficiency: u32,
    #[serde(rename = "minutesAsleep")]
    minutes_asleep: u64,
    #[serde(rename = "minutesAwake")]
    minutes_awake: u64,
}

// -- Normalized schema --------------------------------------------------------

/// Normalized Fitbit profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitbitProfile {
    /// Fitbit encoded user id
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Age in years
    pub age: u32,
    /// Height in the account's unit system
    pub height: f64,
    /// Weight in the account's unit system
    pub weight: f64,
    /// Account timezone
    pub timezone: String,
}

/// One day of activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyActivity {
    /// Day, `YYYY-MM-DD`
    pub date: String,
    /// Step count
    pub steps: u64,
    /// Distance covered
    pub distance: f64,
    /// Calories burned
    pub calories: u64,
    /// Fairly-active minutes
    pub active_minutes: u64,
}

/// One day of heart-rate data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateDay {
    /// Day, `YYYY-MM-DD`
    pub date: String,
    /// Resting heart rate, 0 when not measured
    pub resting_heart_rate: u32,
    /// Time spent per heart-rate zone
    pub zones: Vec<HeartRateZone>,
}

/// Time spent in one heart-rate zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateZone {
    /// Zone name (e.g. "Fat Burn")
    pub name: String,
    /// Minutes in the zone
    pub minutes: u64,
    /// Calories burned in the zone
    pub calories_out: f64,
}

/// One sleep log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepLog {
    /// Day, `YYYY-MM-DD`
    pub date: String,
    /// Total time in bed, milliseconds
    pub duration_ms: u64,
    /// Sleep efficiency percentage
    pub efficiency: u32,
    /// Minutes asleep
    pub minutes_asleep: u64,
    /// Minutes awake
    pub minutes_awake: u64,
}

/// Derived daily averages over the fetched window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitbitAverages {
    /// Average daily steps, rounded
    pub steps: u64,
    /// Average daily calories, rounded
    pub calories: u64,
    /// Average nightly sleep in hours, one decimal
    pub sleep_hours: f64,
}

/// Normalized Fitbit payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitbitData {
    /// User profile
    pub profile: FitbitProfile,
    /// Daily activity summaries
    pub activities: Vec<DailyActivity>,
    /// Daily heart-rate data
    pub heart_rate: Vec<HeartRateDay>,
    /// Sleep logs
    pub sleep: Vec<SleepLog>,
    /// Daily averages
    pub averages: FitbitAverages,
}

/// Fitbit API adapter
pub struct FitbitAdapter {
    client: Client,
    base_url: String,
}

impl FitbitAdapter {
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

    async fn get_profile(&self, access_token: &str) -> AppResult<FitbitProfile> {
        let response: ProfileResponse = get_json(
            &self.client,
            Provider::Fitbit,
            "profile",
            &format!("{}/user/-/profile.json", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(FitbitProfile {
            id: response.user.encoded_id,
            display_name: response.user.display_name,
            age: response.user.age,
            height: response.user.height,
            weight: response.user.weight,
            timezone: response.user.timezone,
        })
    }

    async fn get_activities(
        &self,
        access_token: &str,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<DailyActivity>> {
        let response: ActivitiesResponse = get_json(
            &self.client,
            Provider::Fitbit,
            "activities",
            &format!("{}/user/-/activities/date/{start}/{end}.json", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(zip_activity_series(&response))
    }

    async fn get_heart_rate(
        &self,
        access_token: &str,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<HeartRateDay>> {
        let response: HeartResponse = get_json(
            &self.client,
            Provider::Fitbit,
            "heart-rate",
            &format!(
                "{}/user/-/activities/heart/date/{start}/{end}.json",
                self.base_url
            ),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(response
            .days
            .into_iter()
            .map(|day| {
                let value = day.value.unwrap_or(HeartValue {
                    resting_heart_rate: None,
                    heart_rate_zones: Vec::new(),
                });
                HeartRateDay {
                    date: day.date,
                    resting_heart_rate: value.resting_heart_rate.unwrap_or(0),
                    zones: value
                        .heart_rate_zones
                        .into_iter()
                        .map(|zone| HeartRateZone {
                            name: zone.name,
                            minutes: zone.minutes,
                            calories_out: zone.calories_out,
                        })
                        .collect(),
                }
            })
            .collect())
    }

    async fn get_sleep(
        &self,
        access_token: &str,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<SleepLog>> {
        let response: SleepResponse = get_json(
            &self.client,
            Provider::Fitbit,
            "sleep",
            &format!("{}/user/-/sleep/date/{start}/{end}.json", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(response
            .sleep
            .into_iter()
            .map(|entry| SleepLog {
                date: entry.date_of_sleep,
                duration_ms: entry.duration,
                efficiency: entry.efficiency,
                minutes_asleep: entry.minutes_asleep,
                minutes_awake: entry.minutes_awake,
            })
            .collect())
    }
}

/// The ranged activities endpoint returns parallel series keyed by resource;
/// the steps series drives the day list and the others are joined by index.
fn zip_activity_series(response: &ActivitiesResponse) -> Vec<DailyActivity> {
    response
        .steps
        .iter()
        .enumerate()
        .map(|(i, point)| DailyActivity {
            date: point.date.clone(),
            steps: point.value.parse().unwrap_or(0),
            distance: response
                .distance
                .get(i)
                .and_then(|p| p.value.parse().ok())
                .unwrap_or(0.0),
            calories: response
                .calories
                .get(i)
                .and_then(|p| p.value.parse().ok())
                .unwrap_or(0),
            active_minutes: response
                .fairly_active
                .get(i)
                .and_then(|p| p.value.parse().ok())
                .unwrap_or(0),
        })
        .collect()
}

/// Daily averages. Empty windows yield zero for every statistic; dividing by
/// a zero-length collection is never allowed to surface.
fn daily_averages(activities: &[DailyActivity], sleep: &[SleepLog]) -> FitbitAverages {
    let steps = if activities.is_empty() {
        0
    } else {
        let total: u64 = activities.iter().map(|a| a.steps).sum();
        (total as f64 / activities.len() as f64).round() as u64
    };

    let calories = if activities.is_empty() {
        0
    } else {
        let total: u64 = activities.iter().map(|a| a.calories).sum();
        (total as f64 / activities.len() as f64).round() as u64
    };

    let sleep_hours = if sleep.is_empty() {
        0.0
    } else {
        let total_minutes: u64 = sleep.iter().map(|s| s.minutes_asleep).sum();
        round1(total_minutes as f64 / sleep.len() as f64 / 60.0)
    };

    FitbitAverages {
        steps,
        calories,
        sleep_hours,
    }
}

#[async_trait]
impl DataAdapter for FitbitAdapter {
    fn provider(&self) -> Provider {
        Provider::Fitbit
    }

    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        options: &FetchOptions,
    ) -> AppResult<Value> {
        let (start, end) = options.date_range();

        let (profile, activities, heart_rate, sleep) = tokio::try_join!(
            self.get_profile(access_token),
            self.get_activities(access_token, &start, &end),
            self.get_heart_rate(access_token, &start, &end),
            self.get_sleep(access_token, &start, &end),
        )?;

        let averages = daily_averages(&activities, &sleep);
        let data = FitbitData {
            profile,
            activities,
            heart_rate,
            sleep,
            averages,
        };

        serde_json::to_value(data)
            .map_err(|e| AppError::internal(format!("failed to serialize fitbit payload: {e}")))
    }
}
