// ABOUTME: Google Calendar adapter: profile, calendar list, events, meeting-load summary
// ABOUTME: Filters to timed events and derives per-day counts and top attendees
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::providers::core::{adapter_client, get_json, round1, DataAdapter, FetchOptions};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Maximum events fetched from the primary calendar
const MAX_EVENTS: u32 = 250;
/// How many attendees the ranking keeps
const TOP_ATTENDEE_LIMIT: usize = 10;

// -- Google API response shapes ----------------------------------------------

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    attendees: Option<Vec<AttendeeObject>>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttendeeObject {
    email: Option<String>,
}

// -- Normalized schema --------------------------------------------------------

/// Normalized Google profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleProfile {
    /// Google account id
    pub id: String,
    /// Account email
    pub email: String,
    /// Display name
    pub name: String,
    /// Avatar URL, empty when unset
    pub picture: String,
}

/// One calendar the account can read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Calendar id
    pub id: String,
    /// Calendar title
    pub summary: String,
}

/// A timed event from the primary calendar (all-day events are excluded)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Event id
    pub id: String,
    /// Event title
    pub summary: String,
    /// Event description
    pub description: Option<String>,
    /// Start instant
    pub start: DateTime<Utc>,
    /// End instant
    pub end: DateTime<Utc>,
    /// Attendee emails
    pub attendees: Vec<String>,
    /// Location, if set
    pub location: Option<String>,
}

/// One entry of the attendee ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendeeCount {
    /// Attendee email
    pub email: String,
    /// Shared-event count
    pub count: u32,
}

/// Derived meeting-load summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSummary {
    /// Number of timed events in the window
    pub total_events: usize,
    /// Total scheduled hours, one decimal
    pub total_hours: f64,
    /// Event count per day (`YYYY-MM-DD` keys)
    pub events_by_day: BTreeMap<String, u32>,
    /// Most frequent co-attendees, descending
    pub top_attendees: Vec<AttendeeCount>,
}

/// Normalized Google Calendar payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleCalendarData {
    /// User profile
    pub profile: GoogleProfile,
    /// Calendars visible to the account
    pub calendars: Vec<CalendarEntry>,
    /// Timed events in the window
    pub events: Vec<CalendarEvent>,
    /// Derived meeting-load summary
    pub summary: CalendarSummary,
}

/// Google Calendar API adapter
pub struct GoogleCalendarAdapter {
    client: Client,
    base_url: String,
}

impl GoogleCalendarAdapter {
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

    async fn get_profile(&self, access_token: &str) -> AppResult<GoogleProfile> {
        let response: UserInfoResponse = get_json(
            &self.client,
            Provider::Google,
            "userinfo",
            &format!("{}/oauth2/v2/userinfo", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(GoogleProfile {
            id: response.id,
            email: response.email.unwrap_or_default(),
            name: response.name.unwrap_or_default(),
            picture: response.picture.unwrap_or_default(),
        })
    }

    async fn get_calendars(&self, access_token: &str) -> AppResult<Vec<CalendarEntry>> {
        let response: CalendarListResponse = get_json(
            &self.client,
            Provider::Google,
            "calendar-list",
            &format!("{}/calendar/v3/users/me/calendarList", self.base_url),
            access_token,
            &[],
            &[],
        )
        .await?;

        Ok(response
            .items
            .into_iter()
            .map(|cal| CalendarEntry {
                id: cal.id,
                summary: cal.summary,
            })
            .collect())
    }

    async fn get_events(
        &self,
        access_token: &str,
        time_min: &str,
        time_max: &str,
    ) -> AppResult<Vec<CalendarEvent>> {
        let response: EventsResponse = get_json(
            &self.client,
            Provider::Google,
            "events",
            &format!("{}/calendar/v3/calendars/primary/events", self.base_url),
            access_token,
            &[
                ("maxResults", MAX_EVENTS.to_string()),
                ("singleEvents", "true".to_owned()),
                ("orderBy", "startTime".to_owned()),
                ("timeMin", time_min.to_owned()),
                ("timeMax", time_max.to_owned()),
            ],
            &[],
        )
        .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(normalize_event)
            .collect())
    }
}

/// Keep only events with parseable start and end instants; all-day events
/// carry a date instead of a dateTime and are dropped.
fn normalize_event(item: EventItem) -> Option<CalendarEvent> {
    let start = parse_event_time(item.start.as_ref())?;
    let end = parse_event_time(item.end.as_ref())?;
    Some(CalendarEvent {
        id: item.id,
        summary: item.summary.unwrap_or_default(),
        description: item.description,
        start,
        end,
        attendees: item
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.email)
            .collect(),
        location: item.location,
    })
}

fn parse_event_time(time: Option<&EventTime>) -> Option<DateTime<Utc>> {
    let raw = time?.date_time.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Derive the meeting-load summary. Zero events produce zero totals and
/// empty maps.
fn summarize(events: &[CalendarEvent]) -> CalendarSummary {
    let mut total_minutes = 0.0;
    let mut events_by_day: BTreeMap<String, u32> = BTreeMap::new();
    let mut attendee_counts: BTreeMap<String, u32> = BTreeMap::new();

    for event in events {
        let duration = event.end.signed_duration_since(event.start);
        total_minutes += duration.num_seconds() as f64 / 60.0;

        let day = event.start.format("%Y-%m-%d").to_string();
        *events_by_day.entry(day).or_insert(0) += 1;

        for email in &event.attendees {
            *attendee_counts.entry(email.clone()).or_insert(0) += 1;
        }
    }

    let mut top_attendees: Vec<AttendeeCount> = attendee_counts
        .into_iter()
        .map(|(email, count)| AttendeeCount { email, count })
        .collect();
    // Descending by count; the BTreeMap source makes email order the tiebreak.
    top_attendees.sort_by(|a, b| b.count.cmp(&a.count));
    top_attendees.truncate(TOP_ATTENDEE_LIMIT);

    CalendarSummary {
        total_events: events.len(),
        total_hours: round1(total_minutes / 60.0),
        events_by_day,
        top_attendees,
    }
}

#[async_trait]
impl DataAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        options: &FetchOptions,
    ) -> AppResult<Value> {
        let (time_min, time_max) = options.rfc3339_range();

        let (profile, calendars, events) = tokio::try_join!(
            self.get_profile(access_token),
            self.get_calendars(access_token),
            self.get_events(access_token, &time_min, &time_max),
        )?;

        let summary = summarize(&events);
        let data = GoogleCalendarData {
            profile,
            calendars,
            events,
            summary,
        };

        serde_json::to_value(data)
            .map_err(|e| AppError::internal(format!("failed to serialize calendar payload: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(start: &str, end: &str, attendees: &[&str]) -> CalendarEvent {
        CalendarEvent {
            id: "e".to_owned(),
            summary: "standup".to_owned(),
            description: None,
            start: DateTime::parse_from_rfc3339(start).unwrap().with_timezone(&Utc),
            end: DateTime::parse_from_rfc3339(end).unwrap().with_timezone(&Utc),
            attendees: attendees.iter().map(|a| (*a).to_owned()).collect(),
            location: None,
        }
    }

    #[test]
    fn summary_counts_hours_days_and_attendees() {
        let events = vec![
            event(
                "2025-03-03T09:00:00Z",
                "2025-03-03T10:30:00Z",
                &["ana@example.com", "bo@example.com"],
            ),
            event("2025-03-04T14:00:00Z", "2025-03-04T14:30:00Z", &["ana@example.com"]),
        ];
        let summary = summarize(&events);
        assert_eq!(summary.total_events, 2);
        assert!((summary.total_hours - 2.0).abs() < f64::EPSILON);
        assert_eq!(summary.events_by_day.get("2025-03-03"), Some(&1));
        assert_eq!(summary.events_by_day.get("2025-03-04"), Some(&1));
        assert_eq!(summary.top_attendees[0].email, "ana@example.com");
        assert_eq!(summary.top_attendees[0].count, 2);
    }

    #[test]
    fn empty_window_produces_zero_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_events, 0);
        assert!((summary.total_hours - 0.0).abs() < f64::EPSILON);
        assert!(summary.events_by_day.is_empty());
        assert!(summary.top_attendees.is_empty());
    }

    #[test]
    fn all_day_events_are_filtered_out() {
        let item = EventItem {
            id: "allday".to_owned(),
            summary: Some("holiday".to_owned()),
            description: None,
            start: Some(EventTime { date_time: None }),
            end: Some(EventTime { date_time: None }),
            attendees: None,
            location: None,
        };
        assert!(normalize_event(item).is_none());
    }
}
