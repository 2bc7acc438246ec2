// ABOUTME: Notion adapter: workspace user, page/database search, edit-recency summary
// ABOUTME: Per-database item counts tolerate individual query failures with a zero default
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Linkvault Contributors

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::models::Provider;
use crate::providers::core::{adapter_client, get_json, post_json, DataAdapter, FetchOptions};

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";

/// Notion-Version header value sent with every request
pub const API_VERSION: &str = "2022-06-28";

/// Item counts are fetched for at most this many databases
const DATABASE_COUNT_LIMIT: usize = 10;
/// Size of the recently-edited ranking
const RECENTLY_EDITED_LIMIT: usize = 10;

const UNTITLED: &str = "Untitled";

// -- Notion API response shapes -----------------------------------------------

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    name: Option<String>,
    avatar_url: Option<String>,
    person: Option<PersonObject>,
}

#[derive(Debug, Deserialize)]
struct PersonObject {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    object: String,
    id: String,
    #[serde(default)]
    created_time: String,
    #[serde(default)]
    last_edited_time: String,
    url: Option<String>,
    properties: Option<Value>,
    title: Option<Vec<RichText>>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

// -- Normalized schema --------------------------------------------------------

/// The authenticated workspace user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionUser {
    /// Notion user id
    pub id: String,
    /// Display name
    pub name: String,
    /// Email, empty for bot-owned integrations
    pub email: String,
    /// Avatar URL, if set
    pub avatar_url: Option<String>,
}

/// One accessible page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionPage {
    /// Page id
    pub id: String,
    /// Resolved title
    pub title: String,
    /// Creation timestamp
    pub created_time: String,
    /// Last-edit timestamp
    pub last_edited_time: String,
    /// Page URL
    pub url: String,
}

/// One accessible database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionDatabase {
    /// Database id
    pub id: String,
    /// Resolved title
    pub title: String,
    /// Creation timestamp
    pub created_time: String,
    /// Last-edit timestamp
    pub last_edited_time: String,
    /// Number of items, 0 when the count query failed
    pub item_count: u64,
}

/// Derived workspace summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionSummary {
    /// Total accessible pages
    pub total_pages: usize,
    /// Total accessible databases
    pub total_databases: usize,
    /// Most recently edited pages, newest first
    pub recently_edited: Vec<NotionPage>,
}

/// Normalized Notion payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionData {
    /// Workspace user
    pub user: NotionUser,
    /// Accessible databases with item counts
    pub databases: Vec<NotionDatabase>,
    /// Accessible pages
    pub pages: Vec<NotionPage>,
    /// Derived summary
    pub summary: NotionSummary,
}

/// Notion API adapter
pub struct NotionAdapter {
    client: Client,
    base_url: String,
}

impl NotionAdapter {
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

    async fn get_user(&self, access_token: &str) -> AppResult<NotionUser> {
        let response: UserResponse = get_json(
            &self.client,
            Provider::Notion,
            "users-me",
            &format!("{}/users/me", self.base_url),
            access_token,
            &[],
            &[("Notion-Version", API_VERSION)],
        )
        .await?;

        Ok(NotionUser {
            id: response.id,
            name: response.name.unwrap_or_else(|| "Notion User".to_owned()),
            email: response
                .person
                .and_then(|p| p.email)
                .unwrap_or_default(),
            avatar_url: response.avatar_url,
        })
    }

    async fn search(
        &self,
        access_token: &str,
    ) -> AppResult<(Vec<NotionPage>, Vec<NotionDatabase>)> {
        let response: SearchResponse = post_json(
            &self.client,
            Provider::Notion,
            "search",
            &format!("{}/search", self.base_url),
            Some(access_token),
            &json!({
                "sort": {
                    "direction": "descending",
                    "timestamp": "last_edited_time",
                },
            }),
            &[("Notion-Version", API_VERSION)],
        )
        .await?;

        let mut pages = Vec::new();
        let mut databases = Vec::new();
        for result in response.results {
            match result.object.as_str() {
                "page" => {
                    let title = result
                        .properties
                        .as_ref()
                        .map_or_else(|| UNTITLED.to_owned(), extract_page_title);
                    pages.push(NotionPage {
                        id: result.id,
                        title,
                        created_time: result.created_time,
                        last_edited_time: result.last_edited_time,
                        url: result.url.unwrap_or_default(),
                    });
                }
                "database" => {
                    let title = extract_rich_text_title(result.title.as_deref());
                    databases.push(NotionDatabase {
                        id: result.id,
                        title,
                        created_time: result.created_time,
                        last_edited_time: result.last_edited_time,
                        item_count: 0,
                    });
                }
                _ => {}
            }
        }

        Ok((pages, databases))
    }

    async fn count_database_items(&self, access_token: &str, database_id: &str) -> AppResult<u64> {
        let response: QueryResponse = post_json(
            &self.client,
            Provider::Notion,
            "database-query",
            &format!("{}/databases/{database_id}/query", self.base_url),
            Some(access_token),
            &json!({}),
            &[("Notion-Version", API_VERSION)],
        )
        .await?;
        Ok(response.results.len() as u64)
    }

    /// Fill in item counts for the first few databases. A failed count for
    /// one database falls back to 0 without failing the aggregation.
    async fn with_item_counts(
        &self,
        access_token: &str,
        mut databases: Vec<NotionDatabase>,
    ) -> Vec<NotionDatabase> {
        let counted = databases.len().min(DATABASE_COUNT_LIMIT);
        let counts = join_all(
            databases[..counted]
                .iter()
                .map(|db| self.count_database_items(access_token, &db.id)),
        )
        .await;

        for (db, count) in databases[..counted].iter_mut().zip(counts) {
            db.item_count = match count {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        target: "linkvault::providers",
                        database_id = %db.id,
                        error = %e,
                        "database item count failed, defaulting to 0"
                    );
                    0
                }
            };
        }

        databases
    }
}

/// Resolve a page title from its properties object: the first property of
/// type `title` with content wins.
fn extract_page_title(properties: &Value) -> String {
    let Some(map) = properties.as_object() else {
        return UNTITLED.to_owned();
    };
    for prop in map.values() {
        if prop.get("type").and_then(Value::as_str) == Some("title") {
            if let Some(text) = prop
                .get("title")
                .and_then(Value::as_array)
                .and_then(|parts| parts.first())
                .and_then(|part| part.get("plain_text"))
                .and_then(Value::as_str)
            {
                return text.to_owned();
            }
        }
    }
    UNTITLED.to_owned()
}

fn extract_rich_text_title(title: Option<&[RichText]>) -> String {
    title
        .and_then(|parts| parts.first())
        .map_or_else(|| UNTITLED.to_owned(), |part| part.plain_text.clone())
}

/// Most recently edited pages, newest first. Unparseable timestamps sort
/// oldest.
fn recently_edited(pages: &[NotionPage]) -> Vec<NotionPage> {
    let mut ranked: Vec<&NotionPage> = pages.iter().collect();
    ranked.sort_by_key(|page| std::cmp::Reverse(parse_time(&page.last_edited_time)));
    ranked
        .into_iter()
        .take(RECENTLY_EDITED_LIMIT)
        .cloned()
        .collect()
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl DataAdapter for NotionAdapter {
    fn provider(&self) -> Provider {
        Provider::Notion
    }

    async fn fetch_normalized_data(
        &self,
        access_token: &str,
        _options: &FetchOptions,
    ) -> AppResult<Value> {
        let user = self.get_user(access_token).await?;
        let (pages, databases) = self.search(access_token).await?;
        let databases = self.with_item_counts(access_token, databases).await;

        let summary = NotionSummary {
            total_pages: pages.len(),
            total_databases: databases.len(),
            recently_edited: recently_edited(&pages),
        };
        let data = NotionData {
            user,
            databases,
            pages,
            summary,
        };

        serde_json::to_value(data)
            .map_err(|e| AppError::internal(format!("failed to serialize notion payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, last_edited: &str) -> NotionPage {
        NotionPage {
            id: id.to_owned(),
            title: "page".to_owned(),
            created_time: "2024-01-01T00:00:00.000Z".to_owned(),
            last_edited_time: last_edited.to_owned(),
            url: String::new(),
        }
    }

    #[test]
    fn page_title_comes_from_the_title_property() {
        let properties = json!({
            "Status": { "type": "select" },
            "Name": {
                "type": "title",
                "title": [{ "plain_text": "Quarterly Plan" }],
            },
        });
        assert_eq!(extract_page_title(&properties), "Quarterly Plan");
    }

    #[test]
    fn missing_title_property_falls_back_to_untitled() {
        assert_eq!(extract_page_title(&json!({})), UNTITLED);
        assert_eq!(
            extract_page_title(&json!({"Name": {"type": "title", "title": []}})),
            UNTITLED
        );
    }

    #[test]
    fn recently_edited_ranks_newest_first_and_truncates() {
        let mut pages: Vec<NotionPage> = (0..12)
            .map(|i| page(&format!("p{i}"), &format!("2025-01-{:02}T00:00:00Z", i + 1)))
            .collect();
        pages.reverse();
        let ranked = recently_edited(&pages);
        assert_eq!(ranked.len(), RECENTLY_EDITED_LIMIT);
        assert_eq!(ranked[0].id, "p11");
        assert_eq!(ranked[9].id, "p2");
    }
}
