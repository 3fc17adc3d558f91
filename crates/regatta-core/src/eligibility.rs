use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::normalize_email;

/// One person admitted by the membership feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleUser {
    pub email: String,
    pub name: String,
}

/// Source of the membership roll gating rental signups.
#[async_trait]
pub trait EligibilityFeed: Send + Sync {
    async fn list_eligible_users(&self) -> Result<Vec<EligibleUser>, SyncError>;
}

/// Turn raw feed rows into eligible users.
///
/// Each row is `[emails, name, membership year]` where the emails cell may
/// hold several addresses separated by `;`. Rows below `year_floor` are
/// skipped, entries with a blank email or name are skipped, and a repeated
/// email keeps its first name. A year that fails to parse aborts the run,
/// since it usually means the feed range shifted.
pub fn filter_feed_rows(
    rows: &[Vec<String>],
    year_floor: i32,
) -> Result<Vec<EligibleUser>, SyncError> {
    let mut entries: BTreeMap<String, EligibleUser> = BTreeMap::new();

    for row in rows {
        let emails_cell = row.first().map(String::as_str).unwrap_or("");
        let name = row.get(1).map(|cell| cell.trim()).unwrap_or("");
        let year_text = row.get(2).map(|cell| cell.trim()).unwrap_or("");
        let year: i32 = year_text.parse().map_err(|_| {
            SyncError::message(format!(
                "membership feed has a non-numeric year '{year_text}' in row {row:?}"
            ))
        })?;
        if year < year_floor {
            info!(name, year, floor = year_floor, "Feed row below membership year floor");
            continue;
        }

        for fragment in emails_cell.split(';') {
            let email = normalize_email(fragment);
            if email.is_empty() || name.is_empty() {
                warn!(email = %email, name, "Feed entry has a blank field; skipping");
                continue;
            }
            if entries.contains_key(&email) {
                warn!(email = %email, name, "Duplicate feed email; keeping the first entry");
                continue;
            }
            entries.insert(
                email.clone(),
                EligibleUser {
                    email,
                    name: name.to_string(),
                },
            );
        }
    }

    Ok(entries.into_values().collect())
}

/// HTTP-backed [`EligibilityFeed`] reading a spreadsheet range.
pub struct SheetClient {
    client: reqwest::Client,
    base_url: String,
    sheet_id: String,
    year_floor: i32,
    token: Option<String>,
}

impl SheetClient {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        sheet_id: &str,
        year_floor: i32,
        token: Option<String>,
    ) -> SheetClient {
        SheetClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
            year_floor,
            token,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl EligibilityFeed for SheetClient {
    async fn list_eligible_users(&self) -> Result<Vec<EligibleUser>, SyncError> {
        #[derive(Deserialize)]
        struct ValuesEnvelope {
            rows: Vec<Vec<String>>,
        }

        let url = format!("{}/v1/sheets/{}/values", self.base_url, self.sheet_id);
        let response = self
            .authorize(self.client.get(&url).query(&[("range", "A:C")]))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::service(
                "sheets",
                format!("GET {} responded with {}", url, response.status()),
            ));
        }
        let body: ValuesEnvelope = response.json().await?;
        filter_feed_rows(&body.rows, self.year_floor)
    }
}
