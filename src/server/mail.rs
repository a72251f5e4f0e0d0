use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbox {
    pub unread_count: u32,
    pub emails: Vec<Email>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub from: String,
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub unread: bool,
}

impl Inbox {
    /// Shown until a real mail feed is wired up.
    fn sample(now: DateTime<Utc>) -> Self {
        let email = |id: &str, from: &str, subject: &str, snippet: &str, age: Duration, unread| Email {
            id: id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            snippet: snippet.to_string(),
            date: now - age,
            unread,
        };
        Self {
            unread_count: 5,
            emails: vec![
                email(
                    "1",
                    "WeddingWire",
                    "New inquiry from your listing",
                    "Someone viewed your profile and sent an inquiry...",
                    Duration::zero(),
                    true,
                ),
                email(
                    "2",
                    "The Knot",
                    "Review request reminder",
                    "You have pending reviews to respond to...",
                    Duration::hours(1),
                    true,
                ),
                email(
                    "3",
                    "Google Ads",
                    "Your campaign performance report",
                    "Your ads received 1,234 impressions this week...",
                    Duration::days(1),
                    false,
                ),
            ],
        }
    }
}

async fn fetch(client: &reqwest::Client, feed_url: &str) -> Result<Inbox> {
    Ok(client
        .get(feed_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

pub async fn inbox(State(state): State<AppState>) -> Json<Inbox> {
    let Some(feed_url) = state.config.mail.feed_url.as_deref() else {
        return Json(Inbox::sample(Utc::now()));
    };

    match fetch(&state.http, feed_url).await {
        Ok(inbox) => Json(inbox),
        Err(e) => {
            warn!("Mail feed failed, using sample inbox: {}", e);
            Json(Inbox::sample(Utc::now()))
        }
    }
}
