use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiResult, AppState};
use crate::config::CrmConfig;
use crate::error::{Error, Result};

const API_VERSION: &str = "2021-07-28";
const PAGE_SIZE: &str = "10";
const MAX_BADGE: u64 = 99;

#[derive(Debug, Deserialize)]
struct ContactsPage {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contact {
    id: String,
    #[serde(default)]
    contact_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    date_added: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub contact_name: String,
    pub last_message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: Option<String>,
    pub unread: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSummary {
    pub unread_count: u64,
    pub conversations: Vec<Conversation>,
    pub contacts: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<Contact> for Conversation {
    fn from(contact: Contact) -> Self {
        let source = non_empty(contact.source).unwrap_or_else(|| "Unknown".to_string());
        Conversation {
            id: contact.id,
            contact_name: non_empty(contact.contact_name)
                .or_else(|| non_empty(contact.first_name))
                .unwrap_or_else(|| "Unknown".to_string()),
            last_message: format!("Source: {source}"),
            kind: "contact".to_string(),
            timestamp: contact.date_added,
            unread: false,
        }
    }
}

async fn fetch(client: &reqwest::Client, config: &CrmConfig) -> Result<CrmSummary> {
    let (Some(api_key), Some(location_id)) = (&config.api_key, &config.location_id) else {
        return Err(Error::NotConfigured("CRM credentials"));
    };

    let url = format!("{}/contacts", config.base_url.trim_end_matches('/'));
    let response = client
        .get(url)
        .query(&[("locationId", location_id.as_str()), ("limit", PAGE_SIZE)])
        .bearer_auth(api_key)
        .header("Version", API_VERSION)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    let page: ContactsPage = response.json().await?;
    let total = page.meta.map_or(0, |m| m.total);
    Ok(CrmSummary {
        unread_count: total.min(MAX_BADGE),
        conversations: page.contacts.into_iter().map(Conversation::from).collect(),
        contacts: total,
    })
}

pub async fn contacts(State(state): State<AppState>) -> ApiResult<CrmSummary> {
    Ok(Json(fetch(&state.http, &state.config.crm).await?))
}
