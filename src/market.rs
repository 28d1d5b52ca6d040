//! Bucket catalog from the Gamma API (event slug -> ordered buckets with YES token ids).

use crate::types::{Bucket, ClobTokenIds, GammaEvent, GammaMarket};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Live bucket catalog for one market grouping.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn buckets(&self, slug: &str) -> Result<Vec<Bucket>>;
}

pub struct GammaCatalog {
    client: Client,
    base_url: String,
}

impl GammaCatalog {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("autobet-rust")
            .build()
            .context("build Gamma HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CatalogSource for GammaCatalog {
    /// GET /events?slug=... returns a list; the first event's markets are the buckets.
    async fn buckets(&self, slug: &str) -> Result<Vec<Bucket>> {
        let url = format!("{}/events?slug={}", self.base_url, urlencoding::encode(slug));
        let res = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Gamma API request")?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!(
                "Gamma {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            );
        }
        let events: Vec<GammaEvent> = res.json().await.context("Gamma events JSON")?;
        Ok(buckets_from_events(events))
    }
}

/// First event's markets, in Gamma order. Markets without an id are dropped.
pub fn buckets_from_events(events: Vec<GammaEvent>) -> Vec<Bucket> {
    let Some(event) = events.into_iter().next() else {
        return Vec::new();
    };
    tracing::debug!(
        event_id = ?event.id,
        title = ?event.title,
        "Gamma event found"
    );
    event
        .markets
        .unwrap_or_default()
        .iter()
        .filter_map(bucket_from_market)
        .collect()
}

fn bucket_from_market(m: &GammaMarket) -> Option<Bucket> {
    let id = m.id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let title = m
        .group_item_title
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(m.question.as_deref())
        .unwrap_or("")
        .to_string();
    let instrument_id = if m.closed == Some(true) {
        None
    } else {
        m.clob_token_ids.as_ref().and_then(yes_token_id)
    };
    Some(Bucket {
        id: id.to_string(),
        title,
        instrument_id,
    })
}

/// First entry of clobTokenIds ([Yes, No]).
fn yes_token_id(ids: &ClobTokenIds) -> Option<String> {
    let parts: Vec<String> = match ids {
        ClobTokenIds::List(v) => v.clone(),
        ClobTokenIds::Encoded(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str(trimmed).unwrap_or_default()
            } else {
                trimmed
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .collect()
            }
        }
    };
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .find(|p| !p.is_empty())
}
