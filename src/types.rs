//! Types for the bucket bot: readings, market buckets, Gamma payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Latest row from the reading store. Ids grow monotonically.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: i64,
    /// Measured value (max temperature, °F).
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

/// One outcome bucket of a grouped market (e.g. "34-35°F").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub id: String,
    pub title: String,
    /// CLOB token id of the YES outcome. None when the market is closed or malformed.
    pub instrument_id: Option<String>,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" (id={})", self.title, self.id)
    }
}

/// Gamma event response (for /events?slug=...).
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
    pub id: Option<String>,
    pub title: Option<String>,
    pub markets: Option<Vec<GammaMarket>>,
}

/// Gamma market inside an event (minimal).
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    pub id: Option<String>,
    pub question: Option<String>,
    #[serde(rename = "groupItemTitle")]
    pub group_item_title: Option<String>,
    #[serde(rename = "clobTokenIds")]
    pub clob_token_ids: Option<ClobTokenIds>,
    pub closed: Option<bool>,
}

/// Gamma ships `clobTokenIds` as a JSON-encoded string ("[\"id1\", \"id2\"]"),
/// some endpoints as a plain array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClobTokenIds {
    List(Vec<String>),
    Encoded(String),
}
