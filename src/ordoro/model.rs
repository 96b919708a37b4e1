use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Keys Ordoro (and compatible APIs) use to wrap a page of results.
const ENVELOPE_KEYS: [&str; 6] = ["product", "products", "inventory", "results", "data", "items"];

const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// A bearer token and the instant it stops being usable.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn from_response(resp: TokenResponse, now: Instant) -> Self {
        let ttl = resp
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        Self {
            value: resp.access_token,
            expires_at: now + ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Position of the next page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    Offset(usize),
    Page(usize),
}

impl PageCursor {
    pub fn query(&self) -> (&'static str, usize) {
        match *self {
            PageCursor::Offset(n) => ("offset", n),
            PageCursor::Page(n) => ("page", n),
        }
    }
}

/// Pull the list of items out of one page body.
///
/// Accepts a bare array, an object wrapping the list under one of the
/// envelope keys, or a single object that looks like an item.
pub fn extract_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS {
                if matches!(map.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = map.remove(key) {
                        return items;
                    }
                }
            }
            if map.contains_key("id") || map.contains_key("sku") {
                vec![Value::Object(map)]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
