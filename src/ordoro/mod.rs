//! Ordoro API client: token exchange, paginated GETs, retry with backoff.
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{self, AuthMode};
use crate::error::{Result, SyncError};
use crate::retry::{is_retryable, RetryPolicy};

pub mod model;
pub mod pagination;

pub use model::{extract_items, AccessToken, PageCursor, TokenResponse};
pub use pagination::paginate;

const SERVICE: &str = "ordoro";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that can hand out pages of raw inventory/product items.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Acquire (or confirm) credentials. Called once before the first page.
    async fn authenticate(&self) -> Result<()>;

    /// Fetch one page of `endpoint` and return the raw response body.
    async fn fetch_page(&self, endpoint: &str, cursor: PageCursor, limit: usize) -> Result<Value>;
}

pub struct OrdoroClient {
    http: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    auth_mode: AuthMode,
    retry: RetryPolicy,
    token: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for OrdoroClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrdoroClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth_mode", &self.auth_mode)
            .finish_non_exhaustive()
    }
}

impl OrdoroClient {
    pub fn new(cfg: &config::Ordoro) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ordoro-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            // Followed by hand in `fetch_page`: reqwest drops credentials
            // when a redirect changes scheme or port.
            .redirect(Policy::none())
            .build()
            .map_err(|e| SyncError::api(SERVICE, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            auth_mode: cfg.auth_mode,
            retry: RetryPolicy::new(cfg.max_retries, cfg.backoff_base),
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::api(SERVICE, format!("invalid endpoint {path:?}: {e}")))
    }

    /// Send a request, retrying transport errors and retryable statuses.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let failure = match build().send().await {
                Ok(res) if is_retryable(res.status()) => format!("status {}", res.status()),
                Ok(res) => return Ok(res),
                Err(err) if err.is_builder() => {
                    return Err(SyncError::api(SERVICE, format!("bad request for {what}: {err}")))
                }
                Err(err) => err.to_string(),
            };
            attempt += 1;
            if !self.retry.allows(attempt) {
                return Err(SyncError::RetriesExhausted {
                    service: SERVICE,
                    attempts: attempt,
                    last: failure,
                });
            }
            let delay = self.retry.delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, %failure, what, "retrying Ordoro request");
            tokio::time::sleep(delay).await;
        }
    }

    /// Exchange client id/secret for a bearer token.
    pub async fn request_token(&self) -> Result<AccessToken> {
        let url = self.endpoint("oauth/token")?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let res = self
            .send_with_retry("token", || self.http.post(url.clone()).form(&form))
            .await?;

        let status = res.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::auth(SERVICE, format!("token request rejected ({status}): {body}")));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::api(SERVICE, format!("token endpoint error {status}: {body}")));
        }

        let body = res
            .text()
            .await
            .map_err(|e| SyncError::api(SERVICE, format!("failed to read token response: {e}")))?;
        let payload: TokenResponse = serde_json::from_str(&body).map_err(|source| SyncError::Decode {
            what: "Ordoro token response",
            source,
        })?;
        Ok(AccessToken::from_response(payload, Instant::now()))
    }

    /// Current bearer token, refreshed when close to expiry.
    async fn bearer(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }
        debug!("acquiring Ordoro access token");
        let token = self.request_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    fn get_page(&self, url: &Url, bearer: Option<&str>) -> RequestBuilder {
        let req = self.http.get(url.clone()).header("Accept", "application/json");
        self.authorize(req, bearer)
    }

    fn authorize(&self, req: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        match bearer {
            Some(token) => req.bearer_auth(token),
            None => req.basic_auth(&self.client_id, Some(&self.client_secret)),
        }
    }
}

#[async_trait]
impl InventorySource for OrdoroClient {
    async fn authenticate(&self) -> Result<()> {
        match self.auth_mode {
            AuthMode::ClientCredentials => {
                self.bearer().await?;
                info!("obtained Ordoro access token");
            }
            AuthMode::Basic => debug!("using basic credentials for Ordoro"),
        }
        Ok(())
    }

    async fn fetch_page(&self, endpoint: &str, cursor: PageCursor, limit: usize) -> Result<Value> {
        let url = self.endpoint(endpoint)?;
        let bearer = match self.auth_mode {
            AuthMode::ClientCredentials => Some(self.bearer().await?),
            AuthMode::Basic => None,
        };
        let (cursor_key, cursor_value) = cursor.query();
        let query = [("limit", limit), (cursor_key, cursor_value)];

        let mut res = self
            .send_with_retry(endpoint, || self.get_page(&url, bearer.as_deref()).query(&query))
            .await?;

        if res.status().is_redirection() {
            let location = res
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| SyncError::api(SERVICE, format!("{endpoint} redirected without a Location")))?;
            let target = redirect_target(&self.base_url, res.url(), location)?;
            debug!(endpoint, %target, "following redirect");
            res = self
                .send_with_retry(endpoint, || self.get_page(&target, bearer.as_deref()))
                .await?;
            if res.status().is_redirection() {
                return Err(SyncError::api(SERVICE, format!("{endpoint} redirected more than once")));
            }
        }

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(SyncError::auth(SERVICE, format!("{endpoint} returned {status}")));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SyncError::api(SERVICE, format!("{endpoint} returned {status}: {body}")));
        }

        let body = res
            .text()
            .await
            .map_err(|e| SyncError::api(SERVICE, format!("failed to read {endpoint} page: {e}")))?;
        serde_json::from_str(&body).map_err(|source| SyncError::Decode {
            what: "Ordoro page",
            source,
        })
    }
}

/// Resolve a redirect `location` against the URL that produced it. A
/// redirect never downgrades an https base to plain http.
fn redirect_target(base: &Url, from: &Url, location: &str) -> Result<Url> {
    let mut target = from
        .join(location)
        .map_err(|e| SyncError::api(SERVICE, format!("bad redirect location {location:?}: {e}")))?;
    if base.scheme() == "https" && target.scheme() == "http" {
        target
            .set_scheme("https")
            .map_err(|_| SyncError::api(SERVICE, format!("cannot upgrade redirect {target} to https")))?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_keep_https() {
        let base = Url::parse("https://api.ordoro.com/").unwrap();
        let from = Url::parse("https://api.ordoro.com/product/?limit=100&offset=0").unwrap();
        assert_eq!(
            redirect_target(&base, &from, "http://api.ordoro.com/product/?limit=100&offset=0")
                .unwrap()
                .as_str(),
            "https://api.ordoro.com/product/?limit=100&offset=0"
        );
        assert_eq!(
            redirect_target(&base, &from, "/v2/product/").unwrap().as_str(),
            "https://api.ordoro.com/v2/product/"
        );

        let plain = Url::parse("http://127.0.0.1:8080/").unwrap();
        let from = Url::parse("http://127.0.0.1:8080/product/").unwrap();
        assert_eq!(
            redirect_target(&plain, &from, "http://127.0.0.1:9090/product/")
                .unwrap()
                .as_str(),
            "http://127.0.0.1:9090/product/"
        );
    }

    fn client(auth_mode: AuthMode) -> OrdoroClient {
        let mut cfg = config::from_map(&config::example()).unwrap().ordoro;
        cfg.auth_mode = auth_mode;
        OrdoroClient::new(&cfg).unwrap()
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let c = client(AuthMode::ClientCredentials);
        assert_eq!(
            c.endpoint("product/").unwrap().as_str(),
            "https://api.ordoro.com/product/"
        );
        assert_eq!(
            c.endpoint("oauth/token").unwrap().as_str(),
            "https://api.ordoro.com/oauth/token"
        );
    }

    #[test]
    fn authorize_sets_expected_header() {
        let c = client(AuthMode::Basic);
        let req = c
            .authorize(c.http.get("https://api.ordoro.com/product/"), None)
            .build()
            .unwrap();
        let auth = req.headers().get("Authorization").unwrap().to_str().unwrap();
        assert!(auth.starts_with("Basic "));

        let req = c
            .authorize(c.http.get("https://api.ordoro.com/product/"), Some("tok"))
            .build()
            .unwrap();
        assert_eq!(
            req.headers().get("Authorization").unwrap().to_str().unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", client(AuthMode::ClientCredentials));
        assert!(!rendered.contains("ordoro-secret"));
    }
}
