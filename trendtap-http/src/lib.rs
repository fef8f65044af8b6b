//! Minimal HTTP client with safe logging, retries, and flexible auth.
//!
//! - Request options: headers, `Auth`, query params, timeout, retries
//! - Redacts sensitive query params and never logs secret values
//! - Retries network failures and 5xx with exponential backoff
//! - Surfaces 429 as [`HttpError::RateLimited`] with the server's reset window,
//!   leaving the wait policy to the caller
//! - Optional *raw* request/response logging via `TRENDTAP_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), trendtap_http::HttpError> {
//! let client = trendtap_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", trendtap_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```
//!
//! Security: `Auth::Bearer` values are sanitized before use, and logs only
//! ever include the auth kind (bearer/basic/header/query/none), not the secret.

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::sleep;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "TRENDTAP_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)

const SECRET_QUERY_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn is_secret_key(key: &str) -> bool {
    SECRET_QUERY_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// Copy query params for logging, masking the values of secret keys.
fn redact_query(query: &[(&str, Cow<'_, str>)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| {
            let shown = if is_secret_key(k) { "<redacted>" } else { v.as_ref() };
            ((*k).to_string(), shown.to_string())
        })
        .collect()
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(
    method: &Method,
    url: &Url,
    query: &[(String, String)],
    headers: &HeaderMap,
    form_fields: Option<usize>,
) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    for (name, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    // Form bodies carry grant payloads; only their shape is shown.
    if let Some(n) = form_fields {
        parts.push(format!("--data-urlencode @- # ({n} fields)"));
    }
    let mut shown = url.clone();
    if !query.is_empty() {
        shown.query_pairs_mut().extend_pairs(query.iter());
    }
    parts.push(format!("'{}'", shown.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization") {
                val = "<redacted>".into();
            }
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    /// The server answered 429. `reset_in` is derived from `x-rate-limit-reset`
    /// or `Retry-After` when either header is present.
    #[error("rate limited (reset_in={reset_in:?}): {message}, request_id={request_id}")]
    RateLimited {
        reset_in: Option<Duration>,
        message: String,
        request_id: String,
    },
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

// ==============================
// Auth & Request Options
// ==============================

/// How a request authenticates.
#[derive(Clone, Copy, Debug)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <token>`; the token is sanitized first.
    Bearer(&'a str),
    /// `Authorization: Basic base64(user:password)`
    Basic { username: &'a str, password: &'a str },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Basic { .. } => "basic",
            Auth::None => "none",
        }
    }
}

/// Per-request overrides; unset fields fall back to the client defaults.
///
/// ```
/// use trendtap_http::{Auth, RequestOpts};
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(0),
///     auth: Some(Auth::Bearer("token")),
///     query: Some(vec![("query", "#rustlang".into())]),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.headers.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

enum Payload<'b> {
    Empty,
    Form(&'b [(&'b str, &'b str)]),
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use trendtap_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    /// Override the default timeout returned by [`HttpClient::new`].
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// Override the default retry budget returned by [`HttpClient::new`].
    ///
    /// ```no_run
    /// use trendtap_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new("https://api.example.com")?.with_retries(5);
    /// assert_eq!(client.max_retries, 5);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET JSON with per-request options (headers/query/auth/timeout/retries).
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.send_json(Method::GET, path, Payload::Empty, opts).await
    }

    /// POST an `application/x-www-form-urlencoded` body and decode a JSON reply.
    pub async fn post_form<T>(
        &self,
        path: &str,
        form: &[(&str, &str)],
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, Payload::Form(form), opts).await
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn send_json<T>(
        &self,
        method: Method,
        path: &str,
        body: Payload<'_>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;

        // Bearer tokens are validated once, not per attempt.
        let bearer = match opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_api_key(tok)?),
            _ => None,
        };
        let form = match body {
            Payload::Form(pairs) => Some(pairs),
            Payload::Empty => None,
        };

        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");

        let redacted_q = redact_query(opts.query.as_deref().unwrap_or_default());

        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        loop {
            // ----- Build request -----
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);

            if let Some(q) = &opts.query {
                let pairs: Vec<(&str, &str)> = q.iter().map(|(k, v)| (*k, v.as_ref())).collect();
                rb = rb.query(&pairs);
            }

            if let Some(pairs) = form {
                rb = rb.form(pairs);
            }

            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }

            match (&opts.auth, &bearer) {
                (Some(Auth::Basic { username, password }), _) => {
                    rb = rb.basic_auth(username, Some(password));
                }
                (_, Some(tok)) => {
                    rb = rb.bearer_auth(tok);
                }
                _ => {}
            }

            // ----- Safe request logging (pre-send) -----
            let req_id = format!("r{:x}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed));
            let attempt0 = attempt + 1;
            let has_body = form.is_some();

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt0,
                max_retries,
                method=%method,
                host_path=%format!("{}{}", url.domain().unwrap_or("-"), url.path()),
                query=?redacted_q,
                timeout_ms=timeout.as_millis() as u64,
                auth_kind,
                has_body,
                "http.request.start"
            );

            if raw_enabled() {
                let no_headers = HeaderMap::new();
                let hdrs = opts.headers.as_ref().unwrap_or(&no_headers);
                let curl = make_curl(&method, &url, &redacted_q, hdrs, form.map(<[_]>::len));
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            // ----- Send -----
            let t0 = std::time::Instant::now();
            let fetched = match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    resp.bytes()
                        .await
                        .map(|bytes| (status, headers, bytes))
                        .map_err(|e| ("body", e))
                }
                Err(e) => Err(("send", e)),
            };
            let (status, headers, bytes) = match fetched {
                Ok(parts) => parts,
                Err((stage, err)) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            stage,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        stage,
                        attempt,
                        message=%message,
                        "http.network_error"
                    );
                    return Err(HttpError::Network(message));
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
            let req_hdr_id = header("x-request-id")
                .or_else(|| header("x-correlation-id"))
                .unwrap_or("-");

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=bytes.len(),
                x_request_id=%req_hdr_id,
                rate_limit.limit=?header("x-rate-limit-limit"),
                rate_limit.remaining=?header("x-rate-limit-remaining"),
                rate_limit.reset=?header("x-rate-limit-reset"),
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&headers);
                let mut body_snip = bytes.to_vec();
                let truncated = body_snip.len() > RAW_MAX_BODY;
                if truncated {
                    body_snip.truncate(RAW_MAX_BODY);
                }
                let text = String::from_utf8_lossy(&body_snip);
                tracing::info!(
                    target:"http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    headers=?hdrs,
                    body=%text,
                    truncated
                );
            }

            let snippet = snip_body(&bytes);
            tracing::trace!(
                req_id=%req_id,
                body_snippet=%snippet,
                "http.response.body_snippet"
            );

            // ----- Success path -----
            if status.is_success() {
                // Surface common Twitter meta (safe & cheap)
                if let Ok(val) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                    let result_count = val.get("meta").and_then(|m| m.get("result_count")).cloned();
                    let next_token = val.get("meta").and_then(|m| m.get("next_token")).cloned();
                    tracing::debug!(
                        req_id=%req_id,
                        ?result_count,
                        ?next_token,
                        "http.response.meta"
                    );
                }

                return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                    tracing::warn!(
                        req_id=%req_id,
                        serde_line=%e.line(),
                        serde_col=%e.column(),
                        serde_err=%e.to_string(),
                        body_snippet=%snippet,
                        "http.response.decode_error"
                    );
                    HttpError::Decode(e.to_string(), snippet)
                });
            }

            let message = extract_error_message_multi(&bytes);
            let request_id = req_hdr_id.to_string();

            // 429 is handed back untouched; the caller owns the wait.
            if status == StatusCode::TOO_MANY_REQUESTS {
                let reset_in = rate_limit_reset_in(&headers);
                tracing::info!(
                    req_id=%req_id,
                    %status,
                    reset_in_secs=?reset_in.map(|d| d.as_secs()),
                    message=%message,
                    x_request_id=%request_id,
                    "http.rate_limited"
                );
                return Err(HttpError::RateLimited {
                    reset_in,
                    message,
                    request_id,
                });
            }

            if status.is_server_error() && attempt < max_retries {
                attempt += 1;
                let delay = retry_after_delay_secs(&headers)
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff(attempt));
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    message=%message,
                    body_snippet=%snippet,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(
                req_id=%req_id,
                %status,
                message=%message,
                x_request_id=%request_id,
                body_snippet=%snippet,
                "http.error"
            );
            return Err(HttpError::Api {
                status,
                message,
                request_id,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(16)))
}

fn extract_error_message_multi(body: &[u8]) -> String {
    // Twitter: {"errors":[{"message":"...", "detail":"...", "title":"..."}]}
    #[derive(Deserialize)]
    struct TwErrors {
        errors: Vec<TwErr>,
    }
    #[derive(Deserialize)]
    struct TwErr {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(tw) = serde_json::from_slice::<TwErrors>(body) {
        if let Some(first) = tw.errors.into_iter().next() {
            for candidate in [first.message, first.detail, first.title] {
                if !candidate.is_empty() {
                    return candidate;
                }
            }
        }
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.detail, m.message, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

/// Time until the rate-limit window reopens.
///
/// `x-rate-limit-reset` carries an absolute epoch second; `Retry-After` a
/// relative delay. A reset already in the past yields zero.
pub fn rate_limit_reset_in(h: &HeaderMap) -> Option<Duration> {
    let reset_at = h
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    if let Some(reset_at) = reset_at {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        return Some(Duration::from_secs(reset_at.saturating_sub(now)));
    }
    retry_after_delay_secs(h).map(Duration::from_secs)
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    // 1) Trim outer spaces/quotes
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    // 2) Remove *all* ASCII whitespace (spaces, tabs, newlines, carriage returns)
    s.retain(|ch| !ch.is_ascii_whitespace());

    // 3) Ensure ASCII and no control chars
    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }

    // 4) Validate header value upfront for clear errors
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn reset_in_from_epoch_header() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let h = headers(&[("x-rate-limit-reset", (now + 30).to_string())]);
        let secs = rate_limit_reset_in(&h).unwrap().as_secs();
        assert!((29..=30).contains(&secs), "got {secs}");
    }

    #[test]
    fn reset_in_past_epoch_is_zero() {
        let h = headers(&[("x-rate-limit-reset", "1000".to_string())]);
        assert_eq!(rate_limit_reset_in(&h), Some(Duration::ZERO));
    }

    #[test]
    fn reset_in_falls_back_to_retry_after() {
        let h = headers(&[("retry-after", "7".to_string())]);
        assert_eq!(rate_limit_reset_in(&h), Some(Duration::from_secs(7)));
        assert_eq!(rate_limit_reset_in(&HeaderMap::new()), None);
    }

    #[test]
    fn twitter_error_envelope_prefers_message() {
        let body = br#"{"errors":[{"message":"","detail":"Too Many Requests","title":"x"}]}"#;
        assert_eq!(extract_error_message_multi(body), "Too Many Requests");
    }

    #[test]
    fn sanitize_strips_quotes_and_whitespace() {
        assert_eq!(sanitize_api_key(" \"abc def\n\" ").unwrap(), "abcdef");
        assert!(sanitize_api_key("tökén").is_err());
    }

    #[test]
    fn secret_query_values_never_reach_the_curl_line() {
        let url = Url::parse("https://api.example.com/v1").unwrap();
        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_static("Bearer abc"));
        let query: Vec<(&str, Cow<'_, str>)> = vec![
            ("q", "rust".into()),
            ("Token", "hunter2".into()),
            ("client_secret", Cow::Owned("s3cr3t".to_string())),
        ];

        let redacted = redact_query(&query);
        assert_eq!(
            redacted,
            [
                ("q".to_string(), "rust".to_string()),
                ("Token".to_string(), "<redacted>".to_string()),
                ("client_secret".to_string(), "<redacted>".to_string()),
            ]
        );

        let curl = make_curl(&Method::POST, &url, &redacted, &h, Some(1));
        assert!(!curl.contains("abc"), "{curl}");
        assert!(!curl.contains("hunter2"), "{curl}");
        assert!(!curl.contains("s3cr3t"), "{curl}");
        assert!(curl.contains("q=rust"), "{curl}");
        assert!(curl.contains("(1 fields)"), "{curl}");
    }
}
