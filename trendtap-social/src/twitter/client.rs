//! Minimal wrapper around the Twitter/X recent search API with trendtap defaults.
//!
//! Handles auth (a configured bearer token, or consumer credentials exchanged
//! for an app-only token), request parameter shaping and the translation of
//! 429 responses into [`PageOutcome::RateLimited`].
use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use trendtap_http::{Auth, HttpClient, HttpError, RequestOpts};

use crate::twitter::SocialError;
use crate::twitter::search::{PageOutcome, SearchApi, SearchRequest};
use crate::twitter::types::SearchResponse;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Wait applied when a 429 carries neither `x-rate-limit-reset` nor `Retry-After`.
/// Matches the length of a Twitter rate-limit window.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(15 * 60);

const SEARCH_PATH: &str = "2/tweets/search/recent";
const TOKEN_PATH: &str = "oauth2/token";
const MIN_PAGE: u32 = 10;
const MAX_PAGE: u32 = 100;
const TWEET_FIELDS: &str = "author_id,created_at,lang,entities,conversation_id,public_metrics,possibly_sensitive,referenced_tweets,in_reply_to_user_id";

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
    bearer: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

impl TwitterApi {
    /// Client against the public API using an existing bearer token.
    pub fn new(bearer_token: String) -> Result<Self, SocialError> {
        Ok(Self::from_http(HttpClient::new(DEFAULT_BASE_URL)?, bearer_token))
    }

    pub fn from_http(http: HttpClient, bearer_token: String) -> Self {
        Self {
            http,
            bearer: bearer_token,
        }
    }

    /// Exchange consumer credentials for an app-only bearer token, then build a client.
    pub async fn with_consumer_credentials(
        http: HttpClient,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<Self, SocialError> {
        let token = Self::obtain_app_token(&http, consumer_key, consumer_secret).await?;
        Ok(Self::from_http(http, token))
    }

    pub async fn obtain_app_token(
        http: &HttpClient,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<String, SocialError> {
        let resp: TokenResponse = http
            .post_form(
                TOKEN_PATH,
                &[("grant_type", "client_credentials")],
                RequestOpts {
                    auth: Some(Auth::Basic {
                        username: consumer_key,
                        password: consumer_secret,
                    }),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await?;

        if !resp.token_type.eq_ignore_ascii_case("bearer") {
            return Err(SocialError::Auth(format!(
                "unexpected token type `{}`",
                resp.token_type
            )));
        }
        if resp.access_token.trim().is_empty() {
            return Err(SocialError::Auth("empty access token".into()));
        }
        tracing::info!("twitter.auth.app_token_obtained");
        Ok(resp.access_token)
    }

    /// Fetch one page of recent-search results.
    pub async fn recent_search(
        &self,
        request: &SearchRequest,
        next_token: Option<&str>,
    ) -> Result<SearchResponse, SocialError> {
        let max_results = request.batch_size.clamp(MIN_PAGE, MAX_PAGE);
        if max_results != request.batch_size {
            tracing::debug!(
                requested = request.batch_size,
                max_results,
                "twitter.search.batch_size_clamped"
            );
        }

        let mut params: Vec<(&str, Cow<'_, str>)> = vec![
            ("query", request.query.as_str().into()),
            ("max_results", max_results.to_string().into()),
            ("tweet.fields", TWEET_FIELDS.into()),
            ("expansions", "author_id".into()),
            ("user.fields", "username,name".into()),
        ];
        if let Some(order) = request.result_type.sort_order() {
            params.push(("sort_order", order.into()));
        }
        if let Some(token) = next_token {
            params.push(("next_token", token.into()));
        }

        let resp: SearchResponse = self
            .http
            .get_json(
                SEARCH_PATH,
                RequestOpts {
                    auth: Some(Auth::Bearer(&self.bearer)),
                    query: Some(params),
                    ..Default::default()
                },
            )
            .await?;

        tracing::debug!(
            query=%request.query,
            result_count=?resp.meta.as_ref().and_then(|m| m.result_count),
            "twitter.search.page"
        );
        Ok(resp)
    }
}

#[async_trait]
impl SearchApi for TwitterApi {
    async fn search_page(
        &self,
        request: &SearchRequest,
        next_token: Option<&str>,
    ) -> Result<PageOutcome, SocialError> {
        match self.recent_search(request, next_token).await {
            Ok(resp) => Ok(PageOutcome::Page(resp)),
            Err(SocialError::Http(HttpError::RateLimited { reset_in, .. })) => {
                Ok(PageOutcome::RateLimited {
                    reset_in: reset_in.unwrap_or(DEFAULT_RATE_LIMIT_WINDOW),
                })
            }
            Err(e) => Err(e),
        }
    }
}
