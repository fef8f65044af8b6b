//! Resumable search over a paginated source.
//!
//! [`SearchCursor`] turns page-at-a-time [`SearchApi`] calls into an item
//! stream. Pagination state (buffer, `next_token`, exhaustion) lives in the
//! cursor, and a rate-limited page fetch leaves that state untouched, so the
//! next [`SearchCursor::next`] retries exactly the page that was refused.
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::twitter::SocialError;
use crate::twitter::extract::hydrate_authors;
use crate::twitter::types::{SearchResponse, Tweet};

/// Which slice of results the search should favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    #[default]
    Recent,
    Popular,
    Mixed,
}

impl ResultType {
    /// Value for the v2 `sort_order` parameter; `Mixed` leaves the API default.
    pub fn sort_order(self) -> Option<&'static str> {
        match self {
            ResultType::Recent => Some("recency"),
            ResultType::Popular => Some("relevancy"),
            ResultType::Mixed => None,
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultType::Recent => "recent",
            ResultType::Popular => "popular",
            ResultType::Mixed => "mixed",
        })
    }
}

impl FromStr for ResultType {
    type Err = SocialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" => Ok(ResultType::Recent),
            "popular" => Ok(ResultType::Popular),
            "mixed" => Ok(ResultType::Mixed),
            other => Err(SocialError::InvalidRequest(format!(
                "unknown result type `{other}` (expected recent, popular or mixed)"
            ))),
        }
    }
}

/// Parameters of one search, fixed for the lifetime of its cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub result_type: ResultType,
    pub batch_size: u32,
}

impl SearchRequest {
    pub fn new(
        query: impl Into<String>,
        result_type: ResultType,
        batch_size: u32,
    ) -> Result<Self, SocialError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(SocialError::InvalidRequest("query must not be empty".into()));
        }
        if batch_size == 0 {
            return Err(SocialError::InvalidRequest(
                "batch size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            query,
            result_type,
            batch_size,
        })
    }
}

/// Result of asking the source for one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Page(SearchResponse),
    RateLimited { reset_in: Duration },
}

/// Result of advancing a [`SearchCursor`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    Item(Tweet),
    RateLimited { reset_in: Duration },
    Exhausted,
}

/// Page-level access to a search source.
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetch the page identified by `next_token` (`None` = first page).
    ///
    /// A rate-limit refusal is an `Ok(PageOutcome::RateLimited)`, not an error.
    async fn search_page(
        &self,
        request: &SearchRequest,
        next_token: Option<&str>,
    ) -> Result<PageOutcome, SocialError>;
}

pub struct SearchCursor<'a, A: SearchApi + ?Sized> {
    api: &'a A,
    request: SearchRequest,
    buffer: VecDeque<Tweet>,
    next_token: Option<String>,
    exhausted: bool,
    pages: u64,
}

impl<'a, A: SearchApi + ?Sized> SearchCursor<'a, A> {
    pub fn new(api: &'a A, request: SearchRequest) -> Self {
        Self {
            api,
            request,
            buffer: VecDeque::new(),
            next_token: None,
            exhausted: false,
            pages: 0,
        }
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Continuation token of the page that will be fetched next.
    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    /// Advance the cursor by one item.
    pub async fn next(&mut self) -> Result<Fetch, SocialError> {
        loop {
            if let Some(tweet) = self.buffer.pop_front() {
                return Ok(Fetch::Item(tweet));
            }
            if self.exhausted {
                return Ok(Fetch::Exhausted);
            }

            let outcome = self
                .api
                .search_page(&self.request, self.next_token.as_deref())
                .await?;

            match outcome {
                PageOutcome::RateLimited { reset_in } => {
                    tracing::debug!(
                        query=%self.request.query,
                        next_token=?self.next_token,
                        reset_in_secs=reset_in.as_secs(),
                        "search.cursor.rate_limited"
                    );
                    return Ok(Fetch::RateLimited { reset_in });
                }
                PageOutcome::Page(resp) => {
                    self.pages += 1;
                    let next = resp.meta.as_ref().and_then(|m| m.next_token.clone());
                    let tweets = hydrate_authors(resp);
                    tracing::debug!(
                        query=%self.request.query,
                        page=self.pages,
                        items=tweets.len(),
                        has_next=next.is_some(),
                        "search.cursor.page"
                    );
                    self.buffer.extend(tweets);
                    match next {
                        Some(token) => self.next_token = Some(token),
                        None => self.exhausted = true,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves scripted outcomes and records the token of every call.
    struct Scripted {
        outcomes: Mutex<VecDeque<PageOutcome>>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<PageOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchApi for Scripted {
        async fn search_page(
            &self,
            _request: &SearchRequest,
            next_token: Option<&str>,
        ) -> Result<PageOutcome, SocialError> {
            self.calls.lock().unwrap().push(next_token.map(str::to_string));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SocialError::InvalidRequest("script exhausted".into()))
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> PageOutcome {
        let data: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "text": format!("t{id}"), "author_id": "u1" }))
            .collect();
        PageOutcome::Page(
            serde_json::from_value(json!({
                "data": data,
                "includes": { "users": [ { "id": "u1", "username": "a" } ] },
                "meta": { "next_token": next }
            }))
            .unwrap(),
        )
    }

    fn id(f: Fetch) -> String {
        match f {
            Fetch::Item(t) => t.id,
            other => panic!("expected item, got {other:?}"),
        }
    }

    fn request() -> SearchRequest {
        SearchRequest::new("#pappu", ResultType::Recent, 100).unwrap()
    }

    #[tokio::test]
    async fn walks_pages_until_no_next_token() {
        let api = Scripted::new(vec![page(&["1", "2"], Some("p2")), page(&["3"], None)]);
        let mut cursor = SearchCursor::new(&api, request());

        assert_eq!(id(cursor.next().await.unwrap()), "1");
        assert_eq!(id(cursor.next().await.unwrap()), "2");
        assert_eq!(id(cursor.next().await.unwrap()), "3");
        assert_eq!(cursor.next().await.unwrap(), Fetch::Exhausted);
        assert_eq!(cursor.next().await.unwrap(), Fetch::Exhausted);
        assert_eq!(cursor.pages_fetched(), 2);
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![None, Some("p2".to_string())]
        );
    }

    #[tokio::test]
    async fn rate_limit_keeps_the_continuation_token() {
        let api = Scripted::new(vec![
            page(&["1"], Some("p2")),
            PageOutcome::RateLimited {
                reset_in: Duration::from_secs(5),
            },
            page(&["2"], None),
        ]);
        let mut cursor = SearchCursor::new(&api, request());

        assert_eq!(id(cursor.next().await.unwrap()), "1");
        assert_eq!(
            cursor.next().await.unwrap(),
            Fetch::RateLimited {
                reset_in: Duration::from_secs(5)
            }
        );
        assert_eq!(cursor.next_token(), Some("p2"));
        assert_eq!(id(cursor.next().await.unwrap()), "2");
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p2".to_string())]
        );
    }

    #[tokio::test]
    async fn empty_pages_with_a_token_are_skipped() {
        let api = Scripted::new(vec![page(&[], Some("p2")), page(&["9"], None)]);
        let mut cursor = SearchCursor::new(&api, request());
        let first = id(cursor.next().await.unwrap());
        assert_eq!(first, "9");
    }

    #[test]
    fn result_type_parses_and_maps_to_sort_order() {
        assert_eq!("Popular".parse::<ResultType>().unwrap(), ResultType::Popular);
        assert_eq!(ResultType::Recent.sort_order(), Some("recency"));
        assert_eq!(ResultType::Mixed.sort_order(), None);
        assert!("trending".parse::<ResultType>().is_err());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(SearchRequest::new("#pappu", ResultType::Recent, 0).is_err());
        assert!(SearchRequest::new("  ", ResultType::Recent, 10).is_err());
    }
}
