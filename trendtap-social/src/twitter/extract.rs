use std::collections::HashMap;

use crate::twitter::types::{SearchResponse, Tweet, User};

/// Flatten a search page into tweets with `author` resolved from `includes.users`.
///
/// Tweets whose `author_id` has no matching user are returned with `author`
/// left empty; deciding whether that is acceptable is up to the consumer.
pub fn hydrate_authors(resp: SearchResponse) -> Vec<Tweet> {
    let SearchResponse { data, includes, .. } = resp;
    let users: HashMap<String, User> = includes
        .and_then(|inc| inc.users)
        .unwrap_or_default()
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    data.unwrap_or_default()
        .into_iter()
        .map(|mut tweet| {
            if tweet.author.is_none() {
                tweet.author = tweet
                    .author_id
                    .as_ref()
                    .and_then(|aid| users.get(aid))
                    .cloned();
            }
            tweet
        })
        .collect()
}

/// Canonical status URL; falls back to the handle-less form when the author is unknown.
pub fn status_url(tweet: &Tweet) -> String {
    match tweet.author.as_ref() {
        Some(u) => format!("https://x.com/{}/status/{}", u.username, tweet.id),
        None => format!("https://x.com/i/web/status/{}", tweet.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> SearchResponse {
        serde_json::from_value(json!({
            "data": [
                { "id": "1", "text": "a", "author_id": "u1" },
                { "id": "2", "text": "b", "author_id": "u9" }
            ],
            "includes": { "users": [ { "id": "u1", "username": "alice", "name": "Alice" } ] },
            "meta": { "result_count": 2, "next_token": "t2" }
        }))
        .unwrap()
    }

    #[test]
    fn authors_are_joined_by_id() {
        let tweets = hydrate_authors(page());
        assert_eq!(tweets.len(), 2);
        let alice = tweets[0].author.as_ref().unwrap();
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.name.as_deref(), Some("Alice"));
        assert!(tweets[1].author.is_none());
    }

    #[test]
    fn status_url_uses_handle_when_known() {
        let tweets = hydrate_authors(page());
        assert_eq!(status_url(&tweets[0]), "https://x.com/alice/status/1");
        assert_eq!(status_url(&tweets[1]), "https://x.com/i/web/status/2");
    }
}
