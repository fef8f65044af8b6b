use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<Vec<Tweet>>,
    #[serde(default)]
    pub includes: Option<Includes>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Meta {
    #[serde(default)]
    pub result_count: Option<u32>,
    #[serde(default)]
    pub newest_id: Option<String>,
    #[serde(default)]
    pub oldest_id: Option<String>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Includes {
    #[serde(default)]
    pub users: Option<Vec<User>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One search result.
///
/// `author` is not part of the v2 tweet object; the client fills it in from
/// `includes.users`. Fields this struct does not model are kept in `extra`
/// so a tweet re-serializes without loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tweet {
    pub id: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_metrics: Option<PublicMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Entities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_tweets: Option<Vec<ReferencedTweet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possibly_sensitive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PublicMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweet_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<UrlEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<MentionEntity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<HashTag>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MentionEntity {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HashTag {
    pub tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let v = json!({
            "id": "1",
            "text": "hello",
            "author_id": "42",
            "edit_history_tweet_ids": ["1"],
            "public_metrics": { "like_count": 3, "retweet_count": 1 },
            "entities": { "hashtags": [{ "tag": "pappu" }] }
        });
        let tweet: Tweet = serde_json::from_value(v.clone()).unwrap();
        assert_eq!(tweet.extra.get("edit_history_tweet_ids"), Some(&json!(["1"])));
        assert_eq!(serde_json::to_value(&tweet).unwrap(), v);
    }

    #[test]
    fn empty_search_response_decodes() {
        let resp: SearchResponse =
            serde_json::from_value(json!({ "meta": { "result_count": 0 } })).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.meta.unwrap().result_count, Some(0));
    }
}
