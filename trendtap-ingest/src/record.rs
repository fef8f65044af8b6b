use serde::Serialize;
use thiserror::Error;
use trendtap_social::twitter::types::Tweet;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed item (id={id:?}): {reason}")]
    Malformed { id: String, reason: &'static str },
    #[error("failed to serialize raw item: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The persisted form of one search result.
///
/// Built only through [`to_record`], so every instance has a non-empty id and
/// a fully populated author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedRecord {
    raw: String,
    id: String,
    text: String,
    topic: String,
    classification_code: String,
    author_id: String,
    author_handle: String,
}

impl IngestedRecord {
    /// The source item as the API returned it, serialized as JSON. The
    /// author joined in from `includes.users` is left out.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn classification_code(&self) -> &str {
        &self.classification_code
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn author_handle(&self) -> &str {
        &self.author_handle
    }
}

/// Map one tweet plus the run's tags onto an [`IngestedRecord`].
///
/// `classification_code` is copied through untouched.
pub fn to_record(
    item: &Tweet,
    topic: &str,
    classification_code: &str,
) -> Result<IngestedRecord, TransformError> {
    let malformed = |reason| TransformError::Malformed {
        id: item.id.clone(),
        reason,
    };

    if item.id.is_empty() {
        return Err(malformed("missing id"));
    }
    let author = item.author.as_ref().ok_or_else(|| malformed("missing author"))?;
    if author.id.is_empty() {
        return Err(malformed("missing author id"));
    }
    if author.username.is_empty() {
        return Err(malformed("missing author handle"));
    }

    let source_item = Tweet {
        author: None,
        ..item.clone()
    };

    Ok(IngestedRecord {
        raw: serde_json::to_string(&source_item)?,
        id: item.id.clone(),
        text: item.text.clone(),
        topic: topic.to_string(),
        classification_code: classification_code.to_string(),
        author_id: author.id.clone(),
        author_handle: author.username.clone(),
    })
}
