use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use trendtap_config::{TrendtapConfig, TwitterCredentials};
use trendtap_http::HttpClient;
use trendtap_ingest::{IngestLoop, IngestQuery, IngestSettings};
use trendtap_social::twitter::TwitterApi;
use trendtap_store::{connect, SqliteCollection};

pub type Ingest = IngestLoop<TwitterApi, SqliteCollection>;

/// Wire the search client and the collection described by `cfg`.
pub async fn build_from_config(cfg: &TrendtapConfig) -> Result<Ingest> {
    let api = build_search_client(cfg).await?;

    let pool = connect(&cfg.store.url)
        .await
        .with_context(|| format!("failed to open store at {}", cfg.store.url))?;
    let collection = SqliteCollection::open(pool, &cfg.store.collection)
        .await
        .with_context(|| format!("failed to open collection `{}`", cfg.store.collection))?;
    let existing = collection.count().await?;
    info!(
        collection = %cfg.store.collection,
        existing,
        "store.collection.ready"
    );

    Ok(IngestLoop::new(api, collection, settings(cfg)))
}

async fn build_search_client(cfg: &TrendtapConfig) -> Result<TwitterApi> {
    let tw = &cfg.twitter;
    let http = HttpClient::new(&tw.base_url)
        .with_context(|| format!("invalid twitter base_url {}", tw.base_url))?
        .with_timeout(tw.request_timeout());

    let api = match tw.credentials()? {
        TwitterCredentials::Bearer(token) => TwitterApi::from_http(http, token.to_string()),
        TwitterCredentials::Consumer { key, secret } => {
            TwitterApi::with_consumer_credentials(http, key, secret)
                .await
                .context("failed to exchange consumer credentials for a bearer token")?
        }
    };
    Ok(api)
}

pub fn settings(cfg: &TrendtapConfig) -> IngestSettings {
    IngestSettings {
        rate_limit_buffer: Duration::from_secs(cfg.ingest.rate_limit_buffer_secs),
        max_items: cfg.ingest.max_items,
    }
}

pub fn query(cfg: &TrendtapConfig) -> IngestQuery {
    IngestQuery {
        topic: cfg.ingest.topic.clone(),
        result_type: cfg.ingest.result_type,
        batch_size: cfg.ingest.batch_size,
        classification_code: cfg.ingest.classification_code.clone(),
    }
}
