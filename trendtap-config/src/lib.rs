//! Loader for trendtap configuration with YAML + environment overlays.
//!
//! Sources are merged in order: YAML files / inline snippets, then
//! `TRENDTAP__`-prefixed environment variables (`TRENDTAP__INGEST__TOPIC`
//! overrides `ingest.topic`). After merging, `${VAR}` placeholders in string
//! values are expanded from the process environment and the result is
//! deserialized into [`TrendtapConfig`].
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use trendtap_common::observability::LogFormat;
use trendtap_social::twitter::ResultType;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "TRENDTAP";

#[derive(Debug, Deserialize)]
pub struct TrendtapConfig {
    #[serde(default, deserialize_with = "opt_string_like")]
    pub version: Option<String>,
    pub twitter: TwitterConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct TwitterConfig {
    #[serde(default, deserialize_with = "opt_string_like")]
    pub bearer_token: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub consumer_key: Option<String>,
    #[serde(default, deserialize_with = "opt_string_like")]
    pub consumer_secret: Option<String>,
    #[serde(default = "default_twitter_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// How the search client authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwitterCredentials<'a> {
    Bearer(&'a str),
    Consumer { key: &'a str, secret: &'a str },
}

impl TwitterConfig {
    /// Resolve the configured auth style; exactly one must be present.
    pub fn credentials(&self) -> Result<TwitterCredentials<'_>, ConfigError> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        match (
            present(&self.bearer_token),
            present(&self.consumer_key),
            present(&self.consumer_secret),
        ) {
            (Some(token), None, None) => Ok(TwitterCredentials::Bearer(token)),
            (None, Some(key), Some(secret)) => Ok(TwitterCredentials::Consumer { key, secret }),
            (None, None, None) => Err(ConfigError::Message(
                "twitter: set bearer_token or consumer_key + consumer_secret".into(),
            )),
            (Some(_), _, _) => Err(ConfigError::Message(
                "twitter: bearer_token and consumer credentials are mutually exclusive".into(),
            )),
            _ => Err(ConfigError::Message(
                "twitter: consumer_key and consumer_secret must be set together".into(),
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestConfig {
    #[serde(deserialize_with = "string_like")]
    pub topic: String,
    #[serde(default)]
    pub result_type: ResultType,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Opaque tag copied onto every record of the run.
    #[serde(default, deserialize_with = "string_like")]
    pub classification_code: String,
    #[serde(default = "default_rate_limit_buffer_secs")]
    pub rate_limit_buffer_secs: u64,
    #[serde(default)]
    pub max_items: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub stderr: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: default_log_format(),
            stderr: false,
            filter: default_log_filter(),
        }
    }
}

fn default_twitter_base_url() -> String {
    "https://api.twitter.com".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_collection() -> String {
    "tweets".into()
}
fn default_batch_size() -> u32 {
    100
}
fn default_rate_limit_buffer_secs() -> u64 {
    1
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}
fn default_log_filter() -> String {
    "info".into()
}

/// Accept scalars for string fields: YAML `classification_code: 1` and
/// environment overrides arrive as numbers.
fn string_like<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, got {other}"
        ))),
    }
}

fn opt_string_like<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Null => Ok(None),
        other => string_like(other).map(Some).map_err(serde::de::Error::custom),
    }
}

impl TrendtapConfig {
    /// Reject settings the ingestion loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.twitter.credentials()?;
        if self.ingest.topic.trim().is_empty() {
            return Err(ConfigError::Message("ingest.topic must not be empty".into()));
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Message(
                "ingest.batch_size must be greater than zero".into(),
            ));
        }
        if self.store.url.trim().is_empty() {
            return Err(ConfigError::Message("store.url must not be empty".into()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(ConfigError::Message(
                "store.collection must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct TrendtapConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for TrendtapConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendtapConfigLoader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Merge an inline YAML snippet (tests, CLI defaults).
    ///
    /// ```
    /// use trendtap_config::TrendtapConfigLoader;
    ///
    /// let cfg = TrendtapConfigLoader::new()
    ///     .with_yaml_str(
    ///         r##"
    /// twitter:
    ///   bearer_token: "example"
    /// store:
    ///   url: "sqlite::memory:"
    /// ingest:
    ///   topic: "#rustlang"
    /// "##,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.ingest.topic, "#rustlang");
    /// assert_eq!(cfg.ingest.batch_size, 100);
    /// assert_eq!(cfg.store.collection, "tweets");
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// Environment overrides are applied last so they win over every file.
    pub fn load(self) -> Result<TrendtapConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: TrendtapConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_placeholders_inside_nested_values() {
        temp_env::with_vars([("TT_USER", Some("svc")), ("TT_DB", Some("tweets"))], || {
            let mut v = json!({
                "store": { "url": "sqlite://~/${TT_USER}/${TT_DB}.db" },
                "tags": ["$TT_USER", 3, null]
            });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({
                    "store": { "url": "sqlite://~/svc/tweets.db" },
                    "tags": ["svc", 3, null]
                })
            );
        });
    }

    #[test]
    fn expansion_follows_references_between_variables() {
        temp_env::with_vars(
            [
                ("TT_INNER", Some("secret")),
                ("TT_OUTER", Some("bearer-${TT_INNER}")),
            ],
            || {
                let mut v = json!("${TT_OUTER}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("bearer-secret"));
            },
        );
    }

    #[test]
    fn expansion_terminates_on_cycles() {
        temp_env::with_vars([("TT_A", Some("${TT_B}")), ("TT_B", Some("${TT_A}"))], || {
            let mut v = json!("x=${TT_A}");
            expand_env_in_value(&mut v);
            assert!(v.as_str().unwrap().contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${TT_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${TT_DOES_NOT_EXIST}"));
    }

    fn twitter(bearer: Option<&str>, key: Option<&str>, secret: Option<&str>) -> TwitterConfig {
        TwitterConfig {
            bearer_token: bearer.map(str::to_string),
            consumer_key: key.map(str::to_string),
            consumer_secret: secret.map(str::to_string),
            base_url: default_twitter_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    #[test]
    fn credentials_require_exactly_one_style() {
        assert_eq!(
            twitter(Some("t"), None, None).credentials().unwrap(),
            TwitterCredentials::Bearer("t")
        );
        assert_eq!(
            twitter(None, Some("k"), Some("s")).credentials().unwrap(),
            TwitterCredentials::Consumer {
                key: "k",
                secret: "s"
            }
        );
        assert!(twitter(None, None, None).credentials().is_err());
        assert!(twitter(Some("t"), Some("k"), Some("s")).credentials().is_err());
        assert!(twitter(None, Some("k"), None).credentials().is_err());
        assert!(twitter(Some("  "), None, None).credentials().is_err());
    }
}
