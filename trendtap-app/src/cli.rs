use std::path::PathBuf;

use clap::Parser;
use trendtap_config::TrendtapConfig;
use trendtap_social::twitter::ResultType;

/// Poll a social search for a topic and store every result.
#[derive(Debug, Parser)]
#[command(name = "trendtap", version, about)]
pub struct Args {
    /// YAML config file.
    #[arg(short, long, env = "TRENDTAP_CONFIG", default_value = "trendtap.yaml")]
    pub config: PathBuf,

    /// Search query / topic tag; overrides `ingest.topic`.
    #[arg(short, long)]
    pub topic: Option<String>,

    #[arg(long, value_parser = parse_result_type)]
    pub result_type: Option<ResultType>,

    #[arg(long)]
    pub batch_size: Option<u32>,

    #[arg(long)]
    pub classification_code: Option<String>,

    /// Stop after this many items.
    #[arg(long)]
    pub max_items: Option<u64>,

    /// Mirror logs to stderr.
    #[arg(long)]
    pub log_stderr: bool,
}

fn parse_result_type(raw: &str) -> Result<ResultType, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

impl Args {
    /// Command-line values win over the loaded config.
    pub fn apply(&self, cfg: &mut TrendtapConfig) {
        if let Some(topic) = &self.topic {
            cfg.ingest.topic = topic.clone();
        }
        if let Some(rt) = self.result_type {
            cfg.ingest.result_type = rt;
        }
        if let Some(n) = self.batch_size {
            cfg.ingest.batch_size = n;
        }
        if let Some(code) = &self.classification_code {
            cfg.ingest.classification_code = code.clone();
        }
        if self.max_items.is_some() {
            cfg.ingest.max_items = self.max_items;
        }
        if self.log_stderr {
            cfg.logging.stderr = true;
        }
    }
}
