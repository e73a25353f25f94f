use std::collections::HashSet;
use std::env;

use anyhow::{anyhow, Result};

const DEFAULT_FEED_URL: &str = "http://www.aaronsw.com/2002/feeds/pgessays.rss";
const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_QUESTION_MAX_CHARS: usize = 200;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

// The one feed entry that is not an essay; permanently excluded by id.
const DEFAULT_EXCLUDED_IDS: &str = "1638975042";

/// Process-wide configuration, built once at startup and passed by reference
/// into each component constructor.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub feed_url: String,
    pub server_addr: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_summary_model: String,
    pub openai_answer_model: String,
    pub question_max_chars: usize,
    pub excluded_ids: HashSet<String>,
}

impl AppConfig {
    /// Load from environment variables (a `.env` file is honored by the
    /// caller via dotenvy before this runs).
    pub fn from_env(dsn_override: Option<String>) -> Result<Self> {
        let database_url = dsn_override
            .or_else(|| env::var("DATABASE_URL").ok())
            .ok_or_else(|| anyhow!("provide --dsn or set DATABASE_URL"))?;

        let feed_url = env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());
        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        let openai_base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
        let openai_summary_model = env::var("OPENAI_SUMMARY_MODEL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
        let openai_answer_model = env::var("OPENAI_ANSWER_MODEL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());

        let question_max_chars = env::var("QUESTION_MAX_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_QUESTION_MAX_CHARS);

        let excluded_ids = parse_excluded(
            &env::var("EXCLUDED_IDS").unwrap_or_else(|_| DEFAULT_EXCLUDED_IDS.to_string()),
        );

        Ok(Self {
            database_url,
            feed_url,
            server_addr,
            openai_api_key,
            openai_base_url,
            openai_summary_model,
            openai_answer_model,
            question_max_chars,
            excluded_ids,
        })
    }
}

fn parse_excluded(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_excluded_splits_and_trims() {
        let set = parse_excluded("1638975042, foo ,,bar");
        assert_eq!(set.len(), 3);
        assert!(set.contains("1638975042"));
        assert!(set.contains("foo"));
        assert!(set.contains("bar"));
    }

    #[test]
    fn parse_excluded_empty_input_is_empty_set() {
        assert!(parse_excluded("").is_empty());
    }
}
