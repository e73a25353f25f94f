use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use rss::Channel;

use crate::error::PipelineError;

mod extract;

pub use extract::extract_text;

/// One entry of the target feed. `ordinal` is the reverse feed position
/// (oldest essay = 1), used for display ordering only.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedItem {
    pub link: String,
    pub title: String,
    pub ordinal: i32,
}

/// Read access to the blog: the feed listing and per-essay page text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn list_items(&self, feed_url: &str) -> Result<Vec<FeedItem>, PipelineError>;

    async fn fetch_text(&self, link: &str) -> Result<String, PipelineError>;
}

/// Production source: RSS channel over HTTP, page text via HTML extraction.
pub struct RssContent {
    http: Client,
}

impl RssContent {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }
}

impl Default for RssContent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for RssContent {
    async fn list_items(&self, feed_url: &str) -> Result<Vec<FeedItem>, PipelineError> {
        let bytes = self
            .http
            .get(feed_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| PipelineError::Fetch(e.into()))?
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(e.into()))?;

        let channel = Channel::read_from(&bytes[..]).map_err(|e| PipelineError::Fetch(e.into()))?;
        Ok(number_items(&channel))
    }

    async fn fetch_text(&self, link: &str) -> Result<String, PipelineError> {
        let html = self
            .http
            .get(link)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| PipelineError::Fetch(e.into()))?
            .text()
            .await
            .map_err(|e| PipelineError::Fetch(e.into()))?;

        extract_text(&html)
            .ok_or_else(|| PipelineError::Fetch(anyhow::anyhow!("no text extracted from {link}")))
    }
}

/// Items in feed order with reverse-position ordinals; entries without a link
/// are dropped.
fn number_items(channel: &Channel) -> Vec<FeedItem> {
    let count = channel.items().len() as i32;
    channel
        .items()
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            item.link().map(|link| FeedItem {
                link: link.to_string(),
                title: item.title().unwrap_or_default().to_string(),
                ordinal: count - i as i32,
            })
        })
        .collect()
}

/// Scripted content source for tests: fixed item list, per-link page text,
/// optional per-link failures, and a record of fetched links.
#[derive(Default)]
pub struct MockContent {
    items: Mutex<Vec<FeedItem>>,
    texts: Mutex<HashMap<String, String>>,
    failing: Mutex<HashMap<String, String>>,
    fetched: Mutex<Vec<String>>,
}

impl MockContent {
    pub fn new(items: Vec<FeedItem>) -> Self {
        Self { items: Mutex::new(items), ..Default::default() }
    }

    pub fn set_text(&self, link: &str, text: &str) {
        self.texts.lock().unwrap().insert(link.to_string(), text.to_string());
    }

    pub fn fail_fetch(&self, link: &str, message: &str) {
        self.failing.lock().unwrap().insert(link.to_string(), message.to_string());
    }

    pub fn fetched_links(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for MockContent {
    async fn list_items(&self, _feed_url: &str) -> Result<Vec<FeedItem>, PipelineError> {
        Ok(self.items.lock().unwrap().clone())
    }

    async fn fetch_text(&self, link: &str) -> Result<String, PipelineError> {
        self.fetched.lock().unwrap().push(link.to_string());
        if let Some(message) = self.failing.lock().unwrap().get(link) {
            return Err(PipelineError::Fetch(anyhow::anyhow!(message.clone())));
        }
        self.texts
            .lock()
            .unwrap()
            .get(link)
            .cloned()
            .ok_or_else(|| PipelineError::Fetch(anyhow::anyhow!("no text for {link}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_from(xml: &str) -> Channel {
        Channel::read_from(xml.as_bytes()).unwrap()
    }

    #[test]
    fn number_items_counts_down_from_newest() {
        let channel = channel_from(
            r#"<rss version="2.0"><channel><title>t</title><link>l</link><description>d</description>
            <item><link>http://e.com/c.html</link><title>C</title></item>
            <item><link>http://e.com/b.html</link><title>B</title></item>
            <item><link>http://e.com/a.html</link><title>A</title></item>
            </channel></rss>"#,
        );
        let items = number_items(&channel);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "C");
        assert_eq!(items[0].ordinal, 3);
        assert_eq!(items[2].title, "A");
        assert_eq!(items[2].ordinal, 1);
    }

    #[test]
    fn number_items_drops_linkless_entries() {
        let channel = channel_from(
            r#"<rss version="2.0"><channel><title>t</title><link>l</link><description>d</description>
            <item><title>no link</title></item>
            <item><link>http://e.com/a.html</link><title>A</title></item>
            </channel></rss>"#,
        );
        let items = number_items(&channel);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "http://e.com/a.html");
    }
}
