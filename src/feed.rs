//! Feed resolution
//!
//! Wraps the RSS/Atom parsing collaborators: given a feed URL, produces an
//! ordered sequence of [`FeedItem`]. Supports both RSS 2.0 and Atom, trying
//! RSS first and falling back to Atom. No retry logic lives here — a feed
//! that cannot be fetched or parsed aborts only that feed's sync pass.

use crate::error::{Error, Result};
use crate::types::FeedItem;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

/// Fetches and parses remote feeds into item sequences
pub struct FeedReader {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedReader {
    /// Create a feed reader with the given HTTP client and timeout
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetch a feed URL and return its items in document order.
    ///
    /// Items without an enclosure are kept here; the orchestrator filters
    /// them out. An empty feed is a legal outcome, not an error.
    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        debug!(url, "fetching feed");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::FeedUnavailable {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FeedUnavailable {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let content = response
            .text()
            .await
            .map_err(|e| Error::FeedUnavailable {
                url: url.to_string(),
                reason: format!("failed to read body: {e}"),
            })?;

        // Try RSS first, then Atom
        match parse_as_rss(&content) {
            Ok(items) => {
                debug!(url, items = items.len(), "parsed as RSS");
                Ok(items)
            }
            Err(rss_err) => match parse_as_atom(&content) {
                Ok(items) => {
                    debug!(url, items = items.len(), "parsed as Atom");
                    Ok(items)
                }
                Err(atom_err) => Err(Error::FeedUnavailable {
                    url: url.to_string(),
                    reason: format!(
                        "not parseable as RSS ({rss_err}) or Atom ({atom_err})"
                    ),
                }),
            },
        }
    }
}

/// Parse feed content as RSS 2.0
fn parse_as_rss(content: &str) -> std::result::Result<Vec<FeedItem>, String> {
    let channel = content
        .parse::<rss::Channel>()
        .map_err(|e| e.to_string())?;

    let items = channel
        .items()
        .iter()
        .map(|item| {
            let enclosure_url = item
                .enclosure()
                .map(|enc| enc.url().to_string())
                .unwrap_or_default();

            let declared_length = item
                .enclosure()
                .and_then(|enc| enc.length().parse::<u64>().ok())
                .filter(|len| *len > 0);

            let published_at = item.pub_date().and_then(|date_str| {
                chrono::DateTime::parse_from_rfc2822(date_str)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            });

            FeedItem {
                title: item.title().unwrap_or("").to_string(),
                enclosure_url,
                declared_length,
                published_at,
            }
        })
        .collect();

    Ok(items)
}

/// Parse feed content as Atom
fn parse_as_atom(content: &str) -> std::result::Result<Vec<FeedItem>, String> {
    let feed =
        atom_syndication::Feed::read_from(content.as_bytes()).map_err(|e| e.to_string())?;

    let items = feed
        .entries()
        .iter()
        .map(|entry| {
            // Enclosure-rel links carry the payload in Atom
            let enclosure = entry.links().iter().find(|link| link.rel() == "enclosure");

            let enclosure_url = enclosure
                .map(|link| link.href().to_string())
                .unwrap_or_default();

            let declared_length = enclosure
                .and_then(|link| link.length())
                .and_then(|l| l.parse::<u64>().ok())
                .filter(|len| *len > 0);

            // Prefer published, fall back to updated
            let published_at = entry
                .published()
                .copied()
                .or_else(|| Some(*entry.updated()))
                .map(|dt| dt.with_timezone(&Utc));

            FeedItem {
                title: entry.title().as_str().to_string(),
                enclosure_url,
                declared_length,
                published_at,
            }
        })
        .collect();

    Ok(items)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com</link>
    <description>test</description>
    <item>
      <title>Episode One 230615</title>
      <pubDate>Thu, 15 Jun 2023 06:00:00 GMT</pubDate>
      <enclosure url="https://example.com/ep1.mp3" length="1000000" type="audio/mpeg"/>
    </item>
    <item>
      <title>No Enclosure Here</title>
      <pubDate>Fri, 16 Jun 2023 06:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Zero Length</title>
      <enclosure url="https://example.com/ep3.mp3" length="0" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test</title>
  <id>urn:uuid:feed</id>
  <updated>2023-06-16T06:00:00Z</updated>
  <entry>
    <title>Atom Episode</title>
    <id>urn:uuid:ep1</id>
    <updated>2023-06-16T06:00:00Z</updated>
    <published>2023-06-15T06:00:00Z</published>
    <link rel="enclosure" href="https://example.com/atom1.mp3" length="2048"/>
  </entry>
</feed>"#;

    #[test]
    fn rss_items_map_title_url_length_and_date() {
        let items = parse_as_rss(RSS_SAMPLE).unwrap();
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].title, "Episode One 230615");
        assert_eq!(items[0].enclosure_url, "https://example.com/ep1.mp3");
        assert_eq!(items[0].declared_length, Some(1_000_000));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn rss_item_without_enclosure_has_empty_url() {
        let items = parse_as_rss(RSS_SAMPLE).unwrap();
        assert!(items[1].enclosure_url.is_empty());
        assert_eq!(items[1].declared_length, None);
    }

    #[test]
    fn rss_zero_length_maps_to_none() {
        let items = parse_as_rss(RSS_SAMPLE).unwrap();
        assert_eq!(items[2].enclosure_url, "https://example.com/ep3.mp3");
        assert_eq!(items[2].declared_length, None);
    }

    #[test]
    fn atom_entries_use_enclosure_rel_links() {
        let items = parse_as_atom(ATOM_SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom Episode");
        assert_eq!(items[0].enclosure_url, "https://example.com/atom1.mp3");
        assert_eq!(items[0].declared_length, Some(2048));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn garbage_parses_as_neither_format() {
        assert!(parse_as_rss("not xml at all").is_err());
        assert!(parse_as_atom("not xml at all").is_err());
    }

    #[tokio::test]
    async fn fetch_maps_transport_failure_to_feed_unavailable() {
        let reader = FeedReader::new(reqwest::Client::new(), Duration::from_millis(100));
        let err = reader.fetch("http://127.0.0.1:1/feed.xml").await.unwrap_err();
        assert!(matches!(err, Error::FeedUnavailable { .. }));
    }
}
