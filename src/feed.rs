use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::fetch::Transport;

/// One page of the story feed.
#[derive(Debug, Deserialize)]
pub struct FeedPage {
    #[serde(rename = "_items")]
    pub items: Vec<Value>,
    #[serde(rename = "_links", default)]
    pub links: Option<PageLinks>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub prev: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: Option<String>,
}

impl FeedPage {
    /// The previous-page URL, if present and non-empty.
    pub fn prev_url(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.prev.as_ref())
            .and_then(|p| p.href.as_deref())
            .filter(|href| !href.is_empty())
    }
}

/// Fetch and parse a single feed page.
pub fn fetch_page(transport: &dyn Transport, url: &str) -> Result<FeedPage> {
    println!("Fetching items: {} ...", url.dimmed());
    let body = transport.get_json(url)?;
    let page = serde_json::from_value(body)
        .with_context(|| format!("Unexpected feed page layout at {}", url))?;
    Ok(page)
}

/// Walk the feed backwards from `start_url`, collecting every item.
///
/// Items keep their page order and in-page order. The walk stops when a page
/// has no previous link, when the link points back at the same page, or when
/// it leads to a page that was already fetched.
pub fn collect_items(transport: &dyn Transport, start_url: &str) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut visited = HashSet::new();
    let mut url = start_url.to_string();

    loop {
        let page = fetch_page(transport, &url)?;
        tracing::debug!(url = %url, count = page.items.len(), "fetched feed page");

        let prev = page.prev_url().map(str::to_string);
        items.extend(page.items);
        visited.insert(url.clone());

        match prev {
            Some(prev) if prev == url => break,
            Some(prev) if visited.contains(&prev) => {
                tracing::warn!(url = %prev, "feed links back to an earlier page; stopping");
                break;
            }
            Some(prev) => url = prev,
            None => break,
        }
    }

    tracing::info!(items = items.len(), pages = visited.len(), "collected feed");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fake::FakeTransport;
    use serde_json::json;

    fn page(ids: &[u32], prev: Option<&str>) -> Value {
        let items: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        match prev {
            Some(href) => json!({ "_items": items, "_links": { "prev": { "href": href } } }),
            None => json!({ "_items": items, "_links": {} }),
        }
    }

    fn ids(items: &[Value]) -> Vec<u64> {
        items.iter().filter_map(|i| i["id"].as_u64()).collect()
    }

    #[test]
    fn follows_prev_links_in_order() {
        let transport = FakeTransport::default()
            .with_page("https://feed/1", page(&[1, 2], Some("https://feed/2")))
            .with_page("https://feed/2", page(&[3], Some("https://feed/3")))
            .with_page("https://feed/3", page(&[4, 5], None));

        let items = collect_items(&transport, "https://feed/1").unwrap();

        assert_eq!(ids(&items), [1, 2, 3, 4, 5]);
        assert_eq!(
            *transport.requests.borrow(),
            ["https://feed/1", "https://feed/2", "https://feed/3"]
        );
    }

    #[test]
    fn stops_on_self_link() {
        let transport = FakeTransport::default()
            .with_page("https://feed/1", page(&[1], Some("https://feed/2")))
            .with_page("https://feed/2", page(&[2], Some("https://feed/2")));

        let items = collect_items(&transport, "https://feed/1").unwrap();

        assert_eq!(ids(&items), [1, 2]);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn stops_on_empty_or_null_link() {
        let transport = FakeTransport::default()
            .with_page("https://feed/a", page(&[1], Some("")))
            .with_page(
                "https://feed/b",
                json!({ "_items": [{ "id": 2 }], "_links": { "prev": { "href": null } } }),
            )
            .with_page("https://feed/c", json!({ "_items": [{ "id": 3 }] }));

        for url in ["https://feed/a", "https://feed/b", "https://feed/c"] {
            assert_eq!(collect_items(&transport, url).unwrap().len(), 1);
        }
        assert_eq!(transport.request_count(), 3);
    }

    #[test]
    fn stops_on_longer_cycles() {
        let transport = FakeTransport::default()
            .with_page("https://feed/1", page(&[1], Some("https://feed/2")))
            .with_page("https://feed/2", page(&[2], Some("https://feed/1")));

        let items = collect_items(&transport, "https://feed/1").unwrap();

        assert_eq!(ids(&items), [1, 2]);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn does_not_deduplicate_across_pages() {
        let transport = FakeTransport::default()
            .with_page("https://feed/1", page(&[7], Some("https://feed/2")))
            .with_page("https://feed/2", page(&[7], None));

        let items = collect_items(&transport, "https://feed/1").unwrap();
        assert_eq!(ids(&items), [7, 7]);
    }

    #[test]
    fn missing_items_is_fatal() {
        let transport =
            FakeTransport::default().with_page("https://feed/1", json!({ "items": [] }));
        assert!(collect_items(&transport, "https://feed/1").is_err());
    }

    #[test]
    fn fetch_failure_aborts_the_walk() {
        let transport = FakeTransport::default()
            .with_page("https://feed/1", page(&[1], Some("https://feed/missing")));
        let err = collect_items(&transport, "https://feed/1").unwrap_err();
        assert!(err.to_string().contains("https://feed/missing"));
    }
}
