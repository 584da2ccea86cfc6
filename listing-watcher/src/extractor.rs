use crate::types::{Extractor, ItemId, ItemRef, Result, WatcherError};
use regex::Regex;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.olx.pl";

/// Pulls offer cards out of a marketplace listing page.
///
/// The page is scanned, not parsed: the listing grid is located by its
/// `data-testid="listing-grid"` marker and every element tagged
/// `data-cy="l-card"` inside that element is one offer. The card's `id` attribute is the
/// offer id and its first `href` the offer link.
pub struct ListingCardExtractor {
    base_url: Url,
    grid_marker: Regex,
    any_tag: Regex,
    card_tag: Regex,
    id_attr: Regex,
    href_attr: Regex,
}

impl ListingCardExtractor {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| WatcherError::Config(format!("Invalid base URL {}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            grid_marker: compile(r#"data-testid\s*=\s*["']listing-grid["']"#)?,
            any_tag: compile(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)[^>]*>")?,
            card_tag: compile(r#"<[a-zA-Z][^>]*\sdata-cy\s*=\s*["']l-card["'][^>]*>"#)?,
            id_attr: compile(r#"\sid\s*=\s*["']([^"']*)["']"#)?,
            href_attr: compile(r#"\shref\s*=\s*["']([^"']*)["']"#)?,
        })
    }

    /// Byte range of the grid element's contents, given the marker position.
    /// An unclosed grid runs to the end of the document.
    fn grid_contents(&self, content: &str, marker_start: usize, marker_end: usize) -> (usize, usize) {
        let Some(open_start) = content[..marker_start].rfind('<') else {
            return (marker_end, content.len());
        };
        let Some(open) = self
            .any_tag
            .captures(&content[open_start..])
            .filter(|caps| caps.get(0).map(|m| m.start()) == Some(0) && caps[1].is_empty())
        else {
            return (marker_end, content.len());
        };

        let name = open[2].to_string();
        let body_start = open_start + open[0].len();
        let mut depth = 1usize;

        for caps in self.any_tag.captures_iter(&content[body_start..]) {
            if !caps[2].eq_ignore_ascii_case(&name) {
                continue;
            }
            let tag = &caps[0];
            if &caps[1] == "/" {
                depth -= 1;
                if depth == 0 {
                    let close_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                    return (body_start, body_start + close_start);
                }
            } else if !tag.ends_with("/>") {
                depth += 1;
            }
        }

        (body_start, content.len())
    }

    fn absolute_link(&self, href: &str) -> String {
        if href.starts_with("https://www.") {
            return href.to_string();
        }
        match self.base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base_url.as_str().trim_end_matches('/'), href),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| WatcherError::Config(format!("Invalid pattern {}: {}", pattern, e)))
}

impl Extractor for ListingCardExtractor {
    fn extract(&self, content: &str) -> anyhow::Result<Vec<ItemRef>> {
        let Some(grid) = self.grid_marker.find(content) else {
            debug!("Listing grid marker not found ({} bytes)", content.len());
            return Ok(Vec::new());
        };

        let (start, end) = self.grid_contents(content, grid.start(), grid.end());
        let listing = &content[start..end];
        let cards: Vec<_> = self.card_tag.find_iter(listing).collect();

        let mut items = Vec::with_capacity(cards.len());
        for (index, card) in cards.iter().enumerate() {
            let body_end = cards
                .get(index + 1)
                .map(|next| next.start())
                .unwrap_or(listing.len());
            let body = &listing[card.start()..body_end];

            let id = self
                .id_attr
                .captures(card.as_str())
                .and_then(|caps| caps[1].trim().parse::<u64>().ok())
                .map(ItemId::Number);

            let href = self
                .href_attr
                .captures(body)
                .map(|caps| caps[1].to_string())
                .unwrap_or_default();

            items.push(ItemRef {
                id,
                link: self.absolute_link(&href),
            });
        }

        debug!("Extracted {} cards", items.len());
        Ok(items)
    }
}
