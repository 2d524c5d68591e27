use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::blocks::{describe, Citation};
use super::elements::direct_link;
use crate::error::ParseError;
use crate::text::collapse_whitespace;

static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// A citation with every field pulled out of the document, URL still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCitation {
    pub title: String,
    pub tracking_url: String,
    pub authors: String,
    pub blurb: String,
}

/// Everything a record needs from one alert body. Owns its data so the
/// document tree can be dropped before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAlert {
    pub query: String,
    pub citations: Vec<PendingCitation>,
}

fn text_of(el: ElementRef) -> String {
    el.text().collect()
}

/// Link text of the query paragraph, trimmed, with the `[...]` decoration removed.
pub fn query_text(node: ElementRef) -> String {
    let text = direct_link(node).map_or_else(|| text_of(node), text_of);
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    trimmed.strip_suffix(']').unwrap_or(trimmed).to_string()
}

impl PendingCitation {
    pub fn from_block(citation: &Citation) -> Result<Self, ParseError> {
        let link = citation
            .title
            .select(&LINK)
            .next()
            .ok_or_else(|| ParseError::Structure {
                expected: "link inside citation heading",
                found: describe(Some(citation.title)),
            })?;
        let href = link.value().attr("href").ok_or_else(|| ParseError::Structure {
            expected: "href on citation title link",
            found: describe(Some(link)),
        })?;

        Ok(Self {
            title: collapse_whitespace(&text_of(link)),
            tracking_url: href.to_string(),
            authors: text_of(citation.authors),
            blurb: collapse_whitespace(&text_of(citation.blurb)),
        })
    }
}
