pub mod blocks;
pub mod elements;
pub mod fields;

use scraper::Html;

use crate::error::ParseError;
use blocks::segment;
use elements::ElementStream;
use fields::{query_text, ParsedAlert, PendingCitation};

/// Two-pass pipeline: html → structural elements → blocks → owned fields.
pub fn parse_alert(html: &str) -> Result<ParsedAlert, ParseError> {
    let doc = Html::parse_document(html);
    let (citations, query) = segment(ElementStream::new(&doc)?)?;
    let citations = citations
        .iter()
        .map(PendingCitation::from_block)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedAlert {
        query: query_text(query),
        citations,
    })
}
