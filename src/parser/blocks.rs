use std::iter::FusedIterator;

use scraper::ElementRef;

use super::elements::{is_container, is_heading, is_query_paragraph};
use crate::error::ParseError;
use crate::text::{collapse_whitespace, truncate};

/// The three nodes making up one cited work.
#[derive(Debug, Clone, Copy)]
pub struct Citation<'a> {
    pub title: ElementRef<'a>,
    pub authors: ElementRef<'a>,
    pub blurb: ElementRef<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum Block<'a> {
    Citation(Citation<'a>),
    /// Paragraph naming the saved search. Always the last block.
    Query { node: ElementRef<'a> },
}

/// Pulls structural elements and groups them into blocks.
///
/// Grammar: `(heading container container)* query-paragraph`. The segmenter
/// stops after the query block or the first error.
pub struct BlockSegmenter<I> {
    nodes: I,
    done: bool,
}

impl<I> BlockSegmenter<I> {
    pub fn new(nodes: I) -> Self {
        Self { nodes, done: false }
    }
}

impl<'a, I> BlockSegmenter<I>
where
    I: Iterator<Item = ElementRef<'a>>,
{
    fn citation(&mut self, title: ElementRef<'a>) -> Result<Block<'a>, ParseError> {
        let authors = self.container("authors container after citation heading")?;
        let blurb = self.container("blurb container after authors")?;
        Ok(Block::Citation(Citation {
            title,
            authors,
            blurb,
        }))
    }

    fn container(&mut self, expected: &'static str) -> Result<ElementRef<'a>, ParseError> {
        match self.nodes.next() {
            Some(node) if is_container(node) => Ok(node),
            other => Err(ParseError::Structure {
                expected,
                found: describe(other),
            }),
        }
    }
}

impl<'a, I> Iterator for BlockSegmenter<I>
where
    I: Iterator<Item = ElementRef<'a>>,
{
    type Item = Result<Block<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(first) = self.nodes.next() else {
            self.done = true;
            return None;
        };

        let block = if is_heading(first) {
            self.citation(first)
        } else if is_query_paragraph(first) {
            self.done = true;
            Ok(Block::Query { node: first })
        } else {
            Err(ParseError::Structure {
                expected: "citation heading or query paragraph (unrecognized block opener)",
                found: describe(Some(first)),
            })
        };

        if block.is_err() {
            self.done = true;
        }
        Some(block)
    }
}

impl<'a, I> FusedIterator for BlockSegmenter<I> where I: Iterator<Item = ElementRef<'a>> {}

/// Drain a segmenter, requiring `Citation*, Query`.
pub fn segment<'a, I>(nodes: I) -> Result<(Vec<Citation<'a>>, ElementRef<'a>), ParseError>
where
    I: Iterator<Item = ElementRef<'a>>,
{
    let mut citations = Vec::new();
    for block in BlockSegmenter::new(nodes) {
        match block? {
            Block::Citation(citation) => citations.push(citation),
            Block::Query { node } => return Ok((citations, node)),
        }
    }
    Err(ParseError::Structure {
        expected: "query paragraph closing the alert",
        found: describe(None),
    })
}

/// Short human-readable form of a node for error messages.
pub(crate) fn describe(node: Option<ElementRef>) -> String {
    match node {
        Some(el) => {
            let text = collapse_whitespace(&el.text().collect::<String>());
            format!("<{}> {:?}", el.value().name(), truncate(&text, 60))
        }
        None => "end of content".to_string(),
    }
}
