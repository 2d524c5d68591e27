use std::iter::FusedIterator;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;

/// Class Scholar puts on the link inside each citation title.
const TITLE_MARKER: &str = "gse_alrt_title";

static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static H3: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static MARKED_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(&format!("a.{TITLE_MARKER}")).unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());

pub fn is_heading(el: ElementRef) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

pub fn is_container(el: ElementRef) -> bool {
    matches!(el.value().name(), "div" | "span")
}

pub fn is_paragraph(el: ElementRef) -> bool {
    el.value().name() == "p"
}

/// First `<a>` among the element's own children. Links nested deeper do not count.
pub fn direct_link(el: ElementRef) -> Option<ElementRef> {
    el.children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "a")
}

pub fn is_query_paragraph(el: ElementRef) -> bool {
    is_paragraph(el) && direct_link(el).is_some()
}

fn is_layout(el: ElementRef) -> bool {
    el.value().name() == "table" || el.select(&TABLE).next().is_some()
}

fn is_blank(el: ElementRef) -> bool {
    el.text().all(|t| t.trim().is_empty())
}

/// First citation heading: one carrying the title marker, else the first `h3`,
/// else any heading at all.
fn find_anchor(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&HEADINGS)
        .find(|h| h.select(&MARKED_TITLE).next().is_some())
        .or_else(|| doc.select(&H3).next())
        .or_else(|| doc.select(&HEADINGS).next())
}

fn next_element_sibling(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

/// Walks the sibling chain from the first citation heading, yielding the
/// elements that carry alert structure.
///
/// Text nodes, blank elements, layout tables and link-less paragraphs are
/// dropped. The stream ends after the first paragraph holding a direct link,
/// or when the sibling chain runs out.
#[derive(Debug, Clone)]
pub struct ElementStream<'a> {
    next: Option<ElementRef<'a>>,
}

impl<'a> ElementStream<'a> {
    pub fn new(doc: &'a Html) -> Result<Self, ParseError> {
        let anchor = find_anchor(doc).ok_or(ParseError::MissingAnchor)?;
        Ok(Self { next: Some(anchor) })
    }
}

impl<'a> Iterator for ElementStream<'a> {
    type Item = ElementRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.next.take() {
            self.next = next_element_sibling(current);

            if is_layout(current) || is_blank(current) {
                continue;
            }
            if is_paragraph(current) {
                if is_query_paragraph(current) {
                    self.next = None;
                    return Some(current);
                }
                // restatement of the query, not structure
                continue;
            }
            return Some(current);
        }
        None
    }
}

impl FusedIterator for ElementStream<'_> {}
