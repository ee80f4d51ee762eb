use anyhow::{Context, Result, anyhow};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::model::{AnnexRecord, ArticleRecord, ChapterRecord, RecitalRecord, SkippedNode};

use super::normalize::{element_text, normalize_content};
use super::numbering::{
    annex_ordinal, chapter_ordinal, parse_annex_heading, parse_article_number,
    parse_chapter_label, parse_recital_marker,
};

const ARTICLE_NODE_CSS: &str = r#".eli-subdivision[id^="art_"]"#;
const CHAPTER_NODE_CSS: &str = r#".eli-subdivision[id^="cpt_"]"#;
const CHAPTER_HEADING_CSS: &str = ".oj-ti-grseq";
const CHAPTER_TITLE_CSS: &str = ".eli-title";
const ARTICLE_TITLE_CSS: &str = ".oj-sti-art";
const PARAGRAPH_CSS: &str = ".oj-normal";
const ANNEX_NODE_CSS: &str = r#"[id^="anx_"]"#;
const ANNEX_HEADING_CSS: &str = ".oj-doc-ti";
const PREAMBLE_PARAGRAPH_CSS: &str = "p";
const TABLE_CSS: &str = "table";
const TABLE_CELL_CSS: &str = "td";

const RECITALS_INTRO: &str = "considérant ce qui suit";
const RECITAL_MARKER_PATTERN: &str = r"^\((?P<number>\d+)\)";
const ANNEX_HEADING_PATTERN: &str =
    r"^ANNEXE\s+(?P<label>[IVXLCDM]+)\b(?:\s*[-–]\s*(?P<title>.+))?";

/// CSS selectors and heading patterns for the EUR-Lex node-tagging
/// conventions, compiled once per run.
pub(crate) struct DocumentSelectors {
    article: Selector,
    chapter: Selector,
    chapter_heading: Selector,
    chapter_title: Selector,
    article_title: Selector,
    paragraph: Selector,
    annex: Selector,
    annex_heading: Selector,
    preamble_paragraph: Selector,
    table: Selector,
    table_cell: Selector,
    recital_marker: Regex,
    annex_heading_pattern: Regex,
}

impl DocumentSelectors {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            article: compile_selector(ARTICLE_NODE_CSS)?,
            chapter: compile_selector(CHAPTER_NODE_CSS)?,
            chapter_heading: compile_selector(CHAPTER_HEADING_CSS)?,
            chapter_title: compile_selector(CHAPTER_TITLE_CSS)?,
            article_title: compile_selector(ARTICLE_TITLE_CSS)?,
            paragraph: compile_selector(PARAGRAPH_CSS)?,
            annex: compile_selector(ANNEX_NODE_CSS)?,
            annex_heading: compile_selector(ANNEX_HEADING_CSS)?,
            preamble_paragraph: compile_selector(PREAMBLE_PARAGRAPH_CSS)?,
            table: compile_selector(TABLE_CSS)?,
            table_cell: compile_selector(TABLE_CELL_CSS)?,
            recital_marker: Regex::new(RECITAL_MARKER_PATTERN)
                .context("failed to compile recital marker regex")?,
            annex_heading_pattern: Regex::new(ANNEX_HEADING_PATTERN)
                .context("failed to compile annex heading regex")?,
        })
    }
}

fn compile_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("failed to compile selector {css}: {err:?}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ArticleOutcome {
    Record(ArticleRecord),
    Skipped(SkippedNode),
}

#[derive(Debug, Default)]
pub(crate) struct ArticleScan {
    pub(crate) records: Vec<ArticleRecord>,
    pub(crate) skipped: Vec<SkippedNode>,
}

impl ArticleScan {
    pub(crate) fn found(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}

pub(crate) fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

/// Article records in document order. Nodes whose identifier does not parse
/// are left out.
pub(crate) fn extract_articles(
    document: &Html,
    selectors: &DocumentSelectors,
) -> Vec<ArticleRecord> {
    scan_articles(document, selectors).records
}

pub(crate) fn scan_articles(document: &Html, selectors: &DocumentSelectors) -> ArticleScan {
    let mut scan = ArticleScan::default();

    for node in document.select(&selectors.article) {
        match extract_article(node, selectors) {
            ArticleOutcome::Record(record) => scan.records.push(record),
            ArticleOutcome::Skipped(skipped) => scan.skipped.push(skipped),
        }
    }

    scan
}

pub(crate) fn extract_article(
    node: ElementRef<'_>,
    selectors: &DocumentSelectors,
) -> ArticleOutcome {
    let Some(node_id) = node.value().id() else {
        return ArticleOutcome::Skipped(SkippedNode {
            node_id: String::new(),
            reason: "article node has no structural id".to_string(),
        });
    };

    let number = match parse_article_number(node_id) {
        Ok(number) => number,
        Err(err) => {
            return ArticleOutcome::Skipped(SkippedNode {
                node_id: node_id.to_string(),
                reason: err.to_string(),
            });
        }
    };

    let title = node
        .select(&selectors.article_title)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let content = normalize_content(
        node.select(&selectors.paragraph)
            .map(|paragraph| paragraph.text().collect::<String>()),
    );

    ArticleOutcome::Record(ArticleRecord {
        number,
        title,
        content,
        chapter_id: resolve_chapter_id(node, selectors),
        section_id: resolve_section_id(node),
    })
}

/// Walks parent links upward from `element`, never testing `element` itself,
/// and returns the first ancestor accepted by `predicate`.
pub(crate) fn nearest_ancestor<'a, F>(
    element: ElementRef<'a>,
    predicate: F,
) -> Option<ElementRef<'a>>
where
    F: Fn(&ElementRef<'a>) -> bool,
{
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| predicate(ancestor))
}

fn resolve_chapter_id(node: ElementRef<'_>, selectors: &DocumentSelectors) -> Option<String> {
    let chapter = nearest_ancestor(node, |ancestor| selectors.chapter.matches(ancestor))?;
    let heading = chapter.select(&selectors.chapter_heading).next()?;
    Some(parse_chapter_label(&element_text(heading)))
}

/// Section ancestry is not resolved yet; articles always carry no section.
pub(crate) fn resolve_section_id(_node: ElementRef<'_>) -> Option<String> {
    None
}

/// Every chapter node that carries a heading, in document order.
pub(crate) fn extract_chapters(
    document: &Html,
    selectors: &DocumentSelectors,
) -> Vec<ChapterRecord> {
    document
        .select(&selectors.chapter)
        .filter_map(|chapter| {
            let heading = element_text(chapter.select(&selectors.chapter_heading).next()?);
            let label = parse_chapter_label(&heading);
            let title = chapter
                .children()
                .filter_map(ElementRef::wrap)
                .find(|child| selectors.chapter_title.matches(child))
                .map(element_text)
                .unwrap_or_default();

            Some(ChapterRecord {
                ordinal: chapter_ordinal(&label),
                label,
                heading,
                title,
            })
        })
        .collect()
}

/// Numbered recitals of the preamble, in document order.
///
/// The recitals follow the paragraph announcing them ("considérant ce qui
/// suit"). Each one is a two-cell table: the `(n)` marker, then the text. A
/// table whose first cell carries no marker continues the previous recital.
/// A document without the announcing paragraph has no recitals.
pub(crate) fn extract_recitals(
    document: &Html,
    selectors: &DocumentSelectors,
) -> Vec<RecitalRecord> {
    let Some(intro) = document
        .select(&selectors.preamble_paragraph)
        .find(|paragraph| paragraph.text().collect::<String>().contains(RECITALS_INTRO))
    else {
        return Vec::new();
    };

    let Some(preamble) = nearest_ancestor(intro, |ancestor| {
        ancestor.select(&selectors.table).next().is_some()
    }) else {
        return Vec::new();
    };

    let mut recitals = Vec::new();
    let mut current: Option<(u32, Vec<String>)> = None;

    for table in preamble.select(&selectors.table) {
        let cells = table.select(&selectors.table_cell).collect::<Vec<ElementRef<'_>>>();
        let [first, .., last] = cells.as_slice() else {
            continue;
        };

        let fragments = last
            .select(&selectors.preamble_paragraph)
            .map(|paragraph| paragraph.text().collect::<String>())
            .filter(|fragment| !fragment.trim().is_empty())
            .collect::<Vec<String>>();

        match parse_recital_marker(&element_text(*first), &selectors.recital_marker) {
            Some(number) => {
                if let Some(finished) = current.replace((number, fragments)) {
                    recitals.push(finish_recital(finished));
                }
            }
            None => {
                if let Some((_, body)) = current.as_mut() {
                    body.extend(fragments);
                }
            }
        }
    }

    if let Some(finished) = current {
        recitals.push(finish_recital(finished));
    }

    recitals
}

fn finish_recital((number, fragments): (u32, Vec<String>)) -> RecitalRecord {
    RecitalRecord {
        number,
        content: normalize_content(fragments),
    }
}

/// Annexes in document order. Only top-level `anx_` nodes count, nested
/// identifiers such as `anx_III.pnt_1` belong to their annex. Nodes without an
/// `ANNEXE <roman>` heading or without body text are left out.
pub(crate) fn extract_annexes(
    document: &Html,
    selectors: &DocumentSelectors,
) -> Vec<AnnexRecord> {
    document
        .select(&selectors.annex)
        .filter(|node| node.value().id().is_some_and(|id| !id.contains('.')))
        .filter_map(|node| extract_annex(node, selectors))
        .collect()
}

fn extract_annex(node: ElementRef<'_>, selectors: &DocumentSelectors) -> Option<AnnexRecord> {
    let mut headings = node.select(&selectors.annex_heading).map(element_text);
    let heading = headings.next()?;
    let (label, inline_title) = parse_annex_heading(&heading, &selectors.annex_heading_pattern)?;
    let title = inline_title
        .or_else(|| headings.next())
        .unwrap_or_default();

    let content = normalize_content(
        node.select(&selectors.paragraph)
            .map(|paragraph| paragraph.text().collect::<String>())
            .filter(|fragment| !fragment.trim().is_empty()),
    );
    if content.is_empty() {
        return None;
    }

    Some(AnnexRecord {
        ordinal: annex_ordinal(&label),
        label,
        title,
        content,
    })
}
