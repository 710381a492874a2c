//! Extraction of lemma statistics from corpus search results

use crate::table::Record;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Position of the document count among the result statistics
const DOCS_IDX: usize = 2;

/// Position of the occurrence count among the result statistics
const OCCURRENCES_IDX: usize = 3;

/// Unexpected search result layouts
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A built-in CSS selector failed to parse
    #[error("invalid selector {0:?}")]
    InvalidSelector(Box<str>),

    /// Statistics were present, but not as many as expected
    #[error("found only {found} statistic(s) for {lemma:?}, expected at least four")]
    MissingStats { lemma: Box<str>, found: usize },
}

/// Reads lemma statistics out of a search results page
///
/// The page lists a handful of numbers, as `span.stat-number` elements
/// inside the `div.content` block, under a `p.found` summary. The third and
/// fourth of these are the number of documents and occurrences for the whole
/// corpus.
#[derive(Debug)]
pub struct StatsExtractor {
    content: Selector,
    found: Selector,
    stat_number: Selector,
}
//
impl StatsExtractor {
    /// Prepare the CSS selectors
    pub fn new() -> Result<Self, ExtractError> {
        Ok(Self {
            content: create_selector("div.content")?,
            found: create_selector("p.found")?,
            stat_number: create_selector("span.stat-number")?,
        })
    }

    /// Extract the statistics of `lemma` from a search results page
    ///
    /// A page without statistics is not an error: it means the corpus does
    /// not know this lemma, and yields a record without statistics.
    pub fn extract(&self, lemma: &str, body: &str) -> Result<Record, ExtractError> {
        let doc = Html::parse_document(body);
        if doc.select(&self.found).next().is_none() {
            log::debug!("No result summary in the response for {lemma:?}");
            return Ok(Record::no_data(lemma.into()));
        }

        for content in doc.select(&self.content) {
            let stats = content
                .select(&self.stat_number)
                .map(strip_separators)
                .collect::<Vec<_>>();
            if stats.is_empty() {
                continue;
            }
            log::trace!("Statistics for {lemma:?}: {stats:?}");
            if stats.len() <= OCCURRENCES_IDX {
                return Err(ExtractError::MissingStats {
                    lemma: lemma.into(),
                    found: stats.len(),
                });
            }
            let mut stats = stats.into_iter().skip(DOCS_IDX);
            return Ok(Record {
                lemma: lemma.into(),
                docs: stats.next(),
                occurrences: stats.next(),
            });
        }

        log::debug!("No statistics in the response for {lemma:?}");
        Ok(Record::no_data(lemma.into()))
    }
}

fn create_selector(sel_str: &str) -> Result<Selector, ExtractError> {
    Selector::parse(sel_str).map_err(|_| ExtractError::InvalidSelector(sel_str.into()))
}

/// Text of a statistic, without digit group separators
///
/// The corpus groups digits with (thin, no-break...) spaces, other sources
/// may use commas or apostrophes.
fn strip_separators(stat: ElementRef<'_>) -> Box<str> {
    stat.text()
        .flat_map(str::chars)
        .filter(|&c| !c.is_whitespace() && c != ',' && c != '\'')
        .collect::<String>()
        .into()
}
