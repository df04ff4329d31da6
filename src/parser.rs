//! Result extraction from the portal's HTML.
//!
//! Parsing degrades gracefully as structure degrades.  Tier 1 walks the
//! results table; Tier 2 falls back to pattern extraction over the raw page
//! text and is only entered when Tier 1 finds zero data rows; a page that
//! matches neither tier is reported as unrecognized rather than as a false
//! empty result.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::types::{
    CaseRecord, DocumentLink, FIELD_UNAVAILABLE, OrderEntry, OrdersPage, PARTIES_UNAVAILABLE,
    STATUS_UNKNOWN,
};

/// A table containing any of these (lowercased) keywords is the results table.
pub const TABLE_KEYWORDS: [&str; 5] = ["s.no", "case no", "petitioner", "respondent", "diary"];

/// First-cell values marking a header row.
const HEADER_SENTINELS: [&str; 3] = ["s.no", "s.no.", "sno"];

/// Labels delimiting the sub-fields of the listing-info cell.
const NEXT_DATE_LABEL: &str = "NEXT DATE:";
const LAST_DATE_LABEL: &str = "Last Date:";
const COURT_NO_LABEL: &str = "COURT NO:";

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("static selector"));
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));

/// Case number with a bracketed status, e.g. `W.P.(C) - 1234 / 2023 [PENDING]`.
static CASE_WITH_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][A-Z.()&]*\s*-\s*\d+\s*/\s*\d{4})\s*\[([^\]]+)\]").expect("static pattern")
});

/// Bare case number without a status.
static CASE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][A-Z.()&]*\s*-\s*\d+\s*/\s*\d{4})").expect("static pattern"));

/// Serial-number-prefixed case number, e.g. `1. CEAC - 5 / 2022`.
static CASE_SERIAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\d+)[.)]?\s+([A-Z][A-Z.()&]*\s*-\s*\d+\s*/\s*\d{4})")
        .expect("static pattern")
});

/// Which extraction tier produced a page of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    /// Structured table walk.
    Table,
    /// Pattern extraction over raw page text.
    Pattern,
}

/// Parsed case records; `total` is always derived from the collection, never
/// taken from the page.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecordsPage {
    pub records: Vec<CaseRecord>,
    pub total: usize,
    pub tier: ParseTier,
}

impl CaseRecordsPage {
    fn new(records: Vec<CaseRecord>, tier: ParseTier) -> Self {
        let total = records.len();
        Self {
            records,
            total,
            tier,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("page layout was not recognized by any parsing tier")]
    Unrecognized,
}

/// Extract case records from a results page.
pub fn parse_case_page(html: &str, base: &Url) -> Result<CaseRecordsPage, ParseError> {
    let records = parse_results_table(html, base);
    if !records.is_empty() {
        return Ok(CaseRecordsPage::new(records, ParseTier::Table));
    }

    let records = parse_page_text(html);
    if !records.is_empty() {
        return Ok(CaseRecordsPage::new(records, ParseTier::Pattern));
    }

    Err(ParseError::Unrecognized)
}

/// Tier 1: structured walk of the results table.
///
/// Row shape: S.No. | Diary No./Case No.[STATUS] | Petitioner vs. Respondent |
/// Listing Date / Court No.
fn parse_results_table(html: &str, base: &Url) -> Vec<CaseRecord> {
    let document = Html::parse_document(html);
    let Some(table) = find_results_table(&document) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for row in table.select(&ROW) {
        let cells: Vec<ElementRef> = row.select(&CELL).collect();
        if cells.len() < 3 {
            continue;
        }

        let serial_no = cell_text(&cells[0]);
        let case_info = cell_text(&cells[1]);
        let parties = cell_text(&cells[2]);
        let listing_info = cells.get(3).map(cell_text).unwrap_or_default();

        if case_info.is_empty() || HEADER_SENTINELS.contains(&serial_no.to_lowercase().as_str()) {
            continue;
        }

        let (case_number, status) = split_case_status(&case_info);

        records.push(CaseRecord {
            serial_no,
            case_number,
            status,
            parties: parties.clone(),
            next_hearing_date: labelled_field(
                &listing_info,
                NEXT_DATE_LABEL,
                &[LAST_DATE_LABEL, COURT_NO_LABEL],
            )
            .unwrap_or_else(|| FIELD_UNAVAILABLE.to_string()),
            last_hearing_date: labelled_field(&listing_info, LAST_DATE_LABEL, &[COURT_NO_LABEL])
                .unwrap_or_else(|| FIELD_UNAVAILABLE.to_string()),
            court_number: labelled_field(&listing_info, COURT_NO_LABEL, &[])
                .unwrap_or_else(|| FIELD_UNAVAILABLE.to_string()),
            document_links: document_links(&cells[1], base),
            raw_text: format!("{case_info} | {parties} | {listing_info}"),
        });
    }

    records
}

fn find_results_table<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    document.select(&TABLE).find(|table| {
        let text = table.text().collect::<String>().to_lowercase();
        TABLE_KEYWORDS.iter().any(|keyword| text.contains(keyword))
    })
}

/// Tier 2: pattern extraction, three patterns of decreasing specificity,
/// stopping at the first that yields a match.
fn parse_page_text(html: &str) -> Vec<CaseRecord> {
    let with_status: Vec<CaseRecord> = CASE_WITH_STATUS
        .captures_iter(html)
        .enumerate()
        .map(|(index, captures)| {
            minimal_record(
                (index + 1).to_string(),
                captures[1].trim().to_string(),
                captures[2].trim().to_string(),
            )
        })
        .collect();
    if !with_status.is_empty() {
        return with_status;
    }

    let bare: Vec<CaseRecord> = CASE_BARE
        .captures_iter(html)
        .enumerate()
        .map(|(index, captures)| {
            minimal_record(
                (index + 1).to_string(),
                captures[1].trim().to_string(),
                STATUS_UNKNOWN.to_string(),
            )
        })
        .collect();
    if !bare.is_empty() {
        return bare;
    }

    CASE_SERIAL
        .captures_iter(html)
        .map(|captures| {
            minimal_record(
                captures[1].to_string(),
                captures[2].trim().to_string(),
                STATUS_UNKNOWN.to_string(),
            )
        })
        .collect()
}

fn minimal_record(serial_no: String, case_number: String, status: String) -> CaseRecord {
    let raw_text = if status == STATUS_UNKNOWN {
        case_number.clone()
    } else {
        format!("{case_number} [{status}]")
    };
    CaseRecord {
        serial_no,
        case_number,
        status,
        parties: PARTIES_UNAVAILABLE.to_string(),
        next_hearing_date: FIELD_UNAVAILABLE.to_string(),
        last_hearing_date: FIELD_UNAVAILABLE.to_string(),
        court_number: FIELD_UNAVAILABLE.to_string(),
        document_links: Vec::new(),
        raw_text,
    }
}

/// Split `"CEAC - 1 / 2024 [DISPOSED] Orders"` into number and status.
fn split_case_status(case_info: &str) -> (String, String) {
    if let (Some(open), Some(close)) = (case_info.find('['), case_info.find(']')) {
        if open < close {
            let status = case_info[open + 1..close].trim();
            let number = case_info[..open].trim();
            if !status.is_empty() {
                return (number.to_string(), status.to_string());
            }
        }
    }
    (case_info.trim().to_string(), STATUS_UNKNOWN.to_string())
}

/// Label-delimited substring extraction with the next known label (or end of
/// string) as the boundary.
fn labelled_field(listing: &str, label: &str, stops: &[&str]) -> Option<String> {
    let start = listing.find(label)? + label.len();
    let rest = &listing[start..];
    let end = stops
        .iter()
        .filter_map(|stop| rest.find(stop))
        .min()
        .unwrap_or(rest.len());
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Anchors in the case-number cell whose href or text suggests a document.
fn document_links(cell: &ElementRef, base: &Url) -> Vec<DocumentLink> {
    let mut links = Vec::new();
    for anchor in cell.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let label = anchor
            .text()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if href.to_lowercase().contains(".pdf") || label.to_lowercase().contains("order") {
            if let Ok(url) = base.join(href) {
                links.push(DocumentLink {
                    label,
                    url: url.to_string(),
                });
            }
        }
    }
    links
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the orders listing attached to a case.
///
/// Row shape: S.No. | Case No./Order Link | Date of Order | Corrigendum |
/// Hindi order.  An empty listing is a valid result, not an error.
pub fn parse_orders_page(html: &str, base: &Url) -> OrdersPage {
    let document = Html::parse_document(html);
    let mut orders = Vec::new();

    if let Some(table) = document.select(&TABLE).next() {
        for (index, row) in table.select(&ROW).skip(1).enumerate() {
            let cells: Vec<ElementRef> = row.select(&CELL).collect();
            if cells.len() < 3 {
                continue;
            }

            let serial_no = {
                let text = cell_text(&cells[0]);
                if text.is_empty() {
                    (index + 1).to_string()
                } else {
                    text
                }
            };

            let (corrigendum_date, corrigendum_url) = match cells.get(3) {
                Some(cell) => (cell_text(cell), first_anchor(cell, base)),
                None => (String::new(), None),
            };

            orders.push(OrderEntry {
                serial_no,
                description: cell_text(&cells[1]),
                order_date: cell_text(&cells[2]),
                document_url: first_anchor(&cells[1], base),
                corrigendum_date,
                corrigendum_url,
                hindi_order_url: cells.get(4).and_then(|cell| first_anchor(cell, base)),
            });
        }
    }

    OrdersPage {
        total_orders: orders.len(),
        orders,
        raw_html: html.to_string(),
    }
}

fn first_anchor(cell: &ElementRef, base: &Url) -> Option<String> {
    cell.select(&ANCHOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .find_map(|href| base.join(href).ok().map(|url| url.to_string()))
}
