//! Core data model for the case-status retrieval engine.
//!
//! These strongly-typed records provide a shared vocabulary between the
//! retrieval engine and its callers: the immutable search request, the
//! normalized case records extracted from the portal's HTML, and the tagged
//! outcome that is the engine's sole contract.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel used when a case status cannot be determined from the markup.
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Sentinel used for dates and court numbers that the page did not provide.
pub const FIELD_UNAVAILABLE: &str = "N/A";

/// Sentinel used when the parties cell could not be recovered at all.
pub const PARTIES_UNAVAILABLE: &str = "Parties information not available";

/// A single case-status lookup as supplied by the caller.
///
/// The caller validates structural presence; the engine does not re-check
/// semantics such as year ranges or case-type membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub case_type: String,
    pub case_number: String,
    pub filing_year: String,
}

impl SearchRequest {
    pub fn new(
        case_type: impl Into<String>,
        case_number: impl Into<String>,
        filing_year: impl Into<String>,
    ) -> Self {
        Self {
            case_type: case_type.into(),
            case_number: case_number.into(),
            filing_year: filing_year.into(),
        }
    }
}

impl fmt::Display for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}",
            self.case_type, self.case_number, self.filing_year
        )
    }
}

/// A document (order/judgment) reference attached to a case record.
///
/// `url` is always absolute; relative hrefs are resolved against the portal
/// base URL during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLink {
    pub label: String,
    pub url: String,
}

/// One normalized case row extracted from the results page.
///
/// Unparsable fields carry explicit sentinels ([`STATUS_UNKNOWN`],
/// [`FIELD_UNAVAILABLE`]) rather than options, keeping downstream rendering
/// uniform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub serial_no: String,
    pub case_number: String,
    pub status: String,
    pub parties: String,
    pub next_hearing_date: String,
    pub last_hearing_date: String,
    pub court_number: String,
    pub document_links: Vec<DocumentLink>,
    pub raw_text: String,
}

/// The engine's sole contract with its caller: exactly one variant per call.
///
/// The tag alone drives user-facing messaging; callers must not infer success
/// from a non-empty `rawPage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SearchOutcome {
    #[serde(rename_all = "camelCase")]
    Found {
        records: Vec<CaseRecord>,
        raw_page: String,
    },
    /// The portal explicitly reported an empty result set. Confirmed
    /// negative, never retried.
    NotFound,
    CaptchaFailed,
    SubmissionFailed,
    ParsingFailed,
    TimedOut,
    BrowserSetupFailed,
    /// Attempts exhausted with differing failure causes per attempt.
    MaxRetriesExceeded,
    #[serde(rename_all = "camelCase")]
    UnknownError { detail: String },
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }
}

/// One row of the orders listing attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub serial_no: String,
    pub description: String,
    pub order_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    pub corrigendum_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrigendum_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hindi_order_url: Option<String>,
}

/// The parsed orders listing for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersPage {
    pub orders: Vec<OrderEntry>,
    pub total_orders: usize,
    pub raw_html: String,
}

/// A fetched binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    pub content: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}
