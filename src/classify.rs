//! Response classification.
//!
//! The portal signals an empty result set with a small set of fixed phrases
//! rather than a distinguishable page structure.  A signature match is a
//! confirmed negative: the orchestrator short-circuits to `NotFound` without
//! ever invoking the parser.

/// Case-insensitive phrases that mark an explicitly empty result set.
pub const NO_DATA_SIGNATURES: [&str; 4] = [
    "no record found",
    "no records found",
    "case not found",
    "invalid case",
];

/// Whether the raw page body carries an explicit no-data signature.
pub fn is_no_data_page(body: &str) -> bool {
    let lowered = body.to_lowercase();
    NO_DATA_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_signatures_case_insensitively() {
        assert!(is_no_data_page("<html><body>No Record Found</body></html>"));
        assert!(is_no_data_page("<p>NO RECORDS FOUND for query</p>"));
        assert!(is_no_data_page("the case NOT found here"));
        assert!(is_no_data_page("Invalid Case number entered"));
    }

    #[test]
    fn ignores_pages_without_signatures() {
        assert!(!is_no_data_page(
            "<table><tr><td>1</td><td>W.P.(C) - 1234 / 2023 [PENDING]</td></tr></table>"
        ));
        assert!(!is_no_data_page(""));
    }
}
