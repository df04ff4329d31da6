//! Case-status form submission.
//!
//! The portal's markup is not contractually stable, so every control is
//! located through a priority-ordered fallback chain rather than a single
//! selector; the same pattern recurs in captcha detection and parsing.

use std::time::Duration;

use thiserror::Error;

use crate::driver::{DriverError, DriverRuntime, ElementId};
use crate::types::SearchRequest;

/// Field ids on the case-status form.
const CASE_TYPE_SELECTOR: &str = "#case_type";
const CASE_NUMBER_SELECTOR: &str = "#case_number";
const FILING_YEAR_SELECTOR: &str = "#case_year";

/// Explicit submit-capable controls, most specific first.
pub const SUBMIT_SELECTORS: [&str; 7] = [
    "button[type='submit']",
    "input[type='submit']",
    "input[value*='Submit' i]",
    "button[class*='submit']",
    "input[class*='submit']",
    ".btn-primary",
    ".submit-btn",
];

/// Action verbs accepted by the heuristic button scan.
pub const SUBMIT_KEYWORDS: [&str; 4] = ["submit", "search", "go", "find"];

/// Errors surfaced by the form pipeline; all map to `SubmissionFailed`.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("the {0} control did not appear on the form")]
    MissingControl(&'static str),
    #[error("no enabled submit control matched any strategy")]
    NoSubmitControl,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Navigate to the form and fill in the search request.
///
/// The case-type control gates the whole form: it is awaited within the
/// configured window, and its absence is a submission failure rather than a
/// silent no-op.
pub async fn navigate_and_fill(
    driver: &dyn DriverRuntime,
    form_url: &str,
    request: &SearchRequest,
    control_wait: Duration,
) -> Result<(), FormError> {
    driver.navigate(form_url).await?;

    let case_type = driver
        .wait_for(CASE_TYPE_SELECTOR, control_wait)
        .await
        .map_err(|err| match err {
            DriverError::WaitTimeout { .. } => FormError::MissingControl("case type"),
            other => FormError::Driver(other),
        })?;
    driver.select_value(case_type, &request.case_type).await?;

    let case_number = driver
        .find_element(CASE_NUMBER_SELECTOR)
        .await?
        .ok_or(FormError::MissingControl("case number"))?;
    driver.type_text(case_number, &request.case_number).await?;

    let filing_year = driver
        .find_element(FILING_YEAR_SELECTOR)
        .await?
        .ok_or(FormError::MissingControl("filing year"))?;
    driver
        .select_value(filing_year, &request.filing_year)
        .await?;

    Ok(())
}

/// Locate and click a submit-capable control.
pub async fn submit(driver: &dyn DriverRuntime) -> Result<(), FormError> {
    if let Some(button) = first_enabled(driver, &SUBMIT_SELECTORS).await? {
        driver.click(button).await?;
        return Ok(());
    }

    // Heuristic fallback: scan every enabled button-like control for a
    // recognised action verb in its text or value attribute.
    let mut candidates = driver.find_elements("button").await?;
    candidates.extend(
        driver
            .find_elements("input[type='button'], input[type='submit']")
            .await?,
    );

    for candidate in candidates {
        if !driver.is_enabled(candidate).await? {
            continue;
        }
        let mut label = driver.element_text(candidate).await?;
        if label.trim().is_empty() {
            label = driver
                .attribute(candidate, "value")
                .await?
                .unwrap_or_default();
        }
        let label = label.to_lowercase();
        if SUBMIT_KEYWORDS.iter().any(|verb| label.contains(verb)) {
            driver.click(candidate).await?;
            return Ok(());
        }
    }

    Err(FormError::NoSubmitControl)
}

async fn first_enabled(
    driver: &dyn DriverRuntime,
    selectors: &[&str],
) -> Result<Option<ElementId>, FormError> {
    for selector in selectors {
        if let Some(element) = driver.find_element(selector).await? {
            if driver.is_enabled(element).await? {
                return Ok(Some(element));
            }
        }
    }
    Ok(None)
}
