//! Retry orchestration.
//!
//! One search is a bounded sequence of independent attempts.  Every attempt
//! acquires its own browser session, drives fill → captcha → submit →
//! settle-wait → classify → parse, and releases the session on every exit
//! path, including panics caught at the attempt boundary.  A confirmed
//! negative (`NotFound`) terminates immediately; classified failures consume
//! a retry and the terminal outcome is derived from the recorded causes.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::captcha::{CaptchaKind, CaptchaOutcome, CaptchaSolver, DigitRecognizer, TesseractCli};
use crate::classify;
use crate::config::EngineConfig;
use crate::documents::{DocumentError, DocumentFetcher};
use crate::driver::{DriverError, DriverFactory, DriverRuntime, LaunchOptions, SessionManager};
use crate::form::{self, FormError};
use crate::logging::{EngineLogger, LogConfig};
use crate::metrics::{self, EngineMetrics};
use crate::parser::{self, ParseTier};
use crate::types::{CaseRecord, DocumentPayload, OrdersPage, SearchOutcome, SearchRequest};

/// Errors surfaced while constructing the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid base URL '{url}': {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to construct HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Classified cause of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FailureKind {
    BrowserSetup,
    Captcha,
    Submission,
    Parsing,
    Timeout,
    Unknown(String),
}

enum AttemptOutcome {
    Found {
        records: Vec<CaseRecord>,
        raw_page: String,
    },
    NotFound,
    Failed(FailureKind),
}

/// The retrieval engine: one `search` call per case-status lookup, plus the
/// session-reusing orders path and document retrieval.
pub struct CaseStatusEngine<F: DriverFactory> {
    config: EngineConfig,
    sessions: SessionManager<F>,
    solver: CaptchaSolver,
    fetcher: DocumentFetcher,
    base_url: Url,
    logger: EngineLogger,
    metrics: Mutex<EngineMetrics>,
}

impl<F: DriverFactory> CaseStatusEngine<F> {
    pub fn new(config: EngineConfig, factory: F) -> Result<Self, EngineError> {
        let logger = EngineLogger::with_config(LogConfig {
            verbose: config.verbose,
            external_logger: config.logger.clone(),
        });

        let base_url = Url::parse(&config.base_url).map_err(|source| EngineError::BaseUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let recognizer = config
            .tesseract_bin
            .as_ref()
            .map(|binary| Arc::new(TesseractCli::new(binary.clone())) as Arc<dyn DigitRecognizer>);
        let solver = CaptchaSolver::new(recognizer, config.captcha_upscale, logger.clone());

        let fetcher = DocumentFetcher::new(
            &config.user_agent,
            Duration::from_millis(config.document_timeout_ms),
            logger.clone(),
        )?;

        let sessions = SessionManager::new(
            factory,
            launch_options(&config),
            Duration::from_millis(config.max_session_age_ms),
        );

        Ok(Self {
            sessions,
            solver,
            fetcher,
            base_url,
            logger,
            metrics: Mutex::new(EngineMetrics::default()),
            config,
        })
    }

    /// Replace the OCR backend, e.g. with a scripted recognizer in tests.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn DigitRecognizer>) -> Self {
        self.solver = CaptchaSolver::new(
            Some(recognizer),
            self.config.captcha_upscale,
            self.logger.clone(),
        );
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A snapshot of the engine's counters.
    pub fn metrics(&self) -> EngineMetrics {
        self.metrics_mut().clone()
    }

    /// Execute one case-status search, returning exactly one typed outcome.
    pub async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let timer = metrics::start_timer();
        let max_attempts = self.config.max_attempts.max(1);
        self.logger.info(
            format!("starting search for {request}"),
            Some("engine"),
            Some(json!({ "maxAttempts": max_attempts })),
        );

        let mut failures: Vec<FailureKind> = Vec::new();
        let mut terminal: Option<SearchOutcome> = None;

        for attempt in 1..=max_attempts {
            self.metrics_mut().record_attempt();
            match self.run_attempt(request).await {
                AttemptOutcome::Found { records, raw_page } => {
                    self.logger.info(
                        format!("found {} record(s) on attempt {attempt}", records.len()),
                        Some("engine"),
                        None,
                    );
                    terminal = Some(SearchOutcome::Found { records, raw_page });
                    break;
                }
                AttemptOutcome::NotFound => {
                    // Confirmed negative, never retried.
                    terminal = Some(SearchOutcome::NotFound);
                    break;
                }
                AttemptOutcome::Failed(kind) => {
                    self.logger.info(
                        format!("attempt {attempt}/{max_attempts} failed: {kind:?}"),
                        Some("engine"),
                        None,
                    );
                    failures.push(kind);
                }
            }
        }

        let outcome = terminal.unwrap_or_else(|| terminal_outcome(failures));

        {
            let mut metrics = self.metrics_mut();
            match &outcome {
                SearchOutcome::Found { .. } => metrics.record_found(),
                SearchOutcome::NotFound => metrics.record_not_found(),
                _ => metrics.record_failed(),
            }
            metrics.record_search(metrics::elapsed_ms(timer));
        }

        self.logger.info(
            format!("search for {request} finished"),
            Some("engine"),
            Some(json!({ "outcome": outcome_label(&outcome) })),
        );
        outcome
    }

    /// One attempt: acquire a session, drive it, and release the session on
    /// every exit path.  A panic inside the attempt is caught and treated as
    /// a classified failure for retry accounting.
    async fn run_attempt(&self, request: &SearchRequest) -> AttemptOutcome {
        let session = match self.sessions.acquire().await {
            Ok(session) => session,
            Err(err) => {
                self.logger
                    .error(format!("browser setup failed: {err}"), Some("session"), None);
                return AttemptOutcome::Failed(FailureKind::BrowserSetup);
            }
        };

        let result = AssertUnwindSafe(self.drive(session.runtime(), request))
            .catch_unwind()
            .await;

        self.sessions.release(session).await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                self.logger.error(
                    "attempt panicked; treating as a classified failure",
                    Some("engine"),
                    None,
                );
                AttemptOutcome::Failed(FailureKind::Unknown("attempt panicked".to_string()))
            }
        }
    }

    async fn drive(&self, driver: &dyn DriverRuntime, request: &SearchRequest) -> AttemptOutcome {
        if let Err(err) = form::navigate_and_fill(
            driver,
            &self.config.form_url,
            request,
            Duration::from_millis(self.config.implicit_wait_ms),
        )
        .await
        {
            self.logger
                .info(format!("form fill failed: {err}"), Some("form"), None);
            return AttemptOutcome::Failed(failure_from_form(err));
        }

        match self.solver.satisfy(driver).await {
            Ok(CaptchaOutcome::NotPresent) => {}
            Ok(CaptchaOutcome::Solved { via, .. }) => {
                let mut metrics = self.metrics_mut();
                match via {
                    CaptchaKind::Text => metrics.record_captcha_text(),
                    CaptchaKind::Image => metrics.record_captcha_image(),
                }
            }
            Ok(CaptchaOutcome::Unsolved) => {
                self.metrics_mut().record_captcha_unsolved();
                return AttemptOutcome::Failed(FailureKind::Captcha);
            }
            Err(err) => {
                self.logger
                    .error(format!("captcha handling failed: {err}"), Some("captcha"), None);
                self.metrics_mut().record_captcha_unsolved();
                return AttemptOutcome::Failed(FailureKind::Captcha);
            }
        }

        if let Err(err) = form::submit(driver).await {
            self.logger
                .info(format!("submission failed: {err}"), Some("form"), None);
            return AttemptOutcome::Failed(failure_from_form(err));
        }

        // Let the results page render before inspecting it.
        tokio::time::sleep(Duration::from_millis(self.config.settle_wait_ms)).await;

        let page = match driver.page_source().await {
            Ok(page) => page,
            Err(err) => return AttemptOutcome::Failed(failure_from_driver(err)),
        };

        if classify::is_no_data_page(&page) {
            self.logger.info(
                format!("no-data signature matched for {request}"),
                Some("classify"),
                None,
            );
            return AttemptOutcome::NotFound;
        }

        match parser::parse_case_page(&page, &self.base_url) {
            Ok(parsed) if parsed.total > 0 => {
                match parsed.tier {
                    ParseTier::Table => self.metrics_mut().record_table_parse(),
                    ParseTier::Pattern => self.metrics_mut().record_pattern_parse(),
                }
                AttemptOutcome::Found {
                    records: parsed.records,
                    raw_page: page,
                }
            }
            _ => {
                self.logger
                    .info("no records recognized on page", Some("parse"), None);
                AttemptOutcome::Failed(FailureKind::Parsing)
            }
        }
    }

    /// Retrieve the orders listing for a case.
    ///
    /// This is the one path allowed to reuse a session across sequential
    /// calls; the session is stashed back only after a successful run.
    pub async fn orders(&self, orders_url: &str) -> Result<OrdersPage, DriverError> {
        let session = self.sessions.acquire_reusable().await?;
        let result = self.drive_orders(session.runtime(), orders_url).await;
        match result {
            Ok(page) => {
                self.sessions.stash(session).await;
                self.logger.info(
                    format!("parsed {} order(s)", page.total_orders),
                    Some("orders"),
                    None,
                );
                Ok(page)
            }
            Err(err) => {
                self.sessions.release(session).await;
                self.logger
                    .error(format!("orders retrieval failed: {err}"), Some("orders"), None);
                Err(err)
            }
        }
    }

    async fn drive_orders(
        &self,
        driver: &dyn DriverRuntime,
        orders_url: &str,
    ) -> Result<OrdersPage, DriverError> {
        driver.navigate(orders_url).await?;
        driver
            .wait_for("table", Duration::from_millis(self.config.implicit_wait_ms))
            .await?;
        let html = driver.page_source().await?;
        Ok(parser::parse_orders_page(&html, &self.base_url))
    }

    /// Retrieve a binary attachment referenced by a document link.
    pub async fn fetch_document(&self, url: &str) -> Result<DocumentPayload, DocumentError> {
        let payload = self.fetcher.fetch(url).await?;
        self.metrics_mut()
            .record_document(payload.content.len() as u64);
        Ok(payload)
    }

    /// Close any session stashed by the orders path.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }

    fn metrics_mut(&self) -> std::sync::MutexGuard<'_, EngineMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn launch_options(config: &EngineConfig) -> LaunchOptions {
    LaunchOptions {
        headless: config.headless,
        show_browser: config.show_browser,
        page_load_timeout: Duration::from_millis(config.page_load_timeout_ms),
        implicit_wait: Duration::from_millis(config.implicit_wait_ms),
        user_agent: config.user_agent.clone(),
        chrome_executable: config.chrome_executable.clone(),
    }
}

fn failure_from_form(err: FormError) -> FailureKind {
    match err {
        FormError::MissingControl(_) | FormError::NoSubmitControl => FailureKind::Submission,
        FormError::Driver(driver_err) => failure_from_driver(driver_err),
    }
}

fn failure_from_driver(err: DriverError) -> FailureKind {
    match err {
        DriverError::Timeout { .. } | DriverError::WaitTimeout { .. } => FailureKind::Timeout,
        DriverError::Launch(_) => FailureKind::BrowserSetup,
        other => FailureKind::Unknown(other.to_string()),
    }
}

/// Collapse recorded attempt failures into the terminal outcome: a uniform
/// cause is reported as itself, mixed causes as `MaxRetriesExceeded`.
fn terminal_outcome(failures: Vec<FailureKind>) -> SearchOutcome {
    let Some(last) = failures.last().cloned() else {
        return SearchOutcome::UnknownError {
            detail: "no attempts were made".to_string(),
        };
    };

    let uniform = failures
        .iter()
        .all(|kind| std::mem::discriminant(kind) == std::mem::discriminant(&last));

    if uniform {
        outcome_for(last)
    } else {
        SearchOutcome::MaxRetriesExceeded
    }
}

fn outcome_for(kind: FailureKind) -> SearchOutcome {
    match kind {
        FailureKind::BrowserSetup => SearchOutcome::BrowserSetupFailed,
        FailureKind::Captcha => SearchOutcome::CaptchaFailed,
        FailureKind::Submission => SearchOutcome::SubmissionFailed,
        FailureKind::Parsing => SearchOutcome::ParsingFailed,
        FailureKind::Timeout => SearchOutcome::TimedOut,
        FailureKind::Unknown(detail) => SearchOutcome::UnknownError { detail },
    }
}

fn outcome_label(outcome: &SearchOutcome) -> &'static str {
    match outcome {
        SearchOutcome::Found { .. } => "found",
        SearchOutcome::NotFound => "notFound",
        SearchOutcome::CaptchaFailed => "captchaFailed",
        SearchOutcome::SubmissionFailed => "submissionFailed",
        SearchOutcome::ParsingFailed => "parsingFailed",
        SearchOutcome::TimedOut => "timedOut",
        SearchOutcome::BrowserSetupFailed => "browserSetupFailed",
        SearchOutcome::MaxRetriesExceeded => "maxRetriesExceeded",
        SearchOutcome::UnknownError { .. } => "unknownError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_failures_report_their_own_cause() {
        let outcome = terminal_outcome(vec![
            FailureKind::BrowserSetup,
            FailureKind::BrowserSetup,
            FailureKind::BrowserSetup,
        ]);
        assert_eq!(outcome, SearchOutcome::BrowserSetupFailed);

        let outcome = terminal_outcome(vec![FailureKind::Parsing, FailureKind::Parsing]);
        assert_eq!(outcome, SearchOutcome::ParsingFailed);
    }

    #[test]
    fn mixed_failures_collapse_to_max_retries_exceeded() {
        let outcome = terminal_outcome(vec![
            FailureKind::Captcha,
            FailureKind::Captcha,
            FailureKind::Submission,
        ]);
        assert_eq!(outcome, SearchOutcome::MaxRetriesExceeded);
    }

    #[test]
    fn unknown_failures_keep_the_last_detail() {
        let outcome = terminal_outcome(vec![
            FailureKind::Unknown("first".into()),
            FailureKind::Unknown("second".into()),
        ]);
        assert_eq!(
            outcome,
            SearchOutcome::UnknownError {
                detail: "second".into()
            }
        );
    }

    #[test]
    fn no_recorded_failures_is_an_unknown_error() {
        assert!(matches!(
            terminal_outcome(Vec::new()),
            SearchOutcome::UnknownError { .. }
        ));
    }

    #[test]
    fn form_errors_classify_as_submission_failures() {
        assert_eq!(
            failure_from_form(FormError::MissingControl("case type")),
            FailureKind::Submission
        );
        assert_eq!(
            failure_from_form(FormError::NoSubmitControl),
            FailureKind::Submission
        );
        assert_eq!(
            failure_from_form(FormError::Driver(DriverError::Timeout {
                what: "navigation".into()
            })),
            FailureKind::Timeout
        );
    }
}
