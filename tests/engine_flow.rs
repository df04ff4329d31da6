//! End-to-end engine flows against a scripted browser runtime.
//!
//! These tests exercise the public engine API the way the web layer consumes
//! it: one `search` call in, one typed outcome out.  The scripted runtime
//! models the portal's form page (controls, captcha variants, submit button)
//! and switches to a canned results page once the form is submitted.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use casetrack_rs::captcha::{DigitRecognizer, OcrError};
use casetrack_rs::config::{EngineConfig, Verbosity};
use casetrack_rs::driver::{DriverError, DriverFactory, DriverRuntime, ElementId, LaunchOptions};
use casetrack_rs::engine::CaseStatusEngine;
use casetrack_rs::types::{SearchOutcome, SearchRequest};

const CASE_TYPE: ElementId = 1;
const CASE_NUMBER: ElementId = 2;
const CASE_YEAR: ElementId = 3;
const CAPTCHA_TEXT: ElementId = 4;
const CAPTCHA_INPUT: ElementId = 5;
const CAPTCHA_IMAGE: ElementId = 6;
const SUBMIT: ElementId = 10;
const TABLE: ElementId = 90;

const RESULTS_TABLE: &str = r#"
    <html><body><table>
      <tr><th>S.No.</th><th>Diary No. / Case No.</th><th>Petitioner Vs. Respondent</th><th>Listing Date / Court No.</th></tr>
      <tr>
        <td>1</td>
        <td>W.P.(C) - 1234 / 2023 [PENDING]</td>
        <td>ABC Corp vs Union of India</td>
        <td>NEXT DATE: 25/01/2025</td>
      </tr>
    </table></body></html>"#;

#[derive(Clone)]
enum Captcha {
    None,
    Text(&'static str),
    Image,
}

#[derive(Clone)]
struct SiteConfig {
    results_html: String,
    form_controls: bool,
    has_submit: bool,
    captcha: Captcha,
    /// When false the results page is served without a prior submit, which
    /// is how the orders listing behaves.
    gate_on_submit: bool,
}

impl SiteConfig {
    fn results(html: &str) -> Self {
        Self {
            results_html: html.to_string(),
            form_controls: true,
            has_submit: true,
            captcha: Captcha::None,
            gate_on_submit: true,
        }
    }

    fn with_captcha(mut self, captcha: Captcha) -> Self {
        self.captcha = captcha;
        self
    }

    fn without_submit(mut self) -> Self {
        self.has_submit = false;
        self
    }

    fn ungated(mut self) -> Self {
        self.gate_on_submit = false;
        self
    }
}

#[derive(Default)]
struct Recorder {
    typed: Mutex<Vec<(ElementId, String)>>,
    selected: Mutex<Vec<(ElementId, String)>>,
}

struct MockDriver {
    config: SiteConfig,
    submitted: AtomicBool,
    recorder: Arc<Recorder>,
    closes: Arc<AtomicUsize>,
}

fn tiny_png() -> Vec<u8> {
    let bitmap = image::GrayImage::from_pixel(30, 10, image::Luma([200u8]));
    let mut out = Vec::new();
    image::DynamicImage::ImageLuma8(bitmap)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("png encode");
    out
}

#[async_trait]
impl DriverRuntime for MockDriver {
    async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn find_element(&self, css: &str) -> Result<Option<ElementId>, DriverError> {
        let found = match css {
            "#case_type" if self.config.form_controls => Some(CASE_TYPE),
            "#case_number" if self.config.form_controls => Some(CASE_NUMBER),
            "#case_year" if self.config.form_controls => Some(CASE_YEAR),
            "span[id*='captcha']" => match self.config.captcha {
                Captcha::Text(_) => Some(CAPTCHA_TEXT),
                _ => None,
            },
            "img[src*='captcha' i]" => match self.config.captcha {
                Captcha::Image => Some(CAPTCHA_IMAGE),
                _ => None,
            },
            "input[name*='captcha']" => match self.config.captcha {
                Captcha::None => None,
                _ => Some(CAPTCHA_INPUT),
            },
            "button[type='submit']" if self.config.has_submit => Some(SUBMIT),
            "table" if self.config.results_html.contains("<table") => Some(TABLE),
            _ => None,
        };
        Ok(found)
    }

    async fn find_elements(&self, _css: &str) -> Result<Vec<ElementId>, DriverError> {
        Ok(Vec::new())
    }

    async fn wait_for(&self, css: &str, timeout: Duration) -> Result<ElementId, DriverError> {
        self.find_element(css)
            .await?
            .ok_or(DriverError::WaitTimeout {
                selector: css.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
    }

    async fn select_value(&self, element: ElementId, value: &str) -> Result<(), DriverError> {
        self.recorder
            .selected
            .lock()
            .unwrap()
            .push((element, value.to_string()));
        Ok(())
    }

    async fn type_text(&self, element: ElementId, text: &str) -> Result<(), DriverError> {
        self.recorder
            .typed
            .lock()
            .unwrap()
            .push((element, text.to_string()));
        Ok(())
    }

    async fn click(&self, element: ElementId) -> Result<(), DriverError> {
        if element == SUBMIT {
            self.submitted.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn element_text(&self, element: ElementId) -> Result<String, DriverError> {
        if element == CAPTCHA_TEXT {
            if let Captcha::Text(text) = self.config.captcha {
                return Ok(text.to_string());
            }
        }
        Ok(String::new())
    }

    async fn attribute(
        &self,
        _element: ElementId,
        _name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(None)
    }

    async fn is_enabled(&self, _element: ElementId) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn screenshot(&self, _element: ElementId) -> Result<Vec<u8>, DriverError> {
        Ok(tiny_png())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        if !self.config.gate_on_submit || self.submitted.load(Ordering::SeqCst) {
            Ok(self.config.results_html.clone())
        } else {
            Ok("<html><body>case status form</body></html>".to_string())
        }
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum Behavior {
    FailLaunch,
    Site(SiteConfig),
}

struct MockFactory {
    behaviors: Mutex<VecDeque<Behavior>>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    recorder: Arc<Recorder>,
}

impl MockFactory {
    fn new(behaviors: Vec<Behavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors.into()),
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            recorder: Arc::new(Recorder::default()),
        }
    }

    fn single(site: SiteConfig) -> Self {
        Self::new(vec![Behavior::Site(site)])
    }

    fn handles(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<Recorder>) {
        (
            Arc::clone(&self.launches),
            Arc::clone(&self.closes),
            Arc::clone(&self.recorder),
        )
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn DriverRuntime>, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let mut behaviors = self.behaviors.lock().unwrap();
        let behavior = if behaviors.len() > 1 {
            behaviors.pop_front()
        } else {
            behaviors.front().map(|behavior| match behavior {
                Behavior::FailLaunch => Behavior::FailLaunch,
                Behavior::Site(site) => Behavior::Site(site.clone()),
            })
        };

        match behavior {
            Some(Behavior::Site(config)) => Ok(Box::new(MockDriver {
                config,
                submitted: AtomicBool::new(false),
                recorder: Arc::clone(&self.recorder),
                closes: Arc::clone(&self.closes),
            })),
            Some(Behavior::FailLaunch) | None => {
                Err(DriverError::Launch("chrome refused to start".into()))
            }
        }
    }
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.settle_wait_ms = 0;
    config.implicit_wait_ms = 0;
    config.max_attempts = 3;
    config.verbose = Verbosity::Minimal;
    config
}

fn request() -> SearchRequest {
    SearchRequest::new("W.P.(C)", "1234", "2023")
}

struct StaticRecognizer(&'static str);

#[async_trait]
impl DigitRecognizer for StaticRecognizer {
    async fn recognize_digits(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn table_row_yields_a_found_outcome_with_normalized_fields() {
    let factory = MockFactory::single(SiteConfig::results(RESULTS_TABLE));
    let (launches, closes, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    let SearchOutcome::Found { records, raw_page } = outcome else {
        panic!("expected Found, got {outcome:?}");
    };

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.case_number, "W.P.(C) - 1234 / 2023");
    assert_eq!(record.status, "PENDING");
    assert_eq!(record.parties, "ABC Corp vs Union of India");
    assert_eq!(record.next_hearing_date, "25/01/2025");
    assert_eq!(record.last_hearing_date, "N/A");
    assert!(raw_page.contains("<table"));

    // One successful attempt, one acquire/release cycle.
    assert_eq!(launches.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let metrics = engine.metrics();
    assert_eq!(metrics.searches, 1);
    assert_eq!(metrics.attempts, 1);
    assert_eq!(metrics.table_parses, 1);
    assert_eq!(metrics.found, 1);
}

#[tokio::test]
async fn no_data_signature_short_circuits_to_not_found() {
    let factory = MockFactory::single(SiteConfig::results(
        "<html><body><h3>No record found for this query</h3></body></html>",
    ));
    let (launches, _, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    assert_eq!(outcome, SearchOutcome::NotFound);
    // Confirmed negative: no retries.
    assert_eq!(launches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.metrics().not_found, 1);
}

#[tokio::test]
async fn uniform_submission_failures_run_exactly_three_cycles() {
    let factory = MockFactory::single(SiteConfig::results(RESULTS_TABLE).without_submit());
    let (launches, closes, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    assert_eq!(outcome, SearchOutcome::SubmissionFailed);
    assert_eq!(launches.load(Ordering::SeqCst), 3);
    assert_eq!(closes.load(Ordering::SeqCst), 3);
    assert_eq!(engine.metrics().attempts, 3);
}

#[tokio::test]
async fn uniform_browser_setup_failures_keep_their_cause() {
    let factory = MockFactory::new(vec![Behavior::FailLaunch]);
    let (launches, closes, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    // Uniform cause across all attempts, so not MaxRetriesExceeded.
    assert_eq!(outcome, SearchOutcome::BrowserSetupFailed);
    assert_eq!(launches.load(Ordering::SeqCst), 3);
    assert_eq!(closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mixed_failure_causes_collapse_to_max_retries_exceeded() {
    let factory = MockFactory::new(vec![
        Behavior::Site(SiteConfig::results(RESULTS_TABLE).without_submit()),
        Behavior::Site(SiteConfig::results(RESULTS_TABLE).with_captcha(Captcha::Image)),
        Behavior::Site(SiteConfig::results(RESULTS_TABLE).without_submit()),
    ]);
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    // Attempt 2's image captcha is unsolvable without an OCR backend, so the
    // causes differ across attempts.
    let outcome = engine.search(&request()).await;
    assert_eq!(outcome, SearchOutcome::MaxRetriesExceeded);
}

#[tokio::test]
async fn text_captcha_is_copied_into_the_input() {
    let factory =
        MockFactory::single(SiteConfig::results(RESULTS_TABLE).with_captcha(Captcha::Text("4567")));
    let (_, _, recorder) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    assert!(outcome.is_found());

    let typed = recorder.typed.lock().unwrap();
    assert!(typed.contains(&(CAPTCHA_INPUT, "4567".to_string())));
    assert_eq!(engine.metrics().captcha_text_solved, 1);
}

#[tokio::test]
async fn image_captcha_ocr_result_is_digit_filtered_before_typing() {
    let factory =
        MockFactory::single(SiteConfig::results(RESULTS_TABLE).with_captcha(Captcha::Image));
    let (_, _, recorder) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory)
        .expect("engine")
        .with_recognizer(Arc::new(StaticRecognizer("12a3")));

    let outcome = engine.search(&request()).await;
    assert!(outcome.is_found(), "got {outcome:?}");

    // Letters stripped leaves "123" (length 3): accepted verbatim.
    let typed = recorder.typed.lock().unwrap();
    assert!(typed.contains(&(CAPTCHA_INPUT, "123".to_string())));
    assert_eq!(engine.metrics().captcha_image_solved, 1);
}

#[tokio::test]
async fn short_ocr_results_leave_the_captcha_unsolved() {
    let factory =
        MockFactory::single(SiteConfig::results(RESULTS_TABLE).with_captcha(Captcha::Image));
    let (launches, _, recorder) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory)
        .expect("engine")
        .with_recognizer(Arc::new(StaticRecognizer("12")));

    let outcome = engine.search(&request()).await;
    assert_eq!(outcome, SearchOutcome::CaptchaFailed);
    assert_eq!(launches.load(Ordering::SeqCst), 3);
    assert!(recorder.typed.lock().unwrap().iter().all(|(element, _)| *element != CAPTCHA_INPUT));
    assert_eq!(engine.metrics().captcha_unsolved, 3);
}

#[tokio::test]
async fn image_captcha_without_ocr_backend_fails_the_search() {
    let factory =
        MockFactory::single(SiteConfig::results(RESULTS_TABLE).with_captcha(Captcha::Image));
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    assert_eq!(outcome, SearchOutcome::CaptchaFailed);
}

#[tokio::test]
async fn unrecognized_pages_classify_as_parsing_failed() {
    let factory = MockFactory::single(SiteConfig::results(
        "<html><body><p>scheduled maintenance</p></body></html>",
    ));
    let (launches, _, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let outcome = engine.search(&request()).await;
    // No signature and no recognizable records: retried, then ParsingFailed.
    assert_eq!(outcome, SearchOutcome::ParsingFailed);
    assert_eq!(launches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn orders_path_reuses_one_session_across_sequential_calls() {
    const ORDERS_PAGE: &str = r#"
        <table>
          <tr><th>S.No.</th><th>Order</th><th>Date</th></tr>
          <tr><td>1</td><td><a href="/app/order/abc.pdf">Order</a></td><td>15/10/2024</td></tr>
        </table>"#;

    let factory = MockFactory::single(SiteConfig::results(ORDERS_PAGE).ungated());
    let (launches, _, _) = factory.handles();
    let engine = CaseStatusEngine::new(test_config(), factory).expect("engine");

    let first = engine.orders("https://delhihighcourt.nic.in/app/orders/1").await;
    let second = engine.orders("https://delhihighcourt.nic.in/app/orders/1").await;

    let first = first.expect("orders");
    let second = second.expect("orders");
    assert_eq!(first.total_orders, 1);
    assert_eq!(
        first.orders[0].document_url.as_deref(),
        Some("https://delhihighcourt.nic.in/app/order/abc.pdf")
    );
    assert_eq!(second.total_orders, 1);

    // Back-to-back calls share one session.
    assert_eq!(launches.load(Ordering::SeqCst), 1);

    engine.shutdown().await;
}
