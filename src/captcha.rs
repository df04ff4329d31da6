//! CAPTCHA acquisition and solving.
//!
//! The portal gates submission behind one of two challenge shapes: a
//! human-readable text node whose content is simply copied into the input, or
//! a distorted digit image that must go through optical recognition.  Text
//! detection runs first because it is cheap and deterministic; the image
//! pipeline is only entered when no text challenge is present.
//!
//! Optical recognition is an optional capability behind the
//! [`DigitRecognizer`] trait.  Without a backend, image challenges are always
//! `Unsolved` and the orchestrator decides whether to retry or give up; text
//! challenges remain solvable either way.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, imageops};
use thiserror::Error;
use tokio::process::Command;

use crate::driver::{DriverError, DriverRuntime, ElementId, first_match};
use crate::logging::EngineLogger;

/// Selectors probed for a human-readable challenge text node.
pub const CAPTCHA_TEXT_SELECTORS: [&str; 5] = [
    "span[id*='captcha']",
    "div[id*='captcha']",
    "label[for*='captcha']",
    "span.captcha",
    "div.captcha-text",
];

/// Selectors probed for the challenge input field.
pub const CAPTCHA_INPUT_SELECTORS: [&str; 3] = [
    "input[name*='captcha']",
    "input[id*='captcha']",
    "input[placeholder*='captcha']",
];

/// Image element whose source hints at a captcha.
pub const CAPTCHA_IMAGE_SELECTOR: &str = "img[src*='captcha' i]";

/// A displayed challenge text shorter than this is noise, not a challenge.
const MIN_TEXT_CHALLENGE_LEN: usize = 3;

/// Accepted solution lengths; anything outside is treated as unsolved rather
/// than guessed at.
const MIN_SOLUTION_LEN: usize = 3;
const MAX_SOLUTION_LEN: usize = 8;

/// A detected verification challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaChallenge {
    /// The challenge text is directly visible in markup.
    Text { displayed: String },
    /// The challenge must be solved from the element's rendered bitmap.
    Image { element: ElementId },
}

/// How a challenge was solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaKind {
    Text,
    Image,
}

/// Result of one pass through the verification gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// No challenge on the page; submission may proceed.
    NotPresent,
    /// Solution typed into the input field.
    Solved { solution: String, via: CaptchaKind },
    /// A challenge exists but could not be completed.
    Unsolved,
}

/// Errors from the optical recognition backend.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no OCR backend is available: {0}")]
    Unavailable(String),
    #[error("failed to stage captcha image: {0}")]
    Io(#[from] std::io::Error),
    #[error("OCR backend failed: {0}")]
    Backend(String),
}

/// Errors surfaced by the captcha solver.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("captcha image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

/// Digit-only optical recognition capability.
#[async_trait]
pub trait DigitRecognizer: Send + Sync {
    /// Recognize digits in a PNG image. The raw result may still contain
    /// stray non-digit characters; the solver filters them.
    async fn recognize_digits(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Recognizer backed by a `tesseract` binary on the host.
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DigitRecognizer for TesseractCli {
    async fn recognize_digits(&self, image: &[u8]) -> Result<String, OcrError> {
        let scratch = tempfile::Builder::new()
            .prefix("casetrack-captcha-")
            .suffix(".png")
            .tempfile()?;
        tokio::fs::write(scratch.path(), image).await?;

        let output = Command::new(&self.binary)
            .arg(scratch.path())
            .arg("stdout")
            .args(["--psm", "7", "-c", "tessedit_char_whitelist=0123456789"])
            .output()
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    OcrError::Unavailable(format!("{} not found", self.binary.display()))
                } else {
                    OcrError::Io(err)
                }
            })?;

        if !output.status.success() {
            return Err(OcrError::Backend(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Detects and satisfies the verification gate before submission.
pub struct CaptchaSolver {
    recognizer: Option<Arc<dyn DigitRecognizer>>,
    upscale: u32,
    logger: EngineLogger,
}

impl CaptchaSolver {
    pub fn new(
        recognizer: Option<Arc<dyn DigitRecognizer>>,
        upscale: u32,
        logger: EngineLogger,
    ) -> Self {
        Self {
            recognizer,
            upscale,
            logger,
        }
    }

    /// Probe for a challenge, text selectors first.
    pub async fn detect(
        &self,
        driver: &dyn DriverRuntime,
    ) -> Result<Option<CaptchaChallenge>, CaptchaError> {
        for selector in CAPTCHA_TEXT_SELECTORS {
            if let Some(element) = driver.find_element(selector).await? {
                let displayed = driver.element_text(element).await?.trim().to_string();
                if displayed.len() >= MIN_TEXT_CHALLENGE_LEN {
                    return Ok(Some(CaptchaChallenge::Text { displayed }));
                }
            }
        }

        if let Some(element) = driver.find_element(CAPTCHA_IMAGE_SELECTOR).await? {
            return Ok(Some(CaptchaChallenge::Image { element }));
        }

        Ok(None)
    }

    /// Satisfy the gate: detect, solve, and type the solution into the input.
    /// Never submits the form itself.
    pub async fn satisfy(
        &self,
        driver: &dyn DriverRuntime,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        match self.detect(driver).await? {
            None => {
                self.logger
                    .debug("no captcha challenge on page", Some("captcha"), None);
                Ok(CaptchaOutcome::NotPresent)
            }
            Some(CaptchaChallenge::Text { displayed }) => {
                self.logger.info(
                    format!("text captcha challenge: '{displayed}'"),
                    Some("captcha"),
                    None,
                );
                self.enter_solution(driver, displayed, CaptchaKind::Text)
                    .await
            }
            Some(CaptchaChallenge::Image { element }) => {
                let Some(recognizer) = &self.recognizer else {
                    self.logger.info(
                        "image captcha present but no OCR backend configured",
                        Some("captcha"),
                        None,
                    );
                    return Ok(CaptchaOutcome::Unsolved);
                };

                let bitmap = driver.screenshot(element).await?;
                let prepared = preprocess(&bitmap, self.upscale)?;
                let raw = match recognizer.recognize_digits(&prepared).await {
                    Ok(raw) => raw,
                    Err(OcrError::Unavailable(reason)) => {
                        self.logger
                            .info(format!("OCR unavailable: {reason}"), Some("captcha"), None);
                        return Ok(CaptchaOutcome::Unsolved);
                    }
                    Err(err) => return Err(err.into()),
                };

                match accept_solution(&raw) {
                    Some(solution) => {
                        self.logger.info(
                            format!("image captcha OCR result accepted: '{solution}'"),
                            Some("captcha"),
                            None,
                        );
                        self.enter_solution(driver, solution, CaptchaKind::Image)
                            .await
                    }
                    None => {
                        self.logger.info(
                            format!("image captcha OCR result rejected: '{raw}'"),
                            Some("captcha"),
                            None,
                        );
                        Ok(CaptchaOutcome::Unsolved)
                    }
                }
            }
        }
    }

    async fn enter_solution(
        &self,
        driver: &dyn DriverRuntime,
        solution: String,
        via: CaptchaKind,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        match first_match(driver, &CAPTCHA_INPUT_SELECTORS).await? {
            Some(input) => {
                driver.type_text(input, &solution).await?;
                Ok(CaptchaOutcome::Solved { solution, via })
            }
            None => {
                self.logger.info(
                    "captcha challenge found but no input field is present",
                    Some("captcha"),
                    None,
                );
                Ok(CaptchaOutcome::Unsolved)
            }
        }
    }
}

/// Keep only digits and accept the result when its length is plausible.
pub fn accept_solution(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if (MIN_SOLUTION_LEN..=MAX_SOLUTION_LEN).contains(&digits.len()) {
        Some(digits)
    } else {
        None
    }
}

/// Prepare a captcha bitmap for digit recognition: greyscale, contrast
/// enhancement, light denoise, and an integer upscale (larger glyphs trade
/// processing time for recognition accuracy).
pub fn preprocess(bitmap: &[u8], upscale: u32) -> Result<Vec<u8>, CaptchaError> {
    let grey = image::load_from_memory(bitmap)?.to_luma8();
    let contrasted = imageops::contrast(&grey, 40.0);
    let denoised = imageops::blur(&contrasted, 0.8);

    let factor = upscale.max(1);
    let (width, height) = denoised.dimensions();
    let resized = imageops::resize(
        &denoised,
        width * factor,
        height * factor,
        FilterType::Lanczos3,
    );

    let mut encoded = Vec::new();
    DynamicImage::ImageLuma8(resized).write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
    Ok(encoded)
}
