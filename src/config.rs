//! Strongly-typed configuration for the retrieval engine.
//!
//! Configuration values can be constructed from defaults or loaded from
//! `CASETRACK_*` environment variables (with optional `.env` support).  The
//! defaults reproduce the timing behaviour of the portal scraper this engine
//! replaces: a five-minute session lifetime, three attempts per search, and a
//! five-second settle wait after submission.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;

use dotenvy::dotenv;
use thiserror::Error;

use crate::logging::LogCallback;

/// Portal base used to resolve relative document links.
pub const DEFAULT_BASE_URL: &str = "https://delhihighcourt.nic.in";

/// The case-status form this engine drives.
pub const DEFAULT_FORM_URL: &str = "https://delhihighcourt.nic.in/app/get-case-type-status";

/// Browser-like user agent presented both by the driver and the document
/// fetcher; the portal rejects obviously non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Verbosity level for engine logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

/// Configuration values for [`CaseStatusEngine`](crate::engine::CaseStatusEngine).
#[derive(Clone)]
pub struct EngineConfig {
    /// Base URL for resolving relative document hrefs.
    pub base_url: String,
    /// The case-status form page.
    pub form_url: String,
    pub headless: bool,
    /// Keep the browser window visible for debugging; overrides `headless`.
    pub show_browser: bool,
    pub page_load_timeout_ms: u64,
    /// Wait window for form controls to appear after navigation.
    pub implicit_wait_ms: u64,
    /// A session older than this is discarded before reuse.
    pub max_session_age_ms: u64,
    /// Fixed interval to let the results page render after submission.
    pub settle_wait_ms: u64,
    pub max_attempts: u32,
    /// Integer upscale factor applied to captcha bitmaps before OCR.
    pub captcha_upscale: u32,
    /// Path to a `tesseract` binary; `None` disables image-captcha solving.
    pub tesseract_bin: Option<PathBuf>,
    /// Explicit Chrome/Chromium executable; `None` lets the runtime discover one.
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    pub document_timeout_ms: u64,
    /// Optional form-structure JSON for caller-side dropdown data.
    pub catalog_path: Option<PathBuf>,
    pub verbose: Verbosity,
    /// External log sink; the default handler prints to the console.
    pub logger: Option<LogCallback>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            form_url: DEFAULT_FORM_URL.to_string(),
            headless: true,
            show_browser: false,
            page_load_timeout_ms: 30_000,
            implicit_wait_ms: 10_000,
            max_session_age_ms: 300_000,
            settle_wait_ms: 5_000,
            max_attempts: 3,
            captcha_upscale: 3,
            tesseract_bin: None,
            chrome_executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            document_timeout_ms: 30_000,
            catalog_path: None,
            verbose: Verbosity::default(),
            logger: None,
        }
    }
}

impl EngineConfig {
    /// Construct a configuration from `CASETRACK_*` environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = EngineConfig::default();

        if let Some(value) = env_var("CASETRACK_BASE_URL") {
            config.base_url = value;
        }

        if let Some(value) = env_var("CASETRACK_FORM_URL") {
            config.form_url = value;
        }

        if let Some(value) = env_var("CASETRACK_HEADLESS") {
            config.headless = parse_bool("CASETRACK_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_SHOW_BROWSER") {
            config.show_browser = parse_bool("CASETRACK_SHOW_BROWSER", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_PAGE_LOAD_TIMEOUT_MS") {
            config.page_load_timeout_ms = parse_u64("CASETRACK_PAGE_LOAD_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_IMPLICIT_WAIT_MS") {
            config.implicit_wait_ms = parse_u64("CASETRACK_IMPLICIT_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_MAX_SESSION_AGE_MS") {
            config.max_session_age_ms = parse_u64("CASETRACK_MAX_SESSION_AGE_MS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_SETTLE_WAIT_MS") {
            config.settle_wait_ms = parse_u64("CASETRACK_SETTLE_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_MAX_ATTEMPTS") {
            config.max_attempts = parse_u32("CASETRACK_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_CAPTCHA_UPSCALE") {
            config.captcha_upscale = parse_u32("CASETRACK_CAPTCHA_UPSCALE", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_TESSERACT_BIN") {
            config.tesseract_bin = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("CASETRACK_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("CASETRACK_USER_AGENT") {
            config.user_agent = value;
        }

        if let Some(value) = env_var("CASETRACK_DOC_TIMEOUT_MS") {
            config.document_timeout_ms = parse_u64("CASETRACK_DOC_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("CASETRACK_CATALOG") {
            config.catalog_path = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("CASETRACK_VERBOSE") {
            let parsed = parse_u8("CASETRACK_VERBOSE", &value)?;
            config.verbose =
                Verbosity::from_u8(parsed).ok_or_else(|| ConfigError::InvalidEnumVariant {
                    field: "CASETRACK_VERBOSE",
                    value: parsed.to_string(),
                })?;
        }

        Ok(config)
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_url", &self.base_url)
            .field("form_url", &self.form_url)
            .field("headless", &self.headless)
            .field("show_browser", &self.show_browser)
            .field("page_load_timeout_ms", &self.page_load_timeout_ms)
            .field("implicit_wait_ms", &self.implicit_wait_ms)
            .field("max_session_age_ms", &self.max_session_age_ms)
            .field("settle_wait_ms", &self.settle_wait_ms)
            .field("max_attempts", &self.max_attempts)
            .field("captcha_upscale", &self.captcha_upscale)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("chrome_executable", &self.chrome_executable)
            .field("user_agent", &self.user_agent)
            .field("document_timeout_ms", &self.document_timeout_ms)
            .field("catalog_path", &self.catalog_path)
            .field("verbose", &self.verbose)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

/// Errors that can arise while constructing an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
