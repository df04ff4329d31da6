//! Browser driver abstraction and session lifecycle.
//!
//! The engine never talks to a browser backend directly.  Every interaction
//! goes through the [`DriverRuntime`] trait so that orchestration logic can be
//! exercised against scripted runtimes, and through [`DriverSession`] so that
//! freshness and liveness rules are enforced in exactly one place.
//!
//! Sessions are owned by a single retrieval call.  The search path always
//! launches fresh; only the orders-listing path may reuse a session across
//! sequential calls, guarded by a check-liveness-or-recreate probe.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// Opaque handle to an element located by a [`DriverRuntime`].
///
/// Handles are only valid for the page state they were located on; runtimes
/// may invalidate them after navigation.
pub type ElementId = u64;

/// Errors surfaced by browser driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("timed out after {timeout_ms} ms waiting for '{selector}'")]
    WaitTimeout { selector: String, timeout_ms: u64 },
    #[error("{what} timed out")]
    Timeout { what: String },
    #[error("element {0} is no longer tracked")]
    StaleElement(ElementId),
    #[error("browser command failed: {0}")]
    Command(String),
    #[error("browser session is not alive")]
    SessionDead,
}

/// Options controlling how a browser session is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub show_browser: bool,
    pub page_load_timeout: Duration,
    pub implicit_wait: Duration,
    pub user_agent: String,
    pub chrome_executable: Option<PathBuf>,
}

impl LaunchOptions {
    /// Effective visibility: `show_browser` wins over `headless`.
    pub fn visible(&self) -> bool {
        self.show_browser || !self.headless
    }
}

/// The browser automation capability consumed by the engine.
///
/// All operations are blocking-with-timeout from the engine's perspective;
/// there is no cooperative suspension model beyond the async runtime itself.
#[async_trait]
pub trait DriverRuntime: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    async fn refresh(&self) -> Result<(), DriverError>;

    /// Locate the first element matching a CSS selector. Absence is not an
    /// error; probing chains depend on `Ok(None)`.
    async fn find_element(&self, css: &str) -> Result<Option<ElementId>, DriverError>;

    async fn find_elements(&self, css: &str) -> Result<Vec<ElementId>, DriverError>;

    /// Poll for an element until it appears or the window elapses.
    async fn wait_for(&self, css: &str, timeout: Duration) -> Result<ElementId, DriverError>;

    /// Set a `<select>` control to the option with the given value.
    async fn select_value(&self, element: ElementId, value: &str) -> Result<(), DriverError>;

    /// Clear an input and type the given text into it.
    async fn type_text(&self, element: ElementId, text: &str) -> Result<(), DriverError>;

    async fn click(&self, element: ElementId) -> Result<(), DriverError>;

    async fn element_text(&self, element: ElementId) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: ElementId,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn is_enabled(&self, element: ElementId) -> Result<bool, DriverError>;

    /// Capture the rendered bitmap of a single element as PNG bytes.
    async fn screenshot(&self, element: ElementId) -> Result<Vec<u8>, DriverError>;

    async fn page_source(&self) -> Result<String, DriverError>;

    /// Cheap liveness probe; `false` means the session must be replaced.
    async fn is_alive(&self) -> bool;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Constructs fresh [`DriverRuntime`] instances.
///
/// Construction failure is reported, never retried here; retry is the
/// orchestrator's responsibility.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn DriverRuntime>, DriverError>;
}

/// Probe an ordered list of selectors, returning the first present element.
pub async fn first_match(
    driver: &dyn DriverRuntime,
    selectors: &[&str],
) -> Result<Option<ElementId>, DriverError> {
    for selector in selectors {
        if let Some(element) = driver.find_element(selector).await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

/// A live browser session with an age bound.
///
/// A session older than `max_age`, or one whose liveness probe fails, must be
/// discarded and replaced before reuse.
pub struct DriverSession {
    runtime: Box<dyn DriverRuntime>,
    created_at: Instant,
    max_age: Duration,
}

impl DriverSession {
    pub fn new(runtime: Box<dyn DriverRuntime>, max_age: Duration) -> Self {
        Self {
            runtime,
            created_at: Instant::now(),
            max_age,
        }
    }

    pub fn runtime(&self) -> &dyn DriverRuntime {
        self.runtime.as_ref()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.max_age
    }

    /// Whether the session may be reused: young enough and still answering.
    pub async fn probe_alive(&self) -> bool {
        !self.is_expired() && self.runtime.is_alive().await
    }

    /// Close the underlying browser, swallowing close errors so a teardown
    /// failure never masks the real outcome.
    pub async fn close(self) {
        let _ = self.runtime.close().await;
    }
}

impl std::fmt::Debug for DriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSession")
            .field("age_ms", &self.age().as_millis())
            .field("max_age_ms", &self.max_age.as_millis())
            .finish()
    }
}

/// Session acquisition and release for the engine.
pub struct SessionManager<F: DriverFactory> {
    factory: F,
    options: LaunchOptions,
    max_age: Duration,
    reusable: tokio::sync::Mutex<Option<DriverSession>>,
}

impl<F: DriverFactory> SessionManager<F> {
    pub fn new(factory: F, options: LaunchOptions, max_age: Duration) -> Self {
        Self {
            factory,
            options,
            max_age,
            reusable: tokio::sync::Mutex::new(None),
        }
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Launch a fresh session. The case-search path calls this once per
    /// attempt; sessions are never shared across concurrent searches.
    pub async fn acquire(&self) -> Result<DriverSession, DriverError> {
        let runtime = self.factory.launch(&self.options).await?;
        Ok(DriverSession::new(runtime, self.max_age))
    }

    /// Release a session on any exit path; close errors are swallowed.
    pub async fn release(&self, session: DriverSession) {
        session.close().await;
    }

    /// Acquire a session for the orders path, reusing the stashed one when it
    /// is still fresh and alive, otherwise replacing it.
    pub async fn acquire_reusable(&self) -> Result<DriverSession, DriverError> {
        let cached = self.reusable.lock().await.take();
        if let Some(session) = cached {
            if session.probe_alive().await {
                return Ok(session);
            }
            session.close().await;
        }
        self.acquire().await
    }

    /// Hand a session back for sequential reuse by the orders path.
    pub async fn stash(&self, session: DriverSession) {
        let mut slot = self.reusable.lock().await;
        if let Some(previous) = slot.replace(session) {
            previous.close().await;
        }
    }

    /// Close any stashed session.
    pub async fn shutdown(&self) {
        if let Some(session) = self.reusable.lock().await.take() {
            session.close().await;
        }
    }
}
