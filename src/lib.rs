//! Case-status retrieval engine for the Delhi High Court public portal.
//!
//! The portal exposes no API: case data sits behind a captcha-gated,
//! form-driven results page whose HTML is only loosely structured.  This
//! crate drives an interactive browser session through that form, solves the
//! verification gate, parses whatever comes back through a tiered fallback
//! chain, and converts each lookup into exactly one typed
//! [`SearchOutcome`](types::SearchOutcome).
//!
//! The browser backend sits behind the
//! [`DriverRuntime`](driver::DriverRuntime) trait; production uses the
//! chromiumoxide runtime in [`runtime`], and tests drive the engine with
//! scripted runtimes.

pub mod captcha;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod documents;
pub mod driver;
pub mod engine;
pub mod form;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod runtime;
pub mod types;

pub use catalog::FormCatalog;
pub use config::{EngineConfig, Verbosity};
pub use engine::{CaseStatusEngine, EngineError};
pub use runtime::ChromiumFactory;
pub use types::{
    CaseRecord, DocumentLink, DocumentPayload, OrderEntry, OrdersPage, SearchOutcome,
    SearchRequest,
};
