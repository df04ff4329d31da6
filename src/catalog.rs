//! Form metadata for caller-side display.
//!
//! The portal's form enumerates valid case-type codes and filing years.  The
//! catalog loads a captured form-structure document so the embedding
//! application can render dropdowns; the engine itself never validates a
//! request against these lists.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read form structure: {0}")]
    Io(#[from] std::io::Error),
    #[error("form structure is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One dropdown option: a submit value plus its display label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogOption {
    pub value: String,
    #[serde(alias = "text")]
    pub label: String,
}

/// Raw options are either plain strings or value/label objects, depending on
/// the capture.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOption {
    Plain(String),
    Labelled(CatalogOption),
}

impl From<RawOption> for CatalogOption {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Plain(value) => CatalogOption {
                label: value.clone(),
                value,
            },
            RawOption::Labelled(option) => option,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawField {
    #[serde(default)]
    options: Vec<RawOption>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStructure {
    #[serde(default)]
    case_type: RawField,
    #[serde(default)]
    year: RawField,
}

/// Case-type and filing-year lists for the search form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormCatalog {
    case_types: Vec<CatalogOption>,
    years: Vec<CatalogOption>,
}

impl FormCatalog {
    /// An empty catalog; callers render empty dropdowns.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let structure: RawStructure = serde_json::from_str(raw)?;
        Ok(Self {
            case_types: structure
                .case_type
                .options
                .into_iter()
                .map(CatalogOption::from)
                .collect(),
            years: structure
                .year
                .options
                .into_iter()
                .map(CatalogOption::from)
                .collect(),
        })
    }

    pub fn case_types(&self) -> &[CatalogOption] {
        &self.case_types
    }

    pub fn years(&self) -> &[CatalogOption] {
        &self.years
    }
}
