//! Printers the service can slice for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One entry of the supported-printer list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedPrinter {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SupportedPrinter {
    pub fn new(brand: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            extra: Map::new(),
        }
    }
}

/// Keep only entries that name a model.
pub fn filter_supported(items: Vec<SupportedPrinter>) -> Vec<SupportedPrinter> {
    items
        .into_iter()
        .filter(|p| !p.model.trim().is_empty())
        .collect()
}

/// Unique manufacturer names, sorted.
pub fn manufacturers(printers: &[SupportedPrinter]) -> Vec<String> {
    printers
        .iter()
        .filter(|p| !p.brand.is_empty())
        .map(|p| p.brand.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Models offered by one manufacturer, in catalog order.
pub fn models_for<'a>(printers: &'a [SupportedPrinter], manufacturer: &str) -> Vec<&'a str> {
    printers
        .iter()
        .filter(|p| p.brand == manufacturer)
        .map(|p| p.model.as_str())
        .collect()
}
