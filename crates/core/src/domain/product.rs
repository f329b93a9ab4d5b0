use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub unit_price: Decimal,
}

impl Product {
    pub fn new(code: impl Into<String>, name: impl Into<String>, unit_price: Decimal) -> Self {
        Self { code: code.into(), name: name.into(), unit_price }
    }
}

/// Catalog keys compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
