//! Product Catalog
//!
//! Static mapping from product identifier to display name, price, and
//! billing mode. Injected into the payment gateway so pricing lives in
//! exactly one place.

use serde::{Deserialize, Serialize};

/// Products sold by the storefront
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductId {
    RecoveryRoadmap,
    AgencyMonthly,
    AgencyOnetime,
}

impl ProductId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductId::RecoveryRoadmap => "recovery-roadmap",
            ProductId::AgencyMonthly => "agency-monthly",
            ProductId::AgencyOnetime => "agency-onetime",
        }
    }

    /// Parse the wire identifier. Unknown products are rejected, never
    /// defaulted to something chargeable.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recovery-roadmap" => Some(ProductId::RecoveryRoadmap),
            "agency-monthly" => Some(ProductId::AgencyMonthly),
            "agency-onetime" => Some(ProductId::AgencyOnetime),
            _ => None,
        }
    }

    /// All sellable products, in display order
    pub fn all() -> [ProductId; 3] {
        [
            ProductId::RecoveryRoadmap,
            ProductId::AgencyMonthly,
            ProductId::AgencyOnetime,
        ]
    }

    /// Get the catalog entry for this product
    pub fn product(&self) -> Product {
        match self {
            ProductId::RecoveryRoadmap => Product {
                display_name: "KWP Recovery Roadmap".into(),
                price_cents: 1499,
                billing: BillingMode::OneTime,
            },
            ProductId::AgencyMonthly => Product {
                display_name: "KWP Agency Program (Monthly)".into(),
                price_cents: 9900,
                billing: BillingMode::RecurringMonthly,
            },
            ProductId::AgencyOnetime => Product {
                display_name: "KWP Agency Program (Lifetime)".into(),
                price_cents: 49900,
                billing: BillingMode::OneTime,
            },
        }
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing mode for a product
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    OneTime,
    RecurringMonthly,
}

/// Catalog entry for a product
#[derive(Clone, Debug)]
pub struct Product {
    pub display_name: String,
    pub price_cents: i64,
    pub billing: BillingMode,
}
