use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Material,
    Labor,
    Supply,
    Rental,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::Labor => "labor",
            Self::Supply => "supply",
            Self::Rental => "rental",
        }
    }
}

/// One priced line a matched rule always produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTemplate {
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub unit_price_ht: Decimal,
    pub vat_rate_pct: Decimal,
}

/// Keyword rule mapping free text to a prestation and its priced lines.
///
/// The first keyword is the primary keyword used for quantity extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub label: String,
    pub unit: String,
    pub default_quantity: Decimal,
    #[serde(default)]
    pub quantity_multiplier: Option<Decimal>,
    #[serde(rename = "lines")]
    pub line_templates: Vec<LineTemplate>,
}

impl KeywordRule {
    pub fn primary_keyword(&self) -> Option<&str> {
        self.keywords.first().map(String::as_str)
    }

    pub fn multiplier(&self) -> Decimal {
        self.quantity_multiplier.unwrap_or(Decimal::ONE)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPrestation {
    pub label: String,
    pub quantity: Decimal,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedLine {
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price_ht: Decimal,
    pub vat_rate_pct: Decimal,
    pub total_ht: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationResult {
    pub prestations: Vec<DetectedPrestation>,
    pub lines: Vec<SuggestedLine>,
    pub total_ht: Decimal,
    pub total_vat: Decimal,
    pub total_ttc: Decimal,
    pub confidence_pct: u8,
    pub subject: String,
}

impl DerivationResult {
    pub fn is_empty(&self) -> bool {
        self.prestations.is_empty()
    }
}
