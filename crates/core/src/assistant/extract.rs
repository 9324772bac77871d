//! Quantity extraction from lowercased free text.
//!
//! Three patterns are tried in order, first hit wins:
//! a number placed before the primary keyword (`200m² de tonte`), a number
//! placed after it (`tonte de 200m²`), then the first number found anywhere.

use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;

const NUMBER: &str = r"([0-9]+(?:[.,][0-9]+)?)";
// Longer spellings first: alternation is leftmost-first.
const UNIT_SUFFIX: &str = r"(?:\s*(?:m²|m2|m³|m3|ml|mètres?|metres?|m|kg|tonnes?|t|unités?|unites?|u|arbres?|jours?|h))?";
const LINKING_WORD: &str = r"(?:(?:de|du|des)\s+|d')?";

/// Upper bound for an extracted quantity; anything larger falls back to the rule default.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

#[derive(Clone, Debug)]
pub struct KeywordPatterns {
    before_keyword: Option<Regex>,
    after_keyword: Option<Regex>,
}

impl KeywordPatterns {
    pub fn for_keyword(keyword: &str) -> Self {
        let keyword = regex::escape(keyword);
        Self {
            before_keyword: Regex::new(&format!(r"{NUMBER}{UNIT_SUFFIX}\s*{LINKING_WORD}{keyword}"))
                .ok(),
            after_keyword: Regex::new(&format!(r"{keyword}\s*{LINKING_WORD}{NUMBER}")).ok(),
        }
    }

    /// Returns `None` when no pattern yields a usable quantity.
    pub fn extract(&self, lowered: &str, anywhere: Option<&Regex>) -> Option<Decimal> {
        [self.before_keyword.as_ref(), self.after_keyword.as_ref(), anywhere]
            .into_iter()
            .flatten()
            .find_map(|pattern| first_number(pattern, lowered))
    }
}

pub fn anywhere_pattern() -> Option<Regex> {
    Regex::new(&format!(r"{NUMBER}{UNIT_SUFFIX}")).ok()
}

fn first_number(pattern: &Regex, lowered: &str) -> Option<Decimal> {
    let captures = pattern.captures(lowered)?;
    parse_quantity(captures.get(1)?.as_str())
}

/// Accepts `.` or `,` as decimal separator.
pub fn parse_quantity(raw: &str) -> Option<Decimal> {
    let normalized = raw.replace(',', ".");
    Decimal::from_str(&normalized).ok().filter(|value| *value <= MAX_QUANTITY)
}
