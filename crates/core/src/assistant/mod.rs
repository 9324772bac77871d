//! Quote assistant
//!
//! Turns a free-text description of landscaping work into detected
//! prestations, priced quote lines and HT/VAT/TTC totals by scanning an
//! ordered keyword rule table.

pub mod deriver;
pub mod extract;
pub mod rules;
pub mod totals;

pub use deriver::{derive, FALLBACK_SUBJECT};
pub use rules::{builtin_rules, CompiledRule, RuleTable, RuleTableError};
pub use totals::{aggregate, confidence_pct, round2, QuoteTotals};
