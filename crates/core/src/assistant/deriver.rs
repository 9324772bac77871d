use crate::assistant::rules::RuleTable;
use crate::assistant::totals::{aggregate, confidence_pct, round2};
use crate::domain::prestation::{DerivationResult, DetectedPrestation, SuggestedLine};

pub const FALLBACK_SUBJECT: &str = "Devis de travaux paysagers";
const SUBJECT_SEPARATOR: &str = " + ";

/// Derives prestations, priced lines and totals from free text.
///
/// Pure and infallible: text that matches nothing yields an empty result with
/// a zero confidence score. Each rule fires at most once, in table order.
pub fn derive(text: &str, table: &RuleTable) -> DerivationResult {
    let lowered = text.to_lowercase();
    let mut prestations = Vec::new();
    let mut lines = Vec::new();

    for compiled in table.rules().iter().filter(|compiled| compiled.matches(&lowered)) {
        let rule = &compiled.rule;
        let quantity = compiled.quantity(&lowered, table.anywhere_pattern());
        let line_quantity = round2(quantity * rule.multiplier());

        prestations.push(DetectedPrestation {
            label: rule.label.clone(),
            quantity,
            unit: rule.unit.clone(),
        });

        lines.extend(rule.line_templates.iter().map(|template| SuggestedLine {
            name: template.name.clone(),
            category: template.category,
            unit: template.unit.clone(),
            quantity: line_quantity,
            unit_price_ht: template.unit_price_ht,
            vat_rate_pct: template.vat_rate_pct,
            total_ht: round2(line_quantity * template.unit_price_ht),
        }));
    }

    let totals = aggregate(&lines);
    let subject = if prestations.is_empty() {
        FALLBACK_SUBJECT.to_owned()
    } else {
        prestations
            .iter()
            .map(|prestation| prestation.label.as_str())
            .collect::<Vec<_>>()
            .join(SUBJECT_SEPARATOR)
    };

    DerivationResult {
        confidence_pct: confidence_pct(prestations.len()),
        prestations,
        lines,
        total_ht: totals.total_ht,
        total_vat: totals.total_vat,
        total_ttc: totals.total_ttc,
        subject,
    }
}

impl RuleTable {
    pub fn derive(&self, text: &str) -> DerivationResult {
        derive(text, self)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::assistant::rules::RuleTable;
    use crate::domain::prestation::ItemCategory;

    use super::{derive, FALLBACK_SUBJECT};

    #[test]
    fn mowing_request_yields_one_prestation_and_two_lines() {
        let result = derive("Tonte de gazon sur 200m²", RuleTable::builtin());

        assert_eq!(result.prestations.len(), 1);
        let prestation = &result.prestations[0];
        assert!(prestation.label.contains("Tonte"));
        assert_eq!(prestation.quantity, Decimal::new(200, 0));
        assert_eq!(prestation.unit, "m²");

        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[0].category, ItemCategory::Labor);
        assert_eq!(result.lines[1].category, ItemCategory::Supply);
        assert!(result.lines.iter().all(|line| line.quantity == Decimal::new(200, 0)));

        assert_eq!(result.total_ht, Decimal::new(80, 0));
        assert_eq!(result.total_vat, Decimal::new(16, 0));
        assert_eq!(result.total_ttc, Decimal::new(96, 0));
        assert_eq!(result.confidence_pct, 57);
        assert_eq!(result.subject, "Tonte de pelouse");
    }

    #[test]
    fn unrelated_text_detects_nothing() {
        let result = derive("Bonjour, pouvez-vous m'appeler", RuleTable::builtin());

        assert!(result.prestations.is_empty());
        assert!(result.lines.is_empty());
        assert_eq!(result.confidence_pct, 0);
        assert_eq!(result.total_ttc, Decimal::ZERO);
        assert_eq!(result.subject, FALLBACK_SUBJECT);
    }

    #[test]
    fn no_match_holds_for_long_noisy_text() {
        let noisy = "Merci pour votre retour du 12/03, 4500 euros, appelez le 0612345678. ".repeat(200);
        let result = derive(&noisy, RuleTable::builtin());

        assert!(result.lines.is_empty());
        assert_eq!(result.confidence_pct, 0);
    }

    #[test]
    fn prestations_follow_table_order_not_text_order() {
        let result = derive("Taille de 30 ml de haie puis tonte de 150 m²", RuleTable::builtin());
        let labels: Vec<_> = result.prestations.iter().map(|p| p.label.as_str()).collect();

        assert_eq!(labels, vec!["Tonte de pelouse", "Taille de haies"]);
        assert_eq!(result.prestations[0].quantity, Decimal::new(150, 0));
        assert_eq!(result.prestations[1].quantity, Decimal::new(30, 0));
        assert_eq!(result.subject, "Tonte de pelouse + Taille de haies");
        assert_eq!(result.confidence_pct, 69);
    }

    #[test]
    fn repeated_keywords_fire_a_rule_once() {
        let result = derive("tonte, tonte et encore tonte de la pelouse", RuleTable::builtin());
        assert_eq!(result.prestations.len(), 1);
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn missing_quantity_uses_rule_default() {
        let result = derive("Élagage du vieux chêne", RuleTable::builtin());

        assert_eq!(result.prestations.len(), 1);
        assert_eq!(result.prestations[0].quantity, Decimal::ONE);
        assert_eq!(result.lines[0].total_ht, Decimal::new(180, 0));
    }

    #[test]
    fn multiplier_converts_area_into_billing_unit() {
        let result = derive("allée en gravier de 25 m²", RuleTable::builtin());

        assert_eq!(result.prestations[0].quantity, Decimal::new(25, 0));
        assert_eq!(result.lines[0].unit, "t");
        assert_eq!(result.lines[0].quantity, Decimal::new(2, 0));
        assert_eq!(result.lines[0].total_ht, Decimal::new(130, 0));
        assert_eq!(result.lines[1].total_ht, Decimal::new(90, 0));
    }

    #[test]
    fn line_quantities_and_totals_are_rounded_to_cents() {
        let result = derive("allée gravier 12,345 m²", RuleTable::builtin());

        // 12.345 * 0.08 = 0.9876 -> 0.99 t
        assert_eq!(result.lines[0].quantity, Decimal::new(99, 2));
        assert_eq!(result.lines[0].total_ht, Decimal::new(6_435, 2));
        assert_eq!(result.total_ht, result.lines.iter().map(|line| line.total_ht).sum());
    }

    #[test]
    fn derivation_is_deterministic() {
        let text = "Plantation de 12 arbustes et arrosage goutte-à-goutte 40 ml";
        assert_eq!(derive(text, RuleTable::builtin()), RuleTable::builtin().derive(text));
    }

    #[test]
    fn confidence_is_capped() {
        let text = "tonte, haie, élagage, friche, semis, gravier, plantation, arrosage";
        let result = derive(text, RuleTable::builtin());

        assert_eq!(result.prestations.len(), 8);
        assert_eq!(result.confidence_pct, 95);
    }
}
