use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::assistant::extract::{anywhere_pattern, KeywordPatterns, MAX_QUANTITY};
use crate::domain::prestation::{ItemCategory, KeywordRule, LineTemplate};

const MAX_MULTIPLIER: Decimal = Decimal::from_parts(1_000, 0, 0, false, 0);
const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

#[derive(Debug, Error)]
pub enum RuleTableError {
    #[error("could not read rule table `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse rule table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule table contains no rule")]
    Empty,
    #[error("invalid rule #{index} (`{label}`): {reason}")]
    InvalidRule { index: usize, label: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<KeywordRule>,
}

#[derive(Clone, Debug)]
pub struct CompiledRule {
    pub rule: KeywordRule,
    patterns: KeywordPatterns,
}

impl CompiledRule {
    fn compile(rule: KeywordRule) -> Self {
        let patterns = KeywordPatterns::for_keyword(rule.primary_keyword().unwrap_or_default());
        Self { rule, patterns }
    }

    pub fn matches(&self, lowered: &str) -> bool {
        self.rule.keywords.iter().any(|keyword| lowered.contains(keyword.as_str()))
    }

    pub fn quantity(&self, lowered: &str, anywhere: Option<&Regex>) -> Decimal {
        self.patterns.extract(lowered, anywhere).unwrap_or(self.rule.default_quantity)
    }
}

/// Immutable, ordered rule table. Order decides output order.
#[derive(Clone, Debug)]
pub struct RuleTable {
    rules: Arc<[CompiledRule]>,
    anywhere: Option<Regex>,
}

impl RuleTable {
    /// Callers validate first.
    fn compile(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules: rules.into_iter().map(CompiledRule::compile).collect(),
            anywhere: anywhere_pattern(),
        }
    }

    pub fn new(rules: Vec<KeywordRule>) -> Result<Self, RuleTableError> {
        validate_rules(&rules)?;
        Ok(Self::compile(rules))
    }

    /// Built-in landscaping catalog, compiled once per process.
    pub fn builtin() -> &'static RuleTable {
        static BUILTIN: OnceLock<RuleTable> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let rules = builtin_rules();
            debug_assert!(validate_rules(&rules).is_ok(), "built-in rule table is invalid");
            Self::compile(rules)
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleTableError> {
        let file = toml::from_str::<RuleFile>(raw)?;
        Self::new(file.rules)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleTableError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RuleTableError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given, otherwise clones the built-in table.
    pub fn load(path: Option<&Path>) -> Result<Self, RuleTableError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin().clone()),
        }
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn anywhere_pattern(&self) -> Option<&Regex> {
        self.anywhere.as_ref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub fn validate_rules(rules: &[KeywordRule]) -> Result<(), RuleTableError> {
    if rules.is_empty() {
        return Err(RuleTableError::Empty);
    }

    for (index, rule) in rules.iter().enumerate() {
        let invalid = |reason: &str| RuleTableError::InvalidRule {
            index,
            label: rule.label.clone(),
            reason: reason.to_owned(),
        };

        if rule.keywords.is_empty() {
            return Err(invalid("at least one keyword is required"));
        }
        if rule.keywords.iter().any(|keyword| keyword.trim().is_empty()) {
            return Err(invalid("keywords must not be blank"));
        }
        if rule.keywords.iter().any(|keyword| keyword.to_lowercase() != *keyword) {
            return Err(invalid("keywords must be lowercase"));
        }
        if rule.label.trim().is_empty() || rule.unit.trim().is_empty() {
            return Err(invalid("label and unit are required"));
        }
        if rule.default_quantity <= Decimal::ZERO || rule.default_quantity > MAX_QUANTITY {
            return Err(invalid("default_quantity must be in (0, 1000000000]"));
        }
        if rule.multiplier() <= Decimal::ZERO || rule.multiplier() > MAX_MULTIPLIER {
            return Err(invalid("quantity_multiplier must be in (0, 1000]"));
        }
        if rule.line_templates.is_empty() {
            return Err(invalid("at least one line template is required"));
        }
        for template in &rule.line_templates {
            if template.name.trim().is_empty() || template.unit.trim().is_empty() {
                return Err(invalid("line templates need a name and a unit"));
            }
            if template.unit_price_ht < Decimal::ZERO || template.unit_price_ht > MAX_UNIT_PRICE {
                return Err(invalid("unit_price_ht must be in [0, 1000000000]"));
            }
            if template.vat_rate_pct < Decimal::ZERO || template.vat_rate_pct > Decimal::ONE_HUNDRED
            {
                return Err(invalid("vat_rate_pct must be in [0, 100]"));
            }
        }
    }

    Ok(())
}

fn rule(
    keywords: &[&str],
    label: &str,
    unit: &str,
    default_quantity: Decimal,
    quantity_multiplier: Option<Decimal>,
    line_templates: Vec<LineTemplate>,
) -> KeywordRule {
    KeywordRule {
        keywords: keywords.iter().map(|keyword| (*keyword).to_owned()).collect(),
        label: label.to_owned(),
        unit: unit.to_owned(),
        default_quantity,
        quantity_multiplier,
        line_templates,
    }
}

fn line(name: &str, category: ItemCategory, unit: &str, cents: i64, vat_pct: i64) -> LineTemplate {
    LineTemplate {
        name: name.to_owned(),
        category,
        unit: unit.to_owned(),
        unit_price_ht: Decimal::new(cents, 2),
        vat_rate_pct: Decimal::new(vat_pct, 0),
    }
}

pub fn builtin_rules() -> Vec<KeywordRule> {
    use ItemCategory::{Labor, Material, Rental, Supply};

    vec![
        rule(
            &["tonte", "tondre", "pelouse", "gazon"],
            "Tonte de pelouse",
            "m²",
            Decimal::new(100, 0),
            None,
            vec![
                line("Main d'oeuvre tonte", Labor, "m²", 35, 20),
                line("Évacuation des déchets de tonte", Supply, "m²", 5, 20),
            ],
        ),
        rule(
            &["haie", "taille", "tailler"],
            "Taille de haies",
            "ml",
            Decimal::new(20, 0),
            None,
            vec![
                line("Main d'oeuvre taille de haies", Labor, "ml", 450, 20),
                line("Évacuation des déchets verts", Supply, "ml", 80, 20),
            ],
        ),
        rule(
            &["élagage", "elagage", "élaguer", "elaguer", "arbre"],
            "Élagage d'arbres",
            "u",
            Decimal::ONE,
            None,
            vec![
                line("Élagage par arbre", Labor, "u", 18_000, 20),
                line("Location nacelle", Rental, "u", 9_500, 20),
            ],
        ),
        rule(
            &["débroussaill", "debroussaill", "broussaille", "friche"],
            "Débroussaillage",
            "m²",
            Decimal::new(200, 0),
            None,
            vec![
                line("Main d'oeuvre débroussaillage", Labor, "m²", 60, 20),
                line("Évacuation des végétaux", Supply, "m²", 10, 20),
            ],
        ),
        rule(
            &["engazonnement", "semis", "semer", "gazon neuf"],
            "Engazonnement",
            "m²",
            Decimal::new(100, 0),
            None,
            vec![
                line("Semences gazon (fourniture)", Material, "m²", 45, 10),
                line("Préparation du sol et semis", Labor, "m²", 250, 10),
            ],
        ),
        rule(
            &["gravier", "gravillon", "allée"],
            "Allée gravillonnée",
            "m²",
            Decimal::new(20, 0),
            // 5 cm at 1.6 t/m³: tonnes per m².
            Some(Decimal::new(8, 2)),
            vec![
                line("Gravier concassé 10/14", Material, "t", 6_500, 20),
                line("Mise en oeuvre du gravier", Labor, "t", 4_500, 20),
            ],
        ),
        rule(
            &["plantation", "planter", "arbuste", "massif"],
            "Plantation d'arbustes",
            "u",
            Decimal::new(5, 0),
            None,
            vec![
                line("Arbustes (fourniture)", Material, "u", 2_500, 10),
                line("Plantation", Labor, "u", 1_500, 10),
            ],
        ),
        rule(
            &["arrosage", "irrigation", "goutte-à-goutte", "goutte à goutte"],
            "Arrosage automatique",
            "ml",
            Decimal::new(30, 0),
            None,
            vec![
                line("Tuyau goutte-à-goutte", Material, "ml", 120, 20),
                line("Pose du réseau d'arrosage", Labor, "ml", 600, 20),
            ],
        ),
    ]
}
