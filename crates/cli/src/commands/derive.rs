use std::path::PathBuf;

use paysage_core::assistant::RuleTable;
use tracing::info;

use crate::commands::{load_config, CommandResult, EXIT_RULE_TABLE};

pub fn run(text: &str, rules: Option<PathBuf>) -> CommandResult {
    let config = match load_config("derive") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let rules_path = rules.or(config.assistant.rules_path);
    let table = match RuleTable::load(rules_path.as_deref()) {
        Ok(table) => table,
        Err(error) => {
            return CommandResult::failure("derive", "rule_table", error.to_string(), EXIT_RULE_TABLE)
        }
    };

    let result = table.derive(text);
    info!(
        event_name = "assistant.derive.completed",
        prestations = result.prestations.len(),
        confidence_pct = result.confidence_pct,
        "quote derivation completed"
    );

    let message = if result.is_empty() {
        "no prestation detected".to_string()
    } else {
        format!("{} prestation(s) detected, total TTC {}", result.prestations.len(), result.total_ttc)
    };
    CommandResult::success_with("derive", message, &result)
}
