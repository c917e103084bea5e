//! Sequential NFA numbers of the form `<prefix>/<year>/<seq>`.
//!
//! The next number is the highest sequence already assigned in the year plus
//! one. Computing it is a read; uniqueness is enforced by storage when the
//! number is written, and the lifecycle manager retries on a duplicate.

use nfa_storage::NfaStorage;

use crate::config::NumberingConfig;
use crate::error::WorkflowError;

/// `NFA/2025/`
pub fn year_prefix(prefix: &str, year: i32) -> String {
    format!("{prefix}/{year}/")
}

/// Sequence part of `number` if it belongs to `year_prefix`.
fn sequence_of(number: &str, year_prefix: &str) -> Option<u64> {
    number.strip_prefix(year_prefix)?.parse().ok()
}

/// Next number after everything in `existing` for the given year.
///
/// Numbers from other years, other prefixes, or with a non-numeric suffix are
/// ignored. The sequence restarts at 1 each year.
pub fn next_number(existing: &[String], config: &NumberingConfig, year: i32) -> String {
    let prefix = year_prefix(&config.prefix, year);
    let next = existing
        .iter()
        .filter_map(|n| sequence_of(n, &prefix))
        .max()
        .map_or(1, |max| max + 1);
    format!("{prefix}{next:0width$}", width = config.width)
}

/// Scan storage and compute the next number for `year`.
pub async fn generate<S: NfaStorage>(
    storage: &S,
    config: &NumberingConfig,
    year: i32,
) -> Result<String, WorkflowError> {
    let existing = storage
        .list_nfa_numbers(&year_prefix(&config.prefix, year))
        .await?;
    Ok(next_number(&existing, config, year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_number_of_year_is_one() {
        let config = NumberingConfig::default();
        assert_eq!(next_number(&[], &config, 2025), "NFA/2025/0001");
    }

    #[test]
    fn takes_max_not_count() {
        let config = NumberingConfig::default();
        let existing = numbers(&["NFA/2025/0003", "NFA/2025/0010", "NFA/2025/0002"]);
        assert_eq!(next_number(&existing, &config, 2025), "NFA/2025/0011");
    }

    #[test]
    fn other_years_ignored() {
        let config = NumberingConfig::default();
        let existing = numbers(&["NFA/2024/0042", "NFA/20250/0001"]);
        assert_eq!(next_number(&existing, &config, 2025), "NFA/2025/0001");
    }

    #[test]
    fn garbage_suffix_ignored() {
        let config = NumberingConfig::default();
        let existing = numbers(&["NFA/2025/draft", "NFA/2025/0004"]);
        assert_eq!(next_number(&existing, &config, 2025), "NFA/2025/0005");
    }

    #[test]
    fn overflowing_width_keeps_digits() {
        let config = NumberingConfig::default();
        let existing = numbers(&["NFA/2025/9999"]);
        assert_eq!(next_number(&existing, &config, 2025), "NFA/2025/10000");
    }

    #[test]
    fn prefix_and_width_configurable() {
        let config = NumberingConfig {
            prefix: "PO".to_string(),
            width: 6,
            max_retries: 1,
        };
        let existing = numbers(&["NFA/2025/0007"]);
        assert_eq!(next_number(&existing, &config, 2025), "PO/2025/000001");
    }
}
