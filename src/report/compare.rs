//! Report filtering and comparison

use super::parse::STACK_TRACE_MARKER;
use super::{Category, Report};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// A report restricted to some categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredReport {
    pub categories: BTreeMap<Category, Vec<String>>,
    pub summary: FilteredSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredSummary {
    pub total_errors: usize,
    pub category_counts: BTreeMap<Category, usize>,
}

impl Report {
    /// Keep only the named categories; unknown names are ignored
    pub fn filter<S: AsRef<str>>(&self, names: &[S]) -> FilteredReport {
        let categories: BTreeMap<Category, Vec<String>> = names
            .iter()
            .filter_map(|name| match name.as_ref().parse::<Category>() {
                Ok(category) => Some(category),
                Err(e) => {
                    debug!("{}", e);
                    None
                }
            })
            .map(|category| (category, self.categories.get(category).to_vec()))
            .collect();

        let category_counts: BTreeMap<Category, usize> = categories
            .iter()
            .map(|(&category, errors)| (category, errors.len()))
            .collect();

        FilteredReport {
            summary: FilteredSummary {
                total_errors: category_counts.values().sum(),
                category_counts,
            },
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryDifference {
    /// Newer count minus older count
    pub difference: i64,
    /// Change relative to the older count, `"N/A"` when that was zero
    pub percentage: String,
}

/// Difference between an older and a newer report of the same program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub category_differences: BTreeMap<Category, CategoryDifference>,
    /// Errors present only in the newer report
    pub new_errors: BTreeMap<Category, Vec<String>>,
    /// Errors present only in the older report
    pub resolved_errors: BTreeMap<Category, Vec<String>>,
}

impl Comparison {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn compare(older: &Report, newer: &Report) -> Comparison {
    let mut comparison = Comparison {
        category_differences: BTreeMap::new(),
        new_errors: BTreeMap::new(),
        resolved_errors: BTreeMap::new(),
    };

    for category in Category::ALL {
        let before = older.categories.get(category);
        let after = newer.categories.get(category);

        let difference = after.len() as i64 - before.len() as i64;
        let percentage = if before.is_empty() {
            "N/A".to_string()
        } else {
            format!("{:.2}%", difference as f64 / before.len() as f64 * 100.0)
        };
        comparison.category_differences.insert(
            category,
            CategoryDifference {
                difference,
                percentage,
            },
        );

        comparison
            .new_errors
            .insert(category, missing_from(after, before));
        comparison
            .resolved_errors
            .insert(category, missing_from(before, after));
    }

    comparison
}

/// Entries of `from` whose identity does not appear in `other`
fn missing_from(from: &[String], other: &[String]) -> Vec<String> {
    from.iter()
        .filter(|error| {
            let id = identity(error);
            !other.iter().any(|o| identity(o) == id)
        })
        .cloned()
        .collect()
}

/// An entry without its stack trace; the call chain may move between builds
fn identity(entry: &str) -> &str {
    entry
        .split_once(STACK_TRACE_MARKER)
        .map_or(entry, |(message, _)| message)
}
