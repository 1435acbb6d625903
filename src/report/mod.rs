//! Memcheck report analysis
//!
//! Turns the text a memory checker prints (Valgrind memcheck's layout, or
//! [`Heap::render_summary`](crate::memory::heap::Heap::render_summary)) into a
//! structured [`Report`]:
//!
//! - [`parse`]: splits the output into error blocks and sorts them into
//!   [`Category`]s, and extracts the heap-usage and leak summaries
//! - [`compare`]: filters a report down to chosen categories and diffs two
//!   reports of the same program
//!
//! Reports serialize to JSON with camelCase keys.

pub mod compare;
pub mod parse;

pub use compare::{compare, CategoryDifference, Comparison, FilteredReport, FilteredSummary};
pub use parse::categorize;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Error categories a report is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    MemoryLeaks,
    InvalidAccess,
    UninitializedValues,
    SystemCalls,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::MemoryLeaks,
        Category::InvalidAccess,
        Category::UninitializedValues,
        Category::SystemCalls,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::MemoryLeaks => "memoryLeaks",
            Category::InvalidAccess => "invalidAccess",
            Category::UninitializedValues => "uninitializedValues",
            Category::SystemCalls => "systemCalls",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Categorized error messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Categories {
    pub memory_leaks: Vec<String>,
    pub invalid_access: Vec<String>,
    pub uninitialized_values: Vec<String>,
    pub system_calls: Vec<String>,
}

impl Categories {
    pub fn get(&self, category: Category) -> &[String] {
        match category {
            Category::MemoryLeaks => &self.memory_leaks,
            Category::InvalidAccess => &self.invalid_access,
            Category::UninitializedValues => &self.uninitialized_values,
            Category::SystemCalls => &self.system_calls,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::MemoryLeaks => &mut self.memory_leaks,
            Category::InvalidAccess => &mut self.invalid_access,
            Category::UninitializedValues => &mut self.uninitialized_values,
            Category::SystemCalls => &mut self.system_calls,
        }
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|&c| self.get(c).len()).sum()
    }

    pub fn counts(&self) -> BTreeMap<Category, usize> {
        Category::ALL
            .iter()
            .map(|&c| (c, self.get(c).len()))
            .collect()
    }
}

/// `total heap usage` line, as numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapUsage {
    pub allocations: u64,
    pub frees: u64,
    pub bytes_allocated: u64,
}

/// `total heap usage` line, formatted for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapUsageSummary {
    pub allocations: String,
    pub frees: String,
    pub bytes_allocated: String,
    pub unfreed_allocations: String,
}

impl HeapUsage {
    pub fn unfreed(&self) -> i64 {
        self.allocations as i64 - self.frees as i64
    }

    pub fn summarize(&self) -> HeapUsageSummary {
        HeapUsageSummary {
            allocations: group_thousands(self.allocations as i64),
            frees: group_thousands(self.frees as i64),
            bytes_allocated: format_bytes(self.bytes_allocated),
            unfreed_allocations: group_thousands(self.unfreed()),
        }
    }
}

/// One line of the leak summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakInfo {
    /// e.g. `"1,024 bytes"`
    pub bytes: String,
    pub blocks: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakSummary {
    pub definitely_lost: Option<LeakInfo>,
    pub indirectly_lost: Option<LeakInfo>,
    pub possibly_lost: Option<LeakInfo>,
    pub still_reachable: Option<LeakInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_errors: usize,
    pub category_counts: BTreeMap<Category, usize>,
    /// Wall-clock runtime of the analyzed program, `"Not available"` if unknown
    pub runtime: String,
    pub heap_usage: Option<HeapUsageSummary>,
    pub memory_leak_summary: LeakSummary,
}

/// A categorized memcheck report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub categories: Categories,
    pub summary: Summary,
    #[serde(skip)]
    pub heap_usage: Option<HeapUsage>,
    pub raw_output: String,
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Human-readable byte count: bytes, then KB/MB/GB with two decimals
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} bytes", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// `1234567` → `"1,234,567"`
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 bytes");
        assert_eq!(format_bytes(1023), "1023 bytes");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(group_thousands(-1500), "-1,500");
    }

    #[test]
    fn test_category_names_round_trip() {
        for c in Category::ALL {
            assert_eq!(c.name().parse::<Category>().unwrap(), c);
        }
        assert!("heapUsage".parse::<Category>().is_err());
    }

    #[test]
    fn test_unfreed_can_go_negative() {
        let usage = HeapUsage {
            allocations: 1,
            frees: 2,
            bytes_allocated: 10,
        };
        assert_eq!(usage.summarize().unfreed_allocations, "-1");
    }
}
