//! Memcheck output categorizer
//!
//! Memcheck prefixes every line with `==PID==`. An error starts with an
//! unindented headline (`Invalid write of size 4`) followed by indented
//! frames (`   at 0x...: main (test.c:12)`, `   by ...`) and detail lines, and
//! ends at a blank line. The heap and leak summaries follow the last error.
//!
//! Output containing `ERROR SUMMARY: 0 errors` is taken as clean and produces
//! no categorized errors; the summaries are still extracted.

use super::{
    group_thousands, Categories, Category, HeapUsage, LeakInfo, LeakSummary, Report, Summary,
};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static PREFIXED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^==\d+==(?: (.*))?$").expect("prefix pattern"));

static INVALID_ACCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Invalid (read|write) of size (\d+)").expect("access pattern"));

static LOSS_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([\d,]+)(?: \([\d,]+ direct, [\d,]+ indirect\))? bytes in [\d,]+ blocks are (definitely|indirectly|possibly) lost",
    )
    .expect("loss record pattern")
});

static UNINIT_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Use of uninitialised value of size (\d+)").expect("uninit pattern")
});

static SYSCALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Syscall param (\S+)").expect("syscall pattern"));

static HEAP_USAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"total heap usage: ([\d,]+) allocs, ([\d,]+) frees, ([\d,]+) bytes allocated")
        .expect("heap usage pattern")
});

static LEAK_LINES: Lazy<[(&'static str, Regex); 4]> = Lazy::new(|| {
    ["definitely lost", "indirectly lost", "possibly lost", "still reachable"].map(|kind| {
        let pattern = format!(r"{}: ([\d,]+ bytes) in ([\d,]+) blocks", kind);
        (kind, Regex::new(&pattern).expect("leak summary pattern"))
    })
});

const CLEAN_MARKER: &str = "ERROR SUMMARY: 0 errors";

/// Separates an entry's message from the frames appended to it
pub(crate) const STACK_TRACE_MARKER: &str = "\nStack trace:";

/// Lines that end the error section
const SECTION_ENDS: [&str; 3] = ["HEAP SUMMARY:", "LEAK SUMMARY:", "ERROR SUMMARY:"];

/// One error: its headline and the indented lines under it
#[derive(Debug)]
struct Block<'a> {
    headline: &'a str,
    body: Vec<&'a str>,
}

impl<'a> Block<'a> {
    fn frames(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.body
            .iter()
            .copied()
            .map(str::trim)
            .filter(|line| line.starts_with("at ") || line.starts_with("by "))
    }

    fn location(&self) -> Option<&'a str> {
        self.frames()
            .find(|f| f.starts_with("at "))
            .map(|f| &f["at ".len()..])
    }
}

/// Categorize memcheck output. `runtime` is the analyzed program's wall time.
pub fn categorize(output: &str, runtime: Option<Duration>) -> Report {
    let mut categories = Categories::default();

    if !output.contains(CLEAN_MARKER) {
        for block in split_blocks(output) {
            if let Some((category, message)) = classify(&block) {
                let message = with_stack_trace(message, &block);
                categories.get_mut(category).push(message);
            } else {
                debug!("uncategorized memcheck error: {}", block.headline);
            }
        }
    }

    let leak_summary = extract_leak_summary(output);
    if categories.memory_leaks.is_empty() && !output.contains(CLEAN_MARKER) {
        // Without --leak-check=full there are no loss records, only the summary
        let lost = [
            ("definitely", &leak_summary.definitely_lost),
            ("indirectly", &leak_summary.indirectly_lost),
            ("possibly", &leak_summary.possibly_lost),
        ];
        for (kind, info) in lost {
            if let Some(info) = info.as_ref().filter(|i| !i.bytes.starts_with("0 ")) {
                categories
                    .memory_leaks
                    .push(format!("{} lost: {}", kind, info.bytes));
            }
        }
    }

    let heap_usage = extract_heap_usage(output);
    let summary = Summary {
        total_errors: categories.total(),
        category_counts: categories.counts(),
        runtime: runtime.map_or_else(
            || "Not available".to_string(),
            |d| format!("{:.2}ms", d.as_secs_f64() * 1000.0),
        ),
        heap_usage: heap_usage.map(|u| u.summarize()),
        memory_leak_summary: leak_summary,
    };

    Report {
        categories,
        summary,
        heap_usage,
        raw_output: output.to_string(),
    }
}

fn split_blocks(output: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current: Option<Block<'_>> = None;

    for line in output.lines() {
        let Some(caps) = PREFIXED_LINE.captures(line) else {
            continue;
        };
        let message = caps.get(1).map_or("", |m| m.as_str());

        if message.trim().is_empty() {
            blocks.extend(current.take());
            continue;
        }
        if SECTION_ENDS.iter().any(|end| message.starts_with(end)) {
            blocks.extend(current.take());
            continue;
        }

        if message.starts_with(char::is_whitespace) {
            if let Some(block) = current.as_mut() {
                block.body.push(message);
            }
        } else if is_headline(message) {
            blocks.extend(current.take());
            current = Some(Block {
                headline: message,
                body: Vec::new(),
            });
        }
    }
    blocks.extend(current);
    blocks
}

fn is_headline(message: &str) -> bool {
    message.starts_with("Invalid ")
        || message.starts_with("Conditional jump or move depends on uninitialised")
        || message.starts_with("Use of uninitialised")
        || message.starts_with("Uninitialised")
        || message.starts_with("Syscall param")
        || LOSS_RECORD.is_match(message)
}

fn classify(block: &Block<'_>) -> Option<(Category, String)> {
    let headline = block.headline;

    if let Some(caps) = LOSS_RECORD.captures(headline) {
        return Some((
            Category::MemoryLeaks,
            format!("{} lost: {} bytes", &caps[2], &caps[1]),
        ));
    }

    if let Some(caps) = INVALID_ACCESS.captures(headline) {
        let mut message = format!("Invalid {} of size {}", &caps[1], &caps[2]);
        if let Some(location) = block.location() {
            message.push_str(" at ");
            message.push_str(location);
        }
        return Some((Category::InvalidAccess, message));
    }

    if headline.starts_with("Invalid free()") {
        let message = match block.location() {
            Some(location) => format!("Invalid free at {}", location),
            None => "Invalid free".to_string(),
        };
        return Some((Category::InvalidAccess, message));
    }

    // Checked before the uninitialised cases: syscall headlines mention them too
    if let Some(caps) = SYSCALL.captures(headline) {
        return Some((
            Category::SystemCalls,
            format!("System call error in {}", &caps[1]),
        ));
    }

    if let Some(caps) = UNINIT_USE.captures(headline) {
        return Some((
            Category::UninitializedValues,
            format!("Uninitialized value used (size: {} bytes)", &caps[1]),
        ));
    }

    if headline.starts_with("Conditional jump") {
        return Some((
            Category::UninitializedValues,
            "Conditional jump depends on uninitialized value".to_string(),
        ));
    }

    if headline.starts_with("Uninitialised") {
        return Some((
            Category::UninitializedValues,
            "Uninitialized value used".to_string(),
        ));
    }

    None
}

fn with_stack_trace(mut message: String, block: &Block<'_>) -> String {
    let mut frames = block.frames().peekable();
    if frames.peek().is_some() {
        message.push_str(STACK_TRACE_MARKER);
        for frame in frames {
            message.push_str("\n  ");
            message.push_str(frame);
        }
    }
    message
}

fn extract_heap_usage(output: &str) -> Option<HeapUsage> {
    let caps = HEAP_USAGE.captures(output)?;
    Some(HeapUsage {
        allocations: parse_count(&caps[1])?,
        frees: parse_count(&caps[2])?,
        bytes_allocated: parse_count(&caps[3])?,
    })
}

fn extract_leak_summary(output: &str) -> LeakSummary {
    let [definitely_lost, indirectly_lost, possibly_lost, still_reachable] =
        LEAK_LINES.each_ref().map(|(_, re)| {
            let caps = re.captures(output)?;
            Some(LeakInfo {
                bytes: caps[1].to_string(),
                blocks: group_thousands(parse_count(&caps[2])? as i64),
            })
        });

    LeakSummary {
        definitely_lost,
        indirectly_lost,
        possibly_lost,
        still_reachable,
    }
}

/// `"1,024"` → `1024`
fn parse_count(text: &str) -> Option<u64> {
    text.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_end_at_blank_lines() {
        let output = "\
==7== Memcheck, a memory error detector
==7==
==7== Invalid write of size 4
==7==    at 0x109186: main (test.c:12)
==7==  Address 0x4a4b054 is 0 bytes after a block of size 20 alloc'd
==7==    at 0x483B7F3: malloc (vg_replace_malloc.c:309)
==7==    by 0x109179: main (test.c:11)
==7==
==7== HEAP SUMMARY:
";
        let blocks = split_blocks(output);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].headline, "Invalid write of size 4");
        assert_eq!(blocks[0].body.len(), 4);
        assert_eq!(blocks[0].location(), Some("0x109186: main (test.c:12)"));
        assert_eq!(blocks[0].frames().count(), 3);
    }

    #[test]
    fn test_unprefixed_lines_are_ignored() {
        let output = "Hello, Valgrind!\n==7== Invalid read of size 1\n==7==    at 0x1: f\n";
        let blocks = split_blocks(output);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].headline, "Invalid read of size 1");
    }

    #[test]
    fn test_loss_record_with_indirect_bytes() {
        let block = Block {
            headline: "1,048 (24 direct, 1,024 indirect) bytes in 1 blocks are definitely lost in loss record 3 of 3",
            body: Vec::new(),
        };
        assert_eq!(
            classify(&block),
            Some((
                Category::MemoryLeaks,
                "definitely lost: 1,048 bytes".to_string()
            ))
        );
    }

    #[test]
    fn test_syscall_wins_over_uninitialised() {
        let block = Block {
            headline: "Syscall param write(buf) points to uninitialised byte(s)",
            body: vec!["   at 0x4F4C224: write (write.c:26)"],
        };
        assert_eq!(
            classify(&block),
            Some((
                Category::SystemCalls,
                "System call error in write(buf)".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234,567"), Some(1234567));
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("x"), None);
    }
}
