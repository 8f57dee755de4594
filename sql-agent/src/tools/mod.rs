//! Tool Implementations
//!
//! Executors for the introspection tools that need more than a single
//! introspection call:
//! - `describe_table`: cache-aware table metadata
//! - `table_sample`: bounded row sample with quoted identifiers

pub mod describe_table;
pub mod table_sample;

pub use describe_table::{DescribeTableExecutor, DescribeTableInput, MetadataSource};
pub use table_sample::{TableSampleExecutor, TableSampleInput, TableSampleOutput};

/// Collapse whitespace and truncate text for logging
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() > max_chars {
        let head: String = normalized.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("SELECT  *\n FROM orders", 50), "SELECT * FROM orders");

        let long = "SELECT id, name, email, address FROM users WHERE active = true";
        let truncated = truncate_for_log(long, 20);
        assert_eq!(truncated, "SELECT id, name, ema...");
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("ééééé", 2), "éé...");
    }
}
