use std::fmt::Write;

use crate::hybrid::HybridResult;

/// One-line rendering: `[id] (score) [type] title`.
pub fn format_result(result: &HybridResult) -> String {
    format!(
        "[{}] ({:.2}) [{}] {}",
        result.id, result.score, result.obs_type, result.title
    )
}

/// One line per result, or `No results found.` for an empty list.
pub fn format_results(results: &[HybridResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let mut out = String::new();
    for result in results {
        let _ = writeln!(out, "{}", format_result(result));
    }
    out
}
