use docrank_core::RankedResult;

pub const NO_RESULTS: &str = "No relevant information found.";

const CONTEXT_HEADER: &str = "=== RELEVANT DOCUMENTATION ===";
const CONTEXT_FOOTER: &str = "=== END DOCUMENTATION ===";

/// Render results as a plain-text block for a downstream prompt.
pub fn format_context(results: &[RankedResult]) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }
    let rule = "-".repeat(60);
    let mut out = format!("{CONTEXT_HEADER}\n\nRetrieved {} relevant sections:\n\n", results.len());
    for r in results {
        out.push_str(&r.format_for_context());
        out.push('\n');
        out.push_str(&rule);
        out.push_str("\n\n");
    }
    out.push_str(CONTEXT_FOOTER);
    out
}

/// `[key] section (source)` for every result, in order.
pub fn citations(results: &[RankedResult]) -> Vec<String> {
    results.iter().map(RankedResult::format_citation).collect()
}
