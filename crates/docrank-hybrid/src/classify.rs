use docrank_core::SearchStrategy;

const KEYWORD_MARKERS: &[&str] = &["code", "procedure", "policy", "specific", "exact"];

const SEMANTIC_MARKERS: &[&str] = &["what is", "explain", "how does", "why", "tell me about", "describe", "understand"];

/// True for tokens shaped like identifiers or codes: a letter followed by a
/// mix that includes at least one digit, e.g. `P0420`, `B12`.
fn is_code_like(token: &str) -> bool {
    let mut chars = token.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_with_letter
        && token.len() >= 3
        && token.chars().all(|c| c.is_ascii_alphanumeric())
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Pick the single strategy a query leans towards. Queries with both kinds of
/// signal, or neither, go to hybrid search.
pub fn classify(query: &str) -> SearchStrategy {
    let lower = query.to_lowercase();
    let keyword = lower.split(|c: char| !c.is_alphanumeric()).any(is_code_like)
        || KEYWORD_MARKERS.iter().any(|m| lower.contains(m));
    let semantic = SEMANTIC_MARKERS.iter().any(|m| lower.contains(m));
    match (keyword, semantic) {
        (true, false) => SearchStrategy::Lexical,
        (false, true) => SearchStrategy::Semantic,
        _ => SearchStrategy::Hybrid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_keywords_lean_lexical() {
        assert_eq!(classify("P0420"), SearchStrategy::Lexical);
        assert_eq!(classify("brake inspection procedure"), SearchStrategy::Lexical);
    }

    #[test]
    fn explanatory_phrasing_leans_semantic() {
        assert_eq!(classify("Explain engine braking"), SearchStrategy::Semantic);
        assert_eq!(classify("why do tires wear unevenly"), SearchStrategy::Semantic);
    }

    #[test]
    fn mixed_or_plain_queries_are_hybrid() {
        assert_eq!(classify("What is P0420?"), SearchStrategy::Hybrid);
        assert_eq!(classify("oil filter"), SearchStrategy::Hybrid);
        assert_eq!(classify(""), SearchStrategy::Hybrid);
    }

    #[test]
    fn plain_words_and_numbers_are_not_codes() {
        assert!(!is_code_like("oil"));
        assert!(!is_code_like("2024"));
        assert!(!is_code_like("a1"));
        assert!(is_code_like("p0420"));
    }
}
