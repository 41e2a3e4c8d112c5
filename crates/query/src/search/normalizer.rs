//! Search term normalization.
//!
//! Turns a raw search string into a bounded list of clean terms:
//! lowercase (unless case-sensitive), strip diacritics, collapse
//! whitespace, split into words and double-quoted phrases, drop stop-words
//! and keep at most `max_terms`.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use super::SearchTerms;
use crate::config::SearchSettings;
use crate::error::SearchError;

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("valid token regex"))
}

/// Normalizes `raw` into search terms.
///
/// Fails if a token is empty or shorter than `min_term_length` after its
/// surrounding quotes are trimmed. Empty input yields no terms.
pub fn normalize(raw: &str, settings: &SearchSettings) -> Result<SearchTerms, SearchError> {
    let cased = if settings.case_sensitive {
        raw.to_string()
    } else {
        raw.to_lowercase()
    };
    let folded = transliterate(&cased);
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut terms = Vec::new();
    for captures in token_regex().captures_iter(&collapsed) {
        let token = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let term = token.trim().trim_matches(|c| c == '"' || c == '\'').trim();

        if term.is_empty() {
            return Err(SearchError::EmptySearchTerm);
        }
        if term.chars().count() < settings.min_term_length {
            return Err(SearchError::SearchTermTooShort {
                term: term.to_string(),
                min_length: settings.min_term_length,
            });
        }
        if is_blacklisted(term, &settings.blacklist) {
            debug!(term = %term, "Dropping blacklisted search term");
            continue;
        }
        terms.push(term.to_string());
    }

    if terms.len() > settings.max_terms {
        debug!(
            count = terms.len(),
            max = settings.max_terms,
            "Truncating search terms"
        );
        terms.truncate(settings.max_terms);
    }

    Ok(SearchTerms::new(terms))
}

fn is_blacklisted(term: &str, blacklist: &[String]) -> bool {
    let folded = transliterate(&term.to_lowercase());
    blacklist
        .iter()
        .any(|word| transliterate(&word.to_lowercase()) == folded)
}

/// Strips diacritics and folds letters without a decomposition.
///
/// Characters with no ASCII base are kept as they are.
pub fn transliterate(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'ø' => out.push('o'),
            'Ø' => out.push('O'),
            'ł' => out.push('l'),
            'Ł' => out.push('L'),
            'đ' => out.push('d'),
            'Đ' => out.push('D'),
            'þ' => out.push_str("th"),
            'Þ' => out.push_str("TH"),
            other => out.push(other),
        }
    }
    out.nfc().collect()
}
