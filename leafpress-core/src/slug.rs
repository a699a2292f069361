//! Heading anchor slugs.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

static HYPHEN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid hyphen regex"));

/// Convert heading text to an anchor id.
///
/// Lowercases, turns whitespace and underscores into hyphens, drops
/// punctuation (keeping non-ASCII letters) and collapses hyphen runs.
///
/// ```
/// use leafpress_core::slugify;
///
/// assert_eq!(slugify("Getting Started"), "getting-started");
/// assert_eq!(slugify("Why `Pin<T>`?"), "why-pint");
/// ```
pub fn slugify(input: &str) -> String {
    let cleaned: String = input
        .to_lowercase()
        .graphemes(true)
        .filter_map(|g| {
            let c = g.chars().next()?;
            if c.is_whitespace() || c == '_' {
                Some("-")
            } else if c.is_alphanumeric() || c == '-' {
                Some(g)
            } else {
                None
            }
        })
        .collect();

    HYPHEN_RUNS
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}
