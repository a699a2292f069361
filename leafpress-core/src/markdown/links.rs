//! Classifying link and image targets.

const REMOTE_PREFIXES: &[&str] = &[
    "http://", "https://", "mailto:", "ftp://", "ftps://", "tel:", "data:", "//",
];

/// Where a link points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// Emitted untouched: remote URLs, bare `#fragment`s and empty targets.
    Passthrough,
    /// A file relative to the current document.
    Local {
        path: &'a str,
        fragment: Option<&'a str>,
    },
}

pub fn classify(target: &str) -> Target<'_> {
    let lower = target.to_ascii_lowercase();
    if target.is_empty()
        || target.starts_with('#')
        || REMOTE_PREFIXES.iter().any(|p| lower.starts_with(p))
    {
        return Target::Passthrough;
    }

    match target.split_once('#') {
        Some((path, fragment)) => Target::Local {
            path,
            fragment: Some(fragment),
        },
        None => Target::Local {
            path: target,
            fragment: None,
        },
    }
}
