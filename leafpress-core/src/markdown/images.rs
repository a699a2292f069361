//! Figure markup for standalone images.

use std::path::Path;

use super::html_escape;

/// SVGs are embedded in the page rather than linked.
pub fn is_vector(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
}

pub fn img_tag(src: &str, alt: &str) -> String {
    format!(
        r#"<img src="{}" alt="{}">"#,
        html_escape(src),
        html_escape(alt)
    )
}

/// Wrap `body` in a `<figure>`, captioned above or below.
pub fn figure(body: &str, caption: Option<&str>, caption_above: bool) -> String {
    let caption = caption
        .map(|c| format!("<figcaption>{c}</figcaption>\n"))
        .unwrap_or_default();
    if caption_above {
        format!("<figure>\n{caption}{body}\n</figure>\n")
    } else {
        format!("<figure>\n{body}\n{caption}</figure>\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_position() {
        let below = figure("<img>", Some("Cap"), false);
        assert_eq!(below, "<figure>\n<img>\n<figcaption>Cap</figcaption>\n</figure>\n");

        let above = figure("<img>", Some("Cap"), true);
        assert!(above.find("<figcaption>") < above.find("<img>"));

        assert_eq!(figure("<img>", None, true), "<figure>\n<img>\n</figure>\n");
    }

    #[test]
    fn detects_svg() {
        assert!(is_vector(Path::new("a/diagram.SVG")));
        assert!(!is_vector(Path::new("a/photo.png")));
        assert!(!is_vector(Path::new("svg")));
    }

    #[test]
    fn escapes_attributes() {
        assert_eq!(
            img_tag("a\"b.png", "x < y"),
            r#"<img src="a&quot;b.png" alt="x &lt; y">"#
        );
    }
}
