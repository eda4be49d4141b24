use regex::Regex;

fn external_reference_patterns() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^[a-z][a-z0-9+.-]*:").expect("invalid scheme regex"),
                Regex::new(r"^//").expect("invalid protocol-relative regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
            ]
        })
        .as_slice()
}

/// Determine whether an HTML reference points outside the bundle.
///
/// Scheme URLs (`https:`, `data:`, `mailto:` …), protocol-relative URLs and in-page fragments
/// are left untouched; they are never files the bundle can carry.
pub fn is_external_reference(value: &str) -> bool {
    value.trim().is_empty()
        || external_reference_patterns()
            .iter()
            .any(|pattern| pattern.is_match(value.trim()))
}

/// Remove a trailing `?query` or `#fragment` from a file reference.
pub fn strip_query(value: &str) -> &str {
    let end = value.find(['?', '#']).unwrap_or(value.len());
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::{is_external_reference, strip_query};

    #[test]
    fn ignores_http_urls() {
        assert!(is_external_reference("https://example.com"));
        assert!(is_external_reference("HTTP://example.com"));
        assert!(is_external_reference("//cdn.example.com/three.js"));
    }

    #[test]
    fn ignores_data_uris_and_fragments() {
        assert!(is_external_reference("data:image/png;base64,abc"));
        assert!(is_external_reference("mailto:user@example.com"));
        assert!(is_external_reference("#canvas"));
    }

    #[test]
    fn keeps_relative_paths() {
        assert!(!is_external_reference("models/robot.glb"));
        assert!(!is_external_reference("/src/main.js"));
        assert!(!is_external_reference("./style.css"));
    }

    #[test]
    fn strips_queries() {
        assert_eq!(strip_query("icon.png?v=2"), "icon.png");
        assert_eq!(strip_query("sprite.svg#frame"), "sprite.svg");
        assert_eq!(strip_query("plain.png"), "plain.png");
    }
}
