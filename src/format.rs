//! Node title formats such as `"QUE - {content}"`.
//!
//! A format is literal text with one or more `{name}` placeholders. Compiling
//! a format yields a [`Matcher`] that recognizes titles built from it and
//! extracts the text bound to the first placeholder.

use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[a-zA-Z]+\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Format cannot be empty")]
    Empty,
    #[error("Format should not contain double brackets [[ or ]]")]
    ReservedBrackets,
    #[error("Format must contain at least one variable in {{varName}} format")]
    MissingPlaceholder,
    #[error("Format does not compile: {0}")]
    Pattern(String),
}

/// Compiled title format.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    pub fn is_match(&self, title: &str) -> bool {
        self.regex.is_match(title)
    }

    /// Text bound to the first placeholder, untrimmed.
    pub fn capture<'t>(&self, title: &'t str) -> Option<&'t str> {
        self.regex
            .captures(title)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compile a format into an anchored matcher. Literal text is matched
/// verbatim, each placeholder captures lazily.
pub fn compile(format: &str) -> Result<Matcher, FormatError> {
    if format.is_empty() {
        return Err(FormatError::Empty);
    }

    let mut pattern = String::from("^");
    let mut last = 0;
    let mut placeholders = 0;
    for m in PLACEHOLDER.find_iter(format) {
        pattern.push_str(&regex::escape(&format[last..m.start()]));
        pattern.push_str("(.*?)");
        last = m.end();
        placeholders += 1;
    }
    if placeholders == 0 {
        return Err(FormatError::MissingPlaceholder);
    }
    pattern.push_str(&regex::escape(&format[last..]));
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| FormatError::Pattern(e.to_string()))?;
    Ok(Matcher { regex })
}

/// Extract the content part of a title. Falls back to the title itself when
/// the format is unusable or the title was not built from it.
pub fn extract_content_from_title(format: &str, title: &str) -> String {
    if format.is_empty() {
        return title.to_string();
    }
    let matcher = match compile(format) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Cannot compile format {:?}: {}", format, e);
            return title.to_string();
        }
    };
    match matcher.capture(title).map(str::trim) {
        Some(content) if !content.is_empty() => content.to_string(),
        _ => title.to_string(),
    }
}

pub fn validate_node_format(format: &str) -> Result<(), FormatError> {
    if format.is_empty() {
        return Err(FormatError::Empty);
    }
    if format.contains("[[") || format.contains("]]") {
        return Err(FormatError::ReservedBrackets);
    }
    if !PLACEHOLDER.is_match(format) {
        return Err(FormatError::MissingPlaceholder);
    }
    Ok(())
}

/// Build a title by substituting `content` into every placeholder.
pub fn format_title(format: &str, content: &str) -> String {
    PLACEHOLDER
        .replace_all(format, regex::NoExpand(content))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        assert_eq!(validate_node_format(""), Err(FormatError::Empty));
    }

    #[test]
    fn test_validate_rejects_brackets() {
        assert_eq!(
            validate_node_format("[[CLM]] - {content}"),
            Err(FormatError::ReservedBrackets)
        );
        assert_eq!(
            validate_node_format("CLM - {content}]]"),
            Err(FormatError::ReservedBrackets)
        );
    }

    #[test]
    fn test_validate_requires_placeholder() {
        for format in ["CLM - content", "CLM - {}", "CLM - {1}", "CLM - {con tent}"] {
            assert_eq!(
                validate_node_format(format),
                Err(FormatError::MissingPlaceholder),
                "{format}"
            );
        }
        assert!(validate_node_format("CLM - {content}").is_ok());
    }

    #[test]
    fn test_valid_formats_compile() {
        let formats = [
            "QUE - {content}",
            "{content}",
            "(EVD) {content} [draft]",
            "$^.*+?|\\ {content} ()",
            "{a} and {b}",
            "@{content}@",
        ];
        for format in formats {
            assert!(validate_node_format(format).is_ok(), "{format}");
            assert!(compile(format).is_ok(), "{format}");
        }
    }

    #[test]
    fn test_extract_round_trip() {
        let formats = [
            "QUE - {content}",
            "{content}",
            "(EVD) {content} [draft]",
            "$^.*+?|\\ {content} ()",
            "CLM: {title}.",
        ];
        let contents = ["Does sleep improve recall?", "a.b*c", "ユーザー調査", "x"];
        for format in formats {
            for content in contents {
                let title = format_title(format, content);
                assert_eq!(extract_content_from_title(format, &title), content, "{format}");
            }
        }
    }

    #[test]
    fn test_extract_trims_capture() {
        assert_eq!(
            extract_content_from_title("QUE - {content}", "QUE -    padded   "),
            "padded"
        );
    }

    #[test]
    fn test_extract_falls_back_to_title() {
        assert_eq!(extract_content_from_title("", "Some title"), "Some title");
        assert_eq!(extract_content_from_title("CLM - {content}", "Other"), "Other");
        assert_eq!(extract_content_from_title("no placeholder", "no placeholder"), "no placeholder");
        assert_eq!(extract_content_from_title("CLM - {content}", "CLM - "), "CLM - ");
    }

    #[test]
    fn test_multiple_placeholders_capture_first() {
        let matcher = compile("{a} vs {b}").unwrap();
        assert_eq!(matcher.capture("cats vs dogs"), Some("cats"));
    }

    #[test]
    fn test_matcher_is_anchored() {
        let matcher = compile("CLM - {content}").unwrap();
        assert!(matcher.is_match("CLM - x"));
        assert!(!matcher.is_match("prefix CLM - x"));
        assert_eq!(matcher.as_str(), r"^CLM \- (.*?)$");
    }

    #[test]
    fn test_format_title_literal_content() {
        assert_eq!(format_title("EVD - {content}", "$1 cost"), "EVD - $1 cost");
    }
}
