//! Text helpers for upstream payload decoding and diagnostics.

/// Truncates `value` to `max_chars` characters, appending `...` when cut.
pub fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

/// Replaces `&lt;`, `&gt;` and `&amp;` in a single left-to-right pass.
///
/// The comment feed HTML-escapes these three entities inside its JSON
/// payloads. Text produced by one replacement is never rescanned, so
/// `&amp;lt;` decodes to `&lt;`.
pub fn unescape_html_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let (replacement, consumed) = if tail.starts_with("&lt;") {
            ('<', 4)
        } else if tail.starts_with("&gt;") {
            ('>', 4)
        } else if tail.starts_with("&amp;") {
            ('&', 5)
        } else {
            ('&', 1)
        };
        out.push(replacement);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::{truncate_for_error, unescape_html_entities};

    #[test]
    fn unit_truncate_for_error_keeps_short_values() {
        assert_eq!(truncate_for_error("short", 10), "short");
        assert_eq!(truncate_for_error("abcdef", 3), "abc...");
    }

    #[test]
    fn unit_unescape_html_entities_replaces_known_entities() {
        assert_eq!(
            unescape_html_entities(r#"{"body": "a &lt;b&gt; &amp; c"}"#),
            r#"{"body": "a <b> & c"}"#
        );
    }

    #[test]
    fn regression_unescape_html_entities_does_not_rescan_output() {
        assert_eq!(unescape_html_entities("&amp;lt;"), "&lt;");
        assert_eq!(unescape_html_entities("&quot; & &"), "&quot; & &");
        assert_eq!(unescape_html_entities("trailing &"), "trailing &");
    }
}
