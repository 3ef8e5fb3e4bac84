use regex::Regex;
use thiserror::Error;

/// Delimiters accepted by the command grammar, in the order they are tried.
pub const SUPPORTED_DELIMITERS: [char; 2] = ['/', '#'];

/// Errors returned when executing a parsed command.
#[derive(Debug, Error)]
pub enum SubstitutionError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("output was same as input")]
    NoEffect,
}

/// A vim-style `s<d>pattern<d>replacement[<d>]` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionCommand {
    pub pattern: String,
    pub replacement: String,
}

impl SubstitutionCommand {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Parses a command from the first line of `text`.
    ///
    /// The command must start at byte 0. The pattern ends at the first
    /// delimiter not preceded by a backslash and must be non-empty; the
    /// replacement runs to the end of the line, minus trailing whitespace and
    /// one optional closing delimiter. `\<d>` inside either part stands for a
    /// literal delimiter. Returns `None` when `text` is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        SUPPORTED_DELIMITERS
            .iter()
            .find_map(|delimiter| parse_with_delimiter(text, *delimiter))
    }

    /// Replaces every match of the pattern in `text` with the replacement.
    ///
    /// The replacement may reference capture groups as `$1` or `${1}`. A
    /// result identical to `text` is reported as `NoEffect`.
    pub fn run(&self, text: &str) -> Result<String, SubstitutionError> {
        let regex =
            Regex::new(&self.pattern).map_err(|source| SubstitutionError::InvalidPattern {
                pattern: self.pattern.clone(),
                source,
            })?;
        let replaced = regex.replace_all(text, self.replacement.as_str());
        if replaced == text {
            return Err(SubstitutionError::NoEffect);
        }
        Ok(replaced.into_owned())
    }
}

fn parse_with_delimiter(text: &str, delimiter: char) -> Option<SubstitutionCommand> {
    let first_line = text.split('\n').next().unwrap_or_default();
    let body = first_line.strip_prefix('s')?.strip_prefix(delimiter)?;

    let pattern_end = find_unescaped(body, delimiter)?;
    let pattern = &body[..pattern_end];
    if pattern.is_empty() {
        return None;
    }

    let mut replacement = body[pattern_end + delimiter.len_utf8()..].trim_end();
    if let Some(stripped) = replacement.strip_suffix(delimiter) {
        if !ends_with_escape(stripped) {
            replacement = stripped;
        }
    }

    Some(SubstitutionCommand {
        pattern: unescape_delimiter(pattern, delimiter),
        replacement: unescape_delimiter(replacement, delimiter),
    })
}

fn find_unescaped(text: &str, delimiter: char) -> Option<usize> {
    let mut chars = text.char_indices();
    while let Some((index, ch)) = chars.next() {
        if ch == '\\' {
            chars.next();
            continue;
        }
        if ch == delimiter {
            return Some(index);
        }
    }
    None
}

fn ends_with_escape(text: &str) -> bool {
    let backslashes = text.chars().rev().take_while(|ch| *ch == '\\').count();
    backslashes % 2 == 1
}

fn unescape_delimiter(text: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(next) if next == delimiter => out.push(next),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}
