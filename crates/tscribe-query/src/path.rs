//! Column path parsing.
//!
//! A filter column may address a value nested inside a JSON column:
//!
//! ```text
//! model                       -> model
//! metadata.config.temperature -> metadata, [config, temperature]
//! tags[0]                     -> tags, [0]
//! metadata."weird.key"[2]     -> metadata, ["weird.key", 2]
//! ```
//!
//! Inside double quotes `.` and `[` are ordinary characters; `""` is an
//! escaped quote.

use crate::error::{QueryError, Result};

/// One step into a nested JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub key: String,
    /// True for array positions (`[0]`), false for object keys.
    pub is_index: bool,
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment {
            key: key.into(),
            is_index: false,
        }
    }

    pub fn index(index: usize) -> Self {
        PathSegment {
            key: index.to_string(),
            is_index: true,
        }
    }
}

/// A column name split into its base column and nested segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath {
    pub base: String,
    pub segments: Vec<PathSegment>,
}

impl ColumnPath {
    /// Whether the path addresses a nested value rather than a plain column.
    pub fn is_nested(&self) -> bool {
        !self.segments.is_empty()
    }
}

fn invalid(raw: &str, reason: &str) -> QueryError {
    QueryError::InvalidColumnPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    }
}

/// Split a raw column string into `(base_column, segments)`.
pub fn parse_column_path(raw: &str) -> Result<ColumnPath> {
    let mut parts: Vec<PathSegment> = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut after_bracket = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            current.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(invalid(raw, "unterminated quote")),
                    }
                }
            }
            '.' => {
                if current.is_empty() && !quoted {
                    if !after_bracket {
                        return Err(invalid(raw, "empty segment"));
                    }
                } else {
                    parts.push(PathSegment::key(std::mem::take(&mut current)));
                }
                quoted = false;
                after_bracket = false;
            }
            '[' => {
                if !current.is_empty() || quoted {
                    parts.push(PathSegment::key(std::mem::take(&mut current)));
                    quoted = false;
                }
                parts.push(parse_bracket(raw, &mut chars)?);
                after_bracket = true;
            }
            ']' => return Err(invalid(raw, "unmatched ']'")),
            _ => {
                if after_bracket {
                    return Err(invalid(raw, "expected '.' or '[' after ']'"));
                }
                current.push(c);
            }
        }
    }

    if !current.is_empty() || quoted {
        parts.push(PathSegment::key(current));
    } else if !after_bracket {
        return Err(invalid(raw, "empty segment"));
    }

    let mut parts = parts.into_iter();
    let base = match parts.next() {
        Some(first) if !first.is_index => first.key,
        Some(_) => return Err(invalid(raw, "path must start with a column name")),
        None => return Err(invalid(raw, "empty column name")),
    };

    Ok(ColumnPath {
        base,
        segments: parts.collect(),
    })
}

fn parse_bracket(
    raw: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<PathSegment> {
    let mut content = String::new();
    let mut quoted = false;
    loop {
        match chars.next() {
            Some('"') if content.is_empty() && !quoted => {
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            content.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => content.push(ch),
                        None => return Err(invalid(raw, "unterminated quote")),
                    }
                }
            }
            Some(']') => break,
            Some(ch) if !quoted => content.push(ch),
            Some(_) => return Err(invalid(raw, "unexpected text after quoted key")),
            None => return Err(invalid(raw, "unterminated '['")),
        }
    }

    if quoted {
        return Ok(PathSegment::key(content));
    }
    let trimmed = content.trim();
    match trimmed.parse::<usize>() {
        Ok(index) => Ok(PathSegment::index(index)),
        Err(_) => Err(invalid(raw, "bracket must hold an index or a quoted key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_column() {
        let path = parse_column_path("model").unwrap();
        assert_eq!(path.base, "model");
        assert!(!path.is_nested());
    }

    #[test]
    fn test_dotted_keys() {
        let path = parse_column_path("metadata.config.temperature").unwrap();
        assert_eq!(path.base, "metadata");
        assert_eq!(
            path.segments,
            vec![PathSegment::key("config"), PathSegment::key("temperature")]
        );
    }

    #[test]
    fn test_index_then_key() {
        let path = parse_column_path("tags[0].name").unwrap();
        assert_eq!(path.base, "tags");
        assert_eq!(
            path.segments,
            vec![PathSegment::index(0), PathSegment::key("name")]
        );
    }

    #[test]
    fn test_quoted_key_with_separators() {
        let path = parse_column_path(r#"a."weird.key"[2]"#).unwrap();
        assert_eq!(path.base, "a");
        assert_eq!(
            path.segments,
            vec![PathSegment::key("weird.key"), PathSegment::index(2)]
        );

        let path = parse_column_path(r#"a."x[0]""#).unwrap();
        assert_eq!(path.segments, vec![PathSegment::key("x[0]")]);
    }

    #[test]
    fn test_quoted_base_and_bracket_key() {
        let path = parse_column_path(r#""my col"["k.1"]"#).unwrap();
        assert_eq!(path.base, "my col");
        assert_eq!(path.segments, vec![PathSegment::key("k.1")]);
    }

    #[test]
    fn test_escaped_quote() {
        let path = parse_column_path(r#"a."say ""hi""""#).unwrap();
        assert_eq!(path.segments, vec![PathSegment::key(r#"say "hi""#)]);
    }

    #[test]
    fn test_errors() {
        for raw in ["", "a..b", "a.", "[0]", "a[x]", "a[0", "a\"b", "a]", "a[0]b"] {
            assert!(parse_column_path(raw).is_err(), "expected error for {raw:?}");
        }
    }
}
